use std::process::ExitCode;

use varscan_fanout::cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let job_log = cli::logging::init(cli::is_verbose());

    cli::run(job_log).await
}
