//! CLI parser and dispatch.

mod db;
mod filter;
mod generate;
mod inputs;
mod run;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use super::logging::JobLog;
use crate::config::Settings;
use crate::repository::{run_migrations, DbPool, DieselJobRepository};

#[derive(Parser)]
#[command(name = "varscan")]
#[command(about = "Block-partitioned VarScan2 orchestration")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ./varscan.toml)
    #[arg(short, long, global = true, env = "VARSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one tumor/normal job
    Run(run::RunArgs),

    /// Write a launch script for every pending input
    Generate(generate::GenerateArgs),

    /// Manage the status database
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Manage tumor/normal inputs
    Inputs {
        #[command(subcommand)]
        command: InputsCommands,
    },

    /// List recorded jobs
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Number of jobs to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Filter VCF records
    Filter(filter::FilterArgs),
}

#[derive(Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
}

#[derive(Subcommand)]
enum InputsCommands {
    /// Load tumor/normal pairs from a tab-separated file
    Import {
        /// File with header: id case_id tumor_id normal_id tumor_url normal_url
        file: PathBuf,
    },
    /// List inputs with no completed job
    Pending {
        #[arg(short, long)]
        limit: Option<i64>,
    },
}

/// Migrate and open the status store named by `settings`.
async fn open_repository(settings: &Settings) -> anyhow::Result<DieselJobRepository> {
    let url = settings.database_url();
    let pool = DbPool::open(&url).context("Failed to open status database")?;
    run_migrations(&url)
        .await
        .context("Failed to apply migrations")?;
    Ok(DieselJobRepository::new(pool))
}

/// Parse arguments and run the selected command.
pub async fn run(job_log: JobLog) -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => run::cmd_run(settings, args, &job_log).await,
        Commands::Generate(args) => generate::cmd_generate(&settings, args).await,
        Commands::Db { command } => match command {
            DbCommands::Migrate => db::cmd_migrate(&settings).await,
        },
        Commands::Inputs { command } => match command {
            InputsCommands::Import { file } => inputs::cmd_import(&settings, &file).await,
            InputsCommands::Pending { limit } => inputs::cmd_pending(&settings, limit).await,
        },
        Commands::Status { json, limit } => status::cmd_status(&settings, json, limit).await,
        Commands::Filter(args) => filter::cmd_filter(args),
    }
}
