//! Database management commands.

use std::process::ExitCode;

use console::style;

use crate::config::Settings;
use crate::repository::{run_migrations, DbPool};
use crate::repository::util::redact_url_password;

/// Apply pending migrations.
pub async fn cmd_migrate(settings: &Settings) -> anyhow::Result<ExitCode> {
    let url = settings.database_url();
    println!("{} Database migration", style("→").cyan());
    println!("  Database: {}", redact_url_password(&url));

    let pool = DbPool::open(&url)?;
    println!("  Backend:  {}", pool.backend());

    let applied = run_migrations(&url).await?;
    if applied.is_empty() {
        println!("{} Schema is already up to date", style("✓").green());
    } else {
        for name in &applied {
            println!("  {} {}", style("+").green(), name);
        }
        println!(
            "{} Applied {} migrations",
            style("✓").green(),
            applied.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}
