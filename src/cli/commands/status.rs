//! Job status listing.

use std::process::ExitCode;

use console::style;

use super::open_repository;
use crate::config::Settings;
use crate::outcome::{JobStatus, NOT_APPLICABLE};
use crate::repository::StatusStore;
use crate::utils::format_seconds;

pub async fn cmd_status(settings: &Settings, json: bool, limit: i64) -> anyhow::Result<ExitCode> {
    let repo = open_repository(settings).await?;
    let jobs = repo.recent_jobs(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(ExitCode::SUCCESS);
    }

    if jobs.is_empty() {
        println!("No jobs recorded");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<36} {:<22} {:<16} {:>10}  {}",
        style("JOB").bold(),
        style("STATUS").bold(),
        style("CASE").bold(),
        style("ELAPSED").bold(),
        style("LOCATION").bold()
    );
    for job in &jobs {
        let status = job.status().as_str();
        let status = match job.status() {
            JobStatus::Completed => style(format!("{:<22}", status)).green(),
            JobStatus::UploadFailure | JobStatus::CwlFailed => {
                style(format!("{:<22}", status)).yellow()
            }
            _ => style(format!("{:<22}", status)).red(),
        };
        println!(
            "{:<36} {} {:<16} {:>10}  {}",
            job.job_id(),
            status,
            job.identifier("case_id").unwrap_or("-"),
            job.total_seconds()
                .map(format_seconds)
                .unwrap_or_else(|| "-".to_string()),
            job.location().unwrap_or(NOT_APPLICABLE)
        );
    }
    Ok(ExitCode::SUCCESS)
}
