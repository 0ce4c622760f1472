//! Launch script generation for pending inputs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use console::style;

use super::open_repository;
use crate::config::{Settings, CONFIG_FILENAME};
use crate::launch::{generate, LaunchSettings, SLURM_TEMPLATE};
use crate::repository::StatusStore;

#[derive(Args)]
pub struct GenerateArgs {
    /// Directory the scripts are written to
    #[arg(short, long)]
    outdir: PathBuf,
    /// Template with XX_KEY_XX placeholders (defaults to the built-in SLURM script)
    #[arg(short, long)]
    template: Option<PathBuf>,
    /// Maximum number of scripts
    #[arg(short, long)]
    limit: Option<i64>,
    /// Memory requested per job
    #[arg(long, default_value = "32G")]
    mem: String,
    /// SLURM partition
    #[arg(long)]
    partition: Option<String>,
    /// Threads per job (defaults to concurrency from config)
    #[arg(long)]
    thread_count: Option<usize>,
    /// Bases per block (defaults to block_size from config)
    #[arg(long)]
    block_size: Option<u64>,
    /// Executable invoked by the scripts
    #[arg(long, default_value = "varscan")]
    varscan_bin: String,
}

pub async fn cmd_generate(settings: &Settings, args: GenerateArgs) -> anyhow::Result<ExitCode> {
    let template = match &args.template {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?,
        None => SLURM_TEMPLATE.to_string(),
    };

    let config_path = settings
        .source_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));
    let config_path = std::fs::canonicalize(&config_path).unwrap_or(config_path);

    let launch = LaunchSettings {
        thread_count: args.thread_count.unwrap_or(settings.concurrency),
        mem: args.mem,
        block_size: args.block_size.unwrap_or(settings.block_size),
        partition: args.partition,
        config_path,
        scratch: settings.scratch_root.clone(),
        varscan_bin: args.varscan_bin,
    };

    let repo = open_repository(settings).await?;
    let pending = repo.pending_inputs(args.limit).await?;
    if pending.is_empty() {
        println!("{} No pending inputs", style("✓").green());
        return Ok(ExitCode::SUCCESS);
    }

    let written = generate(&template, &pending, &launch, &args.outdir)?;
    println!(
        "{} Wrote {} scripts to {}",
        style("✓").green(),
        written.len(),
        args.outdir.display()
    );
    Ok(ExitCode::SUCCESS)
}
