//! Run one job.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Args;
use console::style;
use tokio::sync::mpsc;

use super::open_repository;
use crate::cli::logging::JobLog;
use crate::cli::progress::spawn_block_progress;
use crate::config::Settings;
use crate::genome::{partition, SequenceIndex};
use crate::models::PairInput;
use crate::outcome::NOT_APPLICABLE;
use crate::pipeline::{JobContext, Pipeline};
use crate::utils::{format_seconds, format_size};

#[derive(Args)]
pub struct RunArgs {
    /// Input id from the inputs table
    #[arg(long)]
    input_id: Option<String>,

    /// Tumor BAM locator (when not using --input-id)
    #[arg(long, conflicts_with = "input_id")]
    tumor_url: Option<String>,
    /// Normal BAM locator (when not using --input-id)
    #[arg(long, conflicts_with = "input_id")]
    normal_url: Option<String>,
    #[arg(long, conflicts_with = "input_id")]
    case_id: Option<String>,
    #[arg(long, conflicts_with = "input_id")]
    tumor_id: Option<String>,
    #[arg(long, conflicts_with = "input_id")]
    normal_id: Option<String>,

    /// Bases per block
    #[arg(long)]
    block_size: Option<u64>,
    /// Blocks run at once
    #[arg(long)]
    concurrency: Option<usize>,
    /// Scratch root for job directories
    #[arg(long)]
    scratch: Option<PathBuf>,
    /// Remote prefix for results
    #[arg(long)]
    output_root: Option<String>,
    /// FASTA index (.fai) used for partitioning
    #[arg(long)]
    reference_index: Option<PathBuf>,

    /// Keep the scratch directory after the job
    #[arg(long)]
    no_cleanup: bool,
    /// Show a progress bar over blocks
    #[arg(short = 'P', long)]
    progress: bool,
}

impl RunArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(block_size) = self.block_size {
            settings.block_size = block_size;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        if let Some(scratch) = &self.scratch {
            settings.scratch_root = scratch.clone();
        }
        if let Some(root) = &self.output_root {
            settings.output_root = Some(root.clone());
        }
        if let Some(index) = &self.reference_index {
            settings.reference.index = Some(index.clone());
        }
    }

    fn adhoc_input(&self) -> anyhow::Result<PairInput> {
        fn required(value: &Option<String>, flag: &str) -> anyhow::Result<String> {
            value
                .clone()
                .with_context(|| format!("{} is required without --input-id", flag))
        }

        let tumor_id = required(&self.tumor_id, "--tumor-id")?;
        let normal_id = required(&self.normal_id, "--normal-id")?;
        Ok(PairInput {
            id: format!("{}_{}", tumor_id, normal_id),
            case_id: required(&self.case_id, "--case-id")?,
            tumor_url: required(&self.tumor_url, "--tumor-url")?,
            normal_url: required(&self.normal_url, "--normal-url")?,
            tumor_id,
            normal_id,
        })
    }
}

pub async fn cmd_run(mut settings: Settings, args: RunArgs, job_log: &JobLog) -> anyhow::Result<ExitCode> {
    args.apply(&mut settings);
    settings.validate()?;
    let runner = which::which(&settings.workflow.runner).with_context(|| {
        format!(
            "Workflow runner {} not found in PATH",
            settings.workflow.runner
        )
    })?;
    tracing::debug!("Using workflow runner {}", runner.display());

    let index_path = settings
        .reference
        .index
        .clone()
        .context("No reference index configured (reference.index or --reference-index)")?;
    let index = SequenceIndex::from_fai(&index_path)
        .with_context(|| format!("Failed to load {}", index_path.display()))?;
    let block_count = partition(&index, settings.block_size)?.count();

    let repo = open_repository(&settings).await?;
    let input = match &args.input_id {
        Some(id) => match repo.get_input(id).await? {
            Some(input) => input,
            None => bail!("No input with id {}", id),
        },
        None => args.adhoc_input()?,
    };

    let job_id = uuid::Uuid::new_v4().to_string();
    let ctx = JobContext::new(job_id, input, &settings);
    // Scratch failures are recorded by the pipeline as SCRATCH_ERROR.
    if let Err(e) = job_log.open(&ctx.log_path()) {
        tracing::warn!("Job log {} unavailable: {}", ctx.log_path().display(), e);
    }

    println!(
        "{} Job {} ({} blocks, {} at a time)",
        style("→").cyan(),
        ctx.job_id,
        block_count,
        settings.concurrency
    );

    let transfer = Arc::new(settings.transfer.build());
    let mut pipeline =
        Pipeline::new(settings, transfer, Arc::new(repo)).keep_scratch(args.no_cleanup);

    let progress = if args.progress {
        let (tx, rx) = mpsc::channel(64);
        pipeline = pipeline.with_events(tx);
        Some(spawn_block_progress(block_count as u64, rx))
    } else {
        None
    };

    let report = pipeline.run(&ctx, &index).await;
    drop(pipeline);
    if let Some(handle) = progress {
        let _ = handle.await;
    }
    job_log.close();

    let report = report?;
    let status = report.outcome.status.as_str();
    let styled = if report.outcome.status.is_success() {
        style(status).green()
    } else {
        style(status).red()
    };
    println!("  Status:   {}", styled);
    println!(
        "  Location: {}",
        report.record.location().unwrap_or(NOT_APPLICABLE)
    );
    if let (Some(checksum), Some(size)) = (report.record.checksum(), report.record.size()) {
        println!(
            "  Artifact: sha256 {} ({})",
            checksum,
            format_size(u64::try_from(size).unwrap_or(0))
        );
    }
    println!(
        "  Elapsed:  {}",
        format_seconds(report.metrics.total_seconds)
    );
    if !report.persisted {
        println!(
            "  {} Job record was not persisted, see log",
            style("!").yellow()
        );
    }

    let code = report.outcome.process_exit_code();
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
