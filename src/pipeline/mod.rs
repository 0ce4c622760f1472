//! One job, end to end.
//!
//! download -> index -> partition -> compute -> merge -> upload ->
//! classify -> persist -> cleanup. Only the download/index stage (two
//! inputs) and the compute stage (one task per block) run concurrently.
//! Failures after download are folded into exit codes and classified; they
//! never skip persistence or cleanup.

mod context;
pub mod tasks;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub use context::JobContext;

use crate::config::Settings;
use crate::executor::{PoolError, PoolEvent, Task, TaskResult, TaskRunner, WorkerPool, LAUNCH_FAILURE_EXIT_CODE};
use crate::genome::{partition, Block, PartitionError, SequenceIndex};
use crate::models::{JobError, JobMetrics, JobPhase, JobRecord, TimeMetrics};
use crate::outcome::{classify, JobStatus, Outcome, NOT_APPLICABLE};
use crate::repository::StatusStore;
use crate::transfer::{fetch_validated, join_locator, locator_basename, Transfer, TransferError};
use crate::utils::file_checksum;
use crate::vcf::merge;

/// Tumor and normal are fetched side by side.
const DOWNLOAD_CONCURRENCY: usize = 2;

/// Errors that stop a job before it starts. Anything later is classified.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// What a finished job produced.
#[derive(Debug)]
pub struct JobReport {
    pub record: JobRecord,
    pub outcome: Outcome,
    pub blocks: Vec<Block>,
    /// Aligned with `blocks`.
    pub results: Vec<TaskResult>,
    /// Published artifacts, primary stream first. Gone after cleanup.
    pub artifacts: Vec<PathBuf>,
    pub metrics: JobMetrics,
    pub persisted: bool,
}

/// Results of the compute and merge stages, whatever happened.
#[derive(Default)]
struct Computed {
    blocks: Vec<Block>,
    results: Vec<TaskResult>,
    artifacts: Vec<PathBuf>,
    codes: Vec<i32>,
    timings: Vec<TimeMetrics>,
}

/// Runs jobs against one transfer backend and status store.
pub struct Pipeline {
    settings: Settings,
    transfer: Arc<dyn Transfer>,
    store: Arc<dyn StatusStore>,
    events: Option<mpsc::Sender<PoolEvent>>,
    keep_scratch: bool,
}

impl Pipeline {
    pub fn new(settings: Settings, transfer: Arc<dyn Transfer>, store: Arc<dyn StatusStore>) -> Self {
        Self {
            settings,
            transfer,
            store,
            events: None,
            keep_scratch: false,
        }
    }

    /// Forward block progress to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<PoolEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Leave the scratch directory in place after the job.
    pub fn keep_scratch(mut self, keep: bool) -> Self {
        self.keep_scratch = keep;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one job. Configuration problems fail before anything is
    /// downloaded; every other failure ends in a persisted terminal status.
    pub async fn run(&self, ctx: &JobContext, index: &SequenceIndex) -> Result<JobReport, PipelineError> {
        partition(index, ctx.block_size)?;
        let download_pool = WorkerPool::new(DOWNLOAD_CONCURRENCY)?;
        let mut compute_pool = WorkerPool::new(ctx.concurrency)?;
        if let Some(tx) = &self.events {
            compute_pool = compute_pool.with_events(tx.clone());
        }

        let report = self
            .run_stages(ctx, index, &download_pool, &compute_pool)
            .await;

        if self.keep_scratch {
            info!("Keeping scratch directory {}", ctx.job_dir().display());
        } else {
            ctx.cleanup().await;
        }

        report
    }

    async fn run_stages(
        &self,
        ctx: &JobContext,
        index: &SequenceIndex,
        download_pool: &WorkerPool,
        compute_pool: &WorkerPool,
    ) -> Result<JobReport, PipelineError> {
        let mut record = JobRecord::with_id(ctx.job_id.clone(), ctx.input.identifiers());
        record.start()?;
        info!(
            "Job {} started: input {} (case {}, tumor {}, normal {}) on {}",
            ctx.job_id,
            ctx.input.id,
            ctx.input.case_id,
            ctx.input.tumor_id,
            ctx.input.normal_id,
            record.host().unwrap_or("unknown host")
        );
        debug!("Settings hash {}", self.settings.hash());
        for (tool, version) in &self.settings.workflow.tool_versions {
            info!("Tool {} version {}", tool, version);
        }

        if let Err(e) = ctx.create_dirs() {
            error!("Failed to create scratch directories: {}", e);
            let outcome = Outcome::aborted(JobStatus::ToolError("SCRATCH_ERROR".to_string()));
            return self.conclude(ctx, record, outcome, Computed::default()).await;
        }

        let started = Instant::now();
        let downloaded = self.download(ctx, download_pool).await;
        record.record_phase(JobPhase::Download, started.elapsed())?;
        let (tumor, normal) = match downloaded {
            Ok(paths) => paths,
            Err(outcome) => return self.conclude(ctx, record, outcome, Computed::default()).await,
        };

        let started = Instant::now();
        let indexed = self.index_inputs(ctx, download_pool, &[&tumor, &normal]).await;
        record.record_phase(JobPhase::Prepare, started.elapsed())?;
        if let Err(outcome) = indexed {
            return self.conclude(ctx, record, outcome, Computed::default()).await;
        }

        let started = Instant::now();
        let mut computed = self
            .compute(ctx, index, compute_pool, &tumor, &normal)
            .await?;
        record.record_phase(JobPhase::Compute, started.elapsed())?;

        let started = Instant::now();
        self.merge_streams(ctx, &mut computed).await;
        record.record_phase(JobPhase::Merge, started.elapsed())?;

        if let Some(primary) = computed.artifacts.first() {
            match file_checksum(primary) {
                Ok((checksum, size)) => {
                    info!("{}: sha256 {} ({} bytes)", primary.display(), checksum, size);
                    record.set_artifact(checksum, size)?;
                }
                Err(e) => warn!("Failed to checksum {}: {}", primary.display(), e),
            }
        }

        let started = Instant::now();
        let upload_code = self.upload(ctx, &computed.artifacts).await;
        record.record_phase(JobPhase::Upload, started.elapsed())?;

        let target = ctx.upload_target();
        let outcome = classify(
            &[0, 0],
            &computed.codes,
            upload_code,
            target.as_deref().unwrap_or(NOT_APPLICABLE),
        );
        self.conclude(ctx, record, outcome, computed).await
    }

    /// Fetch tumor and normal concurrently. Any failure yields the outcome
    /// that ends the job.
    async fn download(&self, ctx: &JobContext, pool: &WorkerPool) -> Result<(PathBuf, PathBuf), Outcome> {
        let items = vec![
            (ctx.input_dir().join("tumor"), ctx.input.tumor_url.clone()),
            (ctx.input_dir().join("normal"), ctx.input.normal_url.clone()),
        ];
        let transfer = self.transfer.clone();

        let fetched = pool
            .run_all(items, move |_, _, (dir, locator): (PathBuf, String)| {
                let transfer = transfer.clone();
                async move {
                    if let Err(source) = tokio::fs::create_dir_all(&dir).await {
                        return Err(TransferError::Io {
                            phase: crate::transfer::TransferPhase::Download,
                            locator,
                            source,
                        });
                    }
                    info!("Downloading {}", locator);
                    fetch_validated(transfer.as_ref(), &locator, &dir).await
                }
            })
            .await;

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                error!("Download pool failed: {}", e);
                return Err(classify(&[1], &[], 0, NOT_APPLICABLE));
            }
        };

        let codes: Vec<i32> = fetched
            .iter()
            .map(|r| r.as_ref().map_or_else(TransferError::exit_code, |_| 0))
            .collect();
        for e in fetched.iter().filter_map(|r| r.as_ref().err()) {
            error!("{}", e);
        }

        if let Some(TransferError::Empty { locator, .. }) = fetched
            .iter()
            .filter_map(|r| r.as_ref().err())
            .find(|e| matches!(e, TransferError::Empty { .. }))
        {
            return Err(Outcome::aborted(JobStatus::size_zero(&input_kind(locator))));
        }
        if codes.iter().any(|&c| c != 0) {
            return Err(classify(&codes, &[], 0, NOT_APPLICABLE));
        }

        let mut paths = fetched.into_iter().flatten();
        match (paths.next(), paths.next()) {
            (Some(tumor), Some(normal)) => Ok((tumor, normal)),
            _ => Err(classify(&[1], &[], 0, NOT_APPLICABLE)),
        }
    }

    /// Run the configured index command over each input.
    async fn index_inputs(&self, ctx: &JobContext, pool: &WorkerPool, inputs: &[&Path]) -> Result<(), Outcome> {
        let template = &self.settings.workflow.index_command;
        if template.is_empty() {
            return Ok(());
        }

        let tasks: Vec<Task> = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let argv = substitute(template, &[("{input}", &input.display().to_string())]);
                let mut task = Task::new(format!("{}.index.{}", ctx.job_id, i), argv, input.to_path_buf());
                if let Some(dir) = input.parent() {
                    task = task.with_workdir(dir);
                }
                task
            })
            .collect();

        let failed = match pool.run_tasks(&TaskRunner::new(), tasks).await {
            Ok(results) => results.iter().any(|r| !r.success()),
            Err(e) => {
                error!("Index pool failed: {}", e);
                true
            }
        };

        if failed {
            error!("Failed to index downloaded inputs");
            return Err(Outcome::aborted(JobStatus::ToolError(format!(
                "{}_INDEX_ERROR",
                input_kind(&ctx.input.tumor_url)
            ))));
        }
        info!("Indexed {} inputs", inputs.len());
        Ok(())
    }

    /// Partition, write block documents and fan the blocks out.
    async fn compute(
        &self,
        ctx: &JobContext,
        index: &SequenceIndex,
        pool: &WorkerPool,
        tumor: &Path,
        normal: &Path,
    ) -> Result<Computed, PipelineError> {
        let blocks: Vec<Block> = partition(index, ctx.block_size)?.collect();
        info!(
            "Partitioned {} sequences into {} blocks of up to {} bases",
            index.len(),
            blocks.len(),
            ctx.block_size
        );

        let tasks = match tasks::build_tasks(
            ctx,
            &blocks,
            tumor,
            normal,
            &self.settings.reference,
            &self.settings.workflow,
        ) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Failed to prepare block inputs: {}", e);
                return Ok(Computed {
                    blocks,
                    codes: vec![1],
                    ..Default::default()
                });
            }
        };

        let runner = TaskRunner::with_wrapper(self.settings.workflow.time_command.clone());
        let results = match pool.run_tasks(&runner, tasks).await {
            Ok(results) => results,
            Err(e) => {
                error!("Compute pool failed: {}", e);
                return Ok(Computed {
                    blocks,
                    codes: vec![1],
                    ..Default::default()
                });
            }
        };

        let mut codes = Vec::with_capacity(results.len());
        for (block, result) in blocks.iter().zip(&results) {
            if !result.success() {
                warn!(
                    "Block {} ({}) exited with {}: {}",
                    block,
                    result.task_id,
                    result.exit_code,
                    result.stderr.lines().last().unwrap_or("")
                );
            }
            codes.push(result.exit_code);
        }
        let failures = codes.iter().filter(|&&c| c != 0).count();
        info!("{} of {} blocks succeeded", codes.len() - failures, codes.len());

        let timings = results
            .iter()
            .filter_map(|r| TimeMetrics::parse(&r.stderr))
            .collect();

        Ok(Computed {
            blocks,
            results,
            codes,
            timings,
            ..Default::default()
        })
    }

    /// Merge each stream's block outputs in block order, then finalize.
    async fn merge_streams(&self, ctx: &JobContext, computed: &mut Computed) {
        for stream in &ctx.streams {
            let mut parts = Vec::with_capacity(computed.blocks.len());
            for (i, block) in computed.blocks.iter().enumerate() {
                let path = tasks::stream_output(&ctx.block_dir(i, block), block, stream);
                if path.is_file() {
                    parts.push(path);
                    continue;
                }

                // A block that exited 0 must have produced every stream.
                let succeeded = computed.results.get(i).is_some_and(|r| r.success());
                if succeeded {
                    error!(
                        "Block {} exited 0 but wrote no {} output {}",
                        block.region(),
                        stream,
                        path.display()
                    );
                    computed.codes.push(1);
                } else {
                    warn!("Missing block output {}", path.display());
                }
            }

            let merged = match merge(&parts, &ctx.merged_path(stream)) {
                Ok(path) => {
                    info!("Merged {} {} outputs into {}", parts.len(), stream, path.display());
                    path
                }
                Err(e) => {
                    error!("Failed to merge {} outputs: {}", stream, e);
                    computed.codes.push(1);
                    continue;
                }
            };

            match self.finalize(ctx, stream, &merged).await {
                Ok(artifact) => computed.artifacts.push(artifact),
                Err(code) => computed.codes.push(code),
            }
        }
    }

    /// Run the finalize command on a merged stream, if one is configured.
    async fn finalize(&self, ctx: &JobContext, stream: &str, merged: &Path) -> Result<PathBuf, i32> {
        let Some(template) = &self.settings.finalize else {
            return Ok(merged.to_path_buf());
        };

        let output = ctx
            .result_dir()
            .join(format!("{}.{}.vcf", ctx.job_id, stream));
        let argv = substitute(
            template,
            &[
                ("{input}", &merged.display().to_string()),
                ("{output}", &output.display().to_string()),
                ("{stream}", stream),
                ("{job_id}", &ctx.job_id),
            ],
        );
        let task = Task::new(format!("{}.finalize.{}", ctx.job_id, stream), argv, output.clone())
            .with_inputs(vec![merged.to_path_buf()])
            .with_workdir(ctx.result_dir());

        match TaskRunner::new().execute(&task).await {
            Ok(result) if result.success() => Ok(output),
            Ok(result) => {
                error!("Finalize of {} exited with {}", stream, result.exit_code);
                Err(result.exit_code)
            }
            Err(e) => {
                error!("Finalize of {} could not start: {}", stream, e);
                Err(LAUNCH_FAILURE_EXIT_CODE)
            }
        }
    }

    /// Upload every artifact under the job's target. Returns the first
    /// failing exit code, or 0.
    async fn upload(&self, ctx: &JobContext, artifacts: &[PathBuf]) -> i32 {
        let Some(target) = ctx.upload_target() else {
            error!("No output_root configured, results cannot be uploaded");
            return 1;
        };

        let mut code = 0;
        for artifact in artifacts {
            let name = artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let locator = join_locator(&target, &name);
            info!("Uploading {} to {}", artifact.display(), locator);
            if let Err(e) = self.transfer.put(artifact, &locator).await {
                error!("{}", e);
                if code == 0 {
                    code = e.exit_code();
                }
            }
        }
        code
    }

    /// Assign the terminal status, persist, then ship the log.
    async fn conclude(
        &self,
        ctx: &JobContext,
        mut record: JobRecord,
        outcome: Outcome,
        computed: Computed,
    ) -> Result<JobReport, PipelineError> {
        record.finish(&outcome)?;
        info!(
            "Job {} finished with status {} ({})",
            ctx.job_id,
            outcome.status,
            record.location().unwrap_or(NOT_APPLICABLE)
        );

        let persisted = match self.store.persist_job(&record).await {
            Ok(()) => {
                record.mark_persisted()?;
                true
            }
            Err(e) => {
                error!("Failed to persist job {}: {}", ctx.job_id, e);
                false
            }
        };

        let metrics = JobMetrics {
            job_id: ctx.job_id.clone(),
            case_id: Some(ctx.input.case_id.clone()),
            status: outcome.status.as_str().to_string(),
            thread_count: i32::try_from(ctx.concurrency).unwrap_or(i32::MAX),
            block_count: i32::try_from(computed.blocks.len()).unwrap_or(i32::MAX),
            download_seconds: record.elapsed(JobPhase::Download),
            upload_seconds: record.elapsed(JobPhase::Upload),
            total_seconds: record.total_seconds().unwrap_or_default(),
            average: TimeMetrics::average(&computed.timings),
        };
        if let Err(e) = self.store.persist_metrics(&metrics).await {
            error!("Failed to persist metrics for job {}: {}", ctx.job_id, e);
        }

        self.upload_log(ctx).await;

        Ok(JobReport {
            record,
            outcome,
            blocks: computed.blocks,
            results: computed.results,
            artifacts: computed.artifacts,
            metrics,
            persisted,
        })
    }

    async fn upload_log(&self, ctx: &JobContext) {
        let (Some(target), log) = (ctx.upload_target(), ctx.log_path()) else {
            return;
        };
        if !log.is_file() {
            return;
        }

        let name = log
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let locator = join_locator(&target, &name);
        if let Err(e) = self.transfer.put(&log, &locator).await {
            warn!("Failed to upload job log: {}", e);
        }
    }
}

/// Upper-cased file extension of a locator: `BAM` for `s3://b/x.bam`.
fn input_kind(locator: &str) -> String {
    Path::new(locator_basename(locator))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| "INPUT".to_string())
}

/// Replace every placeholder occurrence inside each argv element.
fn substitute(template: &[String], pairs: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            pairs
                .iter()
                .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
        })
        .collect()
}
