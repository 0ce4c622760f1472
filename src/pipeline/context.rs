//! Immutable per-job paths and parameters.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Settings;
use crate::genome::Block;
use crate::models::PairInput;
use crate::transfer::join_locator;

/// Everything a job's stages need to agree on, fixed when the job is minted.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub input: PairInput,
    pub block_size: u64,
    pub concurrency: usize,
    pub streams: Vec<String>,
    pub output_root: Option<String>,
    job_dir: PathBuf,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, input: PairInput, settings: &Settings) -> Self {
        let job_id = job_id.into();
        Self {
            job_dir: settings.scratch_root.join(&job_id),
            job_id,
            input,
            block_size: settings.block_size,
            concurrency: settings.concurrency,
            streams: settings.workflow.streams.clone(),
            output_root: settings.output_root.clone(),
        }
    }

    /// Scratch root for this job. Removed on cleanup.
    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    /// Downloaded tumor/normal inputs.
    pub fn input_dir(&self) -> PathBuf {
        self.job_dir.join("inputs")
    }

    pub fn block_root(&self) -> PathBuf {
        self.job_dir.join("blocks")
    }

    /// Merged artifacts and the job log.
    pub fn result_dir(&self) -> PathBuf {
        self.job_dir.join("results")
    }

    /// Private working directory for one block. The ordinal keeps names
    /// unique even if two blocks share a prefix.
    pub fn block_dir(&self, ordinal: usize, block: &Block) -> PathBuf {
        self.block_root()
            .join(format!("{:05}_{}", ordinal, block.prefix()))
    }

    pub fn merged_path(&self, stream: &str) -> PathBuf {
        self.result_dir()
            .join(format!("{}.{}.merged.vcf", self.job_id, stream))
    }

    pub fn log_path(&self) -> PathBuf {
        self.result_dir()
            .join(format!("{}.varscan.log", self.job_id))
    }

    /// Remote location results are uploaded to, `<output_root>/<job_id>`.
    pub fn upload_target(&self) -> Option<String> {
        self.output_root
            .as_deref()
            .map(|root| join_locator(root, &self.job_id))
    }

    pub fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [self.input_dir(), self.block_root(), self.result_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        debug!("Created scratch directories under {}", self.job_dir.display());
        Ok(())
    }

    /// Remove the job's scratch directory. Failures are logged.
    pub async fn cleanup(&self) {
        match tokio::fs::remove_dir_all(&self.job_dir).await {
            Ok(()) => debug!("Removed {}", self.job_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.job_dir.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(output_root: Option<&str>) -> JobContext {
        let settings = Settings {
            scratch_root: PathBuf::from("/scratch"),
            output_root: output_root.map(String::from),
            ..Settings::default()
        };
        let input = PairInput {
            id: "1".into(),
            case_id: "c".into(),
            tumor_id: "t".into(),
            normal_id: "n".into(),
            tumor_url: "s3://b/t.bam".into(),
            normal_url: "s3://b/n.bam".into(),
        };
        JobContext::new("job-1", input, &settings)
    }

    #[test]
    fn test_layout() {
        let ctx = context(Some("s3://results/varscan/"));
        let block = Block {
            sequence: "chr1".into(),
            start: 41,
            end: 80,
        };

        assert_eq!(ctx.job_dir(), Path::new("/scratch/job-1"));
        assert_eq!(
            ctx.block_dir(1, &block),
            PathBuf::from("/scratch/job-1/blocks/00001_chr1_41_80")
        );
        assert_eq!(
            ctx.merged_path("snp"),
            PathBuf::from("/scratch/job-1/results/job-1.snp.merged.vcf")
        );
        assert_eq!(
            ctx.upload_target().as_deref(),
            Some("s3://results/varscan/job-1")
        );
    }

    #[test]
    fn test_no_output_root() {
        assert_eq!(context(None).upload_target(), None);
    }
}
