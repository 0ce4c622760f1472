//! S3 transfers through the AWS CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{locator_basename, Transfer, TransferError, TransferPhase};
use crate::executor::{Task, TaskRunner};

/// Credential profile and endpoint for locators starting with `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRule {
    pub prefix: String,
    pub profile: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Runs `aws s3 cp` with a profile/endpoint chosen by locator prefix.
#[derive(Debug, Clone)]
pub struct AwsCliTransfer {
    command: String,
    default_profile: Option<String>,
    default_endpoint: Option<String>,
    rules: Vec<ProfileRule>,
    runner: TaskRunner,
}

impl Default for AwsCliTransfer {
    fn default() -> Self {
        Self {
            command: "aws".to_string(),
            default_profile: None,
            default_endpoint: None,
            rules: Vec::new(),
            runner: TaskRunner::new(),
        }
    }
}

impl AwsCliTransfer {
    pub fn new(
        command: impl Into<String>,
        default_profile: Option<String>,
        default_endpoint: Option<String>,
        rules: Vec<ProfileRule>,
    ) -> Self {
        Self {
            command: command.into(),
            default_profile,
            default_endpoint,
            rules,
            runner: TaskRunner::new(),
        }
    }

    /// Profile and endpoint for a locator. The longest matching prefix wins.
    pub fn credentials_for(&self, locator: &str) -> (Option<&str>, Option<&str>) {
        let rule = self
            .rules
            .iter()
            .filter(|r| locator.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len());

        match rule {
            Some(rule) => (
                Some(rule.profile.as_str()),
                rule.endpoint
                    .as_deref()
                    .or(self.default_endpoint.as_deref()),
            ),
            None => (
                self.default_profile.as_deref(),
                self.default_endpoint.as_deref(),
            ),
        }
    }

    /// Full argv for copying `src` to `dst`. `locator` selects credentials.
    pub fn copy_argv(&self, src: &str, dst: &str, locator: &str, recursive: bool) -> Vec<String> {
        let mut argv = vec![
            self.command.clone(),
            "s3".to_string(),
            "cp".to_string(),
        ];
        if recursive {
            argv.push("--recursive".to_string());
        }
        argv.push(src.to_string());
        argv.push(dst.to_string());

        let (profile, endpoint) = self.credentials_for(locator);
        if let Some(profile) = profile {
            argv.push("--profile".to_string());
            argv.push(profile.to_string());
        }
        if let Some(endpoint) = endpoint {
            argv.push("--endpoint-url".to_string());
            argv.push(endpoint.to_string());
        }
        argv
    }

    async fn copy(
        &self,
        phase: TransferPhase,
        locator: &str,
        argv: Vec<String>,
        output: PathBuf,
    ) -> Result<(), TransferError> {
        let task = Task::new(format!("{}:{}", phase, locator_basename(locator)), argv, output);

        let result = self
            .runner
            .execute(&task)
            .await
            .map_err(|e| TransferError::Launch {
                phase,
                locator: locator.to_string(),
                message: e.to_string(),
            })?;

        if !result.success() {
            warn!("{} of {} failed: {}", phase, locator, result.stderr.trim());
            return Err(TransferError::Failed {
                phase,
                locator: locator.to_string(),
                code: result.exit_code,
                stderr: result.stderr,
            });
        }

        info!("{} of {} finished", phase, locator);
        Ok(())
    }
}

#[async_trait]
impl Transfer for AwsCliTransfer {
    async fn fetch(&self, locator: &str, local_dir: &Path) -> Result<PathBuf, TransferError> {
        let dest = local_dir.join(locator_basename(locator));
        let argv = self.copy_argv(locator, &dest.display().to_string(), locator, false);
        self.copy(TransferPhase::Download, locator, argv, dest.clone())
            .await?;
        Ok(dest)
    }

    async fn put(&self, local: &Path, locator: &str) -> Result<(), TransferError> {
        let recursive = tokio::fs::metadata(local)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let argv = self.copy_argv(&local.display().to_string(), locator, locator, recursive);
        self.copy(TransferPhase::Upload, locator, argv, local.to_path_buf())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> AwsCliTransfer {
        AwsCliTransfer::new(
            "aws",
            Some("default".into()),
            Some("https://objects.example.org".into()),
            vec![
                ProfileRule {
                    prefix: "s3://ceph".into(),
                    profile: "ceph".into(),
                    endpoint: Some("http://ceph.local".into()),
                },
                ProfileRule {
                    prefix: "s3://ceph-archive".into(),
                    profile: "archive".into(),
                    endpoint: None,
                },
            ],
        )
    }

    #[test]
    fn test_profile_selection() {
        let t = transfer();
        assert_eq!(
            t.credentials_for("s3://ceph/a.bam"),
            (Some("ceph"), Some("http://ceph.local"))
        );
        assert_eq!(
            t.credentials_for("s3://ceph-archive/a.bam"),
            (Some("archive"), Some("https://objects.example.org"))
        );
        assert_eq!(
            t.credentials_for("s3://other/a.bam"),
            (Some("default"), Some("https://objects.example.org"))
        );
    }

    #[test]
    fn test_copy_argv() {
        let argv = transfer().copy_argv("s3://ceph/x.bam", "/scratch/x.bam", "s3://ceph/x.bam", false);
        assert_eq!(
            argv,
            vec![
                "aws",
                "s3",
                "cp",
                "s3://ceph/x.bam",
                "/scratch/x.bam",
                "--profile",
                "ceph",
                "--endpoint-url",
                "http://ceph.local"
            ]
        );

        let recursive = AwsCliTransfer::default().copy_argv("/out", "s3://b/job", "s3://b/job", true);
        assert_eq!(recursive, vec!["aws", "s3", "cp", "--recursive", "/out", "s3://b/job"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        // `false` ignores its arguments and exits 1.
        let t = AwsCliTransfer::new("false", None, None, Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let err = t.fetch("s3://b/x.bam", dir.path()).await.unwrap_err();
        assert!(matches!(err, TransferError::Failed { code: 1, .. }));
        assert_eq!(err.phase(), TransferPhase::Download);
    }

    #[tokio::test]
    async fn test_missing_cli_is_launch_error() {
        let t = AwsCliTransfer::new("/nonexistent/aws", None, None, Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let err = t.put(dir.path(), "s3://b/job").await.unwrap_err();
        assert!(matches!(err, TransferError::Launch { .. }));
        assert_eq!(err.phase(), TransferPhase::Upload);
    }
}
