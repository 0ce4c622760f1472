//! Single-command execution.

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Task, TaskResult};

/// The command could not be started at all.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Task {0} has an empty command")]
    EmptyCommand(String),
    #[error("Executable not found: {0}")]
    NotFound(String),
    #[error("Permission denied executing {0}")]
    PermissionDenied(String),
    #[error("Failed to start {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs one [`Task`] to completion, capturing both output streams.
#[derive(Debug, Clone, Default)]
pub struct TaskRunner {
    /// Optional wrapper prepended to every argv, e.g. `/usr/bin/time -v`.
    wrapper: Vec<String>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wrapper(wrapper: Vec<String>) -> Self {
        Self { wrapper }
    }

    /// Execute `task`. A nonzero exit code is a normal result; only a
    /// failure to start the process is an error.
    pub async fn execute(&self, task: &Task) -> Result<TaskResult, LaunchError> {
        let argv: Vec<&str> = self
            .wrapper
            .iter()
            .chain(task.argv.iter())
            .map(String::as_str)
            .collect();

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| LaunchError::EmptyCommand(task.id.clone()))?;

        info!("[{}] running: {}", task.id, argv.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &task.workdir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => LaunchError::NotFound(program.to_string()),
                ErrorKind::PermissionDenied => LaunchError::PermissionDenied(program.to_string()),
                _ => LaunchError::Io {
                    program: program.to_string(),
                    source: e,
                },
            })?;
        let elapsed = started.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines() {
            debug!("[{}] stdout: {}", task.id, line);
        }
        for line in stderr.lines() {
            debug!("[{}] stderr: {}", task.id, line);
        }

        let exit_code = exit_code(output.status);
        info!(
            "[{}] exited with {} after {:.1}s",
            task.id,
            exit_code,
            elapsed.as_secs_f64()
        );

        Ok(TaskResult {
            task_id: task.id.clone(),
            exit_code,
            stdout,
            stderr,
            output_path: task.output.clone(),
            elapsed,
            launch_error: None,
        })
    }
}

/// Map an exit status to a single integer; signals follow the shell
/// convention of `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(id: &str, script: &str) -> Task {
        Task::new(
            id,
            vec!["sh".into(), "-c".into(), script.into()],
            format!("/tmp/{}.out", id),
        )
    }

    #[tokio::test]
    async fn test_captures_streams_and_exit_code() {
        let runner = TaskRunner::new();
        let result = runner
            .execute(&sh("t0", "echo out; echo err >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert!(result.launch_error.is_none());
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let runner = TaskRunner::new();
        let task = Task::new("t1", vec!["/nonexistent/tool-xyz".into()], "/tmp/x");
        let err = runner.execute(&task).await.unwrap_err();
        assert!(matches!(err, LaunchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_command_is_launch_error() {
        let runner = TaskRunner::new();
        let task = Task::new("t2", Vec::new(), "/tmp/x");
        assert!(matches!(
            runner.execute(&task).await,
            Err(LaunchError::EmptyCommand(id)) if id == "t2"
        ));
    }

    #[tokio::test]
    async fn test_wrapper_prefixes_argv() {
        let runner = TaskRunner::with_wrapper(vec!["env".into()]);
        let result = runner.execute(&sh("t3", "echo wrapped")).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "wrapped");
    }

    #[tokio::test]
    async fn test_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let task = sh("t4", "pwd").with_workdir(dir.path());
        let result = TaskRunner::new().execute(&task).await.unwrap();
        let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }
}
