//! External command execution and the bounded worker pool.
//!
//! A [`Task`] is a fully materialized argv plus the files it reads and the
//! file it is expected to produce. [`TaskRunner`] executes one task and never
//! treats a nonzero exit as an error; [`WorkerPool`] fans a list of tasks out
//! over a fixed number of workers and returns results in submission order.

mod pool;
mod runner;

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

pub use pool::{PoolError, PoolEvent, WorkerPool};
pub use runner::{LaunchError, TaskRunner};

/// Exit code reported for a task whose command could not be started.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// One externally executed unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub argv: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    /// Working directory for the command. Each task gets its own.
    pub workdir: Option<PathBuf>,
}

impl Task {
    pub fn new(id: impl Into<String>, argv: Vec<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            argv,
            inputs: Vec::new(),
            output: output.into(),
            workdir: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<PathBuf>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }
}

/// Outcome of one task. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub output_path: PathBuf,
    #[serde(skip)]
    pub elapsed: Duration,
    /// Set when the command never started; `exit_code` is then
    /// [`LAUNCH_FAILURE_EXIT_CODE`].
    pub launch_error: Option<String>,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Result for a task whose command could not be spawned.
    pub fn launch_failed(task: &Task, error: &LaunchError) -> Self {
        Self {
            task_id: task.id.clone(),
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: error.to_string(),
            output_path: task.output.clone(),
            elapsed: Duration::ZERO,
            launch_error: Some(error.to_string()),
        }
    }
}
