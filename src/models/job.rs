//! Job record: the per-job accumulator handed to the status store.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::outcome::{JobStatus, Outcome};

/// Pipeline phase whose wall time is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Download,
    Prepare,
    Compute,
    Merge,
    Upload,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Prepare => "prepare",
            Self::Compute => "compute",
            Self::Merge => "merge",
            Self::Upload => "upload",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "download" => Some(Self::Download),
            "prepare" => Some(Self::Prepare),
            "compute" => Some(Self::Compute),
            "merge" => Some(Self::Merge),
            "upload" => Some(Self::Upload),
            _ => None,
        }
    }
}

/// Where a record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Created,
    Running,
    Finished,
    Persisted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Job {job_id}: cannot {action} while {state:?}")]
    InvalidTransition {
        job_id: String,
        state: Lifecycle,
        action: &'static str,
    },
    #[error("Job {job_id}: cannot finish with non-terminal status {status}")]
    NotTerminal { job_id: String, status: JobStatus },
}

/// Timings, identifiers and terminal status of one job.
///
/// Created with status `UNKNOWN`, finished exactly once, then persisted.
/// Every mutator fails once the record is finished (except artifact and
/// phase bookkeeping before finish) and all of them fail after persistence.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    job_id: String,
    identifiers: BTreeMap<String, String>,
    status: JobStatus,
    location: Option<String>,
    datetime_start: DateTime<Utc>,
    datetime_end: Option<DateTime<Utc>>,
    checksum: Option<String>,
    size: Option<i64>,
    host: Option<String>,
    elapsed_by_phase: BTreeMap<JobPhase, f64>,
    #[serde(skip)]
    lifecycle: Lifecycle,
}

impl JobRecord {
    /// Mint a new record with a fresh job id.
    pub fn new(identifiers: BTreeMap<String, String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), identifiers)
    }

    pub fn with_id(job_id: impl Into<String>, identifiers: BTreeMap<String, String>) -> Self {
        Self {
            job_id: job_id.into(),
            identifiers,
            status: JobStatus::Unknown,
            location: None,
            datetime_start: Utc::now(),
            datetime_end: None,
            checksum: None,
            size: None,
            host: get_hostname(),
            elapsed_by_phase: BTreeMap::new(),
            lifecycle: Lifecycle::Created,
        }
    }

    /// Rebuild a record that was read back from the status store.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        job_id: String,
        identifiers: BTreeMap<String, String>,
        status: JobStatus,
        location: Option<String>,
        datetime_start: DateTime<Utc>,
        datetime_end: Option<DateTime<Utc>>,
        checksum: Option<String>,
        size: Option<i64>,
        host: Option<String>,
        elapsed_by_phase: BTreeMap<JobPhase, f64>,
    ) -> Self {
        Self {
            job_id,
            identifiers,
            status,
            location,
            datetime_start,
            datetime_end,
            checksum,
            size,
            host,
            elapsed_by_phase,
            lifecycle: Lifecycle::Persisted,
        }
    }

    fn require(&self, allowed: &[Lifecycle], action: &'static str) -> Result<(), JobError> {
        if allowed.contains(&self.lifecycle) {
            Ok(())
        } else {
            Err(JobError::InvalidTransition {
                job_id: self.job_id.clone(),
                state: self.lifecycle,
                action,
            })
        }
    }

    pub fn start(&mut self) -> Result<(), JobError> {
        self.require(&[Lifecycle::Created], "start")?;
        self.datetime_start = Utc::now();
        self.lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Add `elapsed` to the running total for `phase`.
    pub fn record_phase(&mut self, phase: JobPhase, elapsed: Duration) -> Result<(), JobError> {
        self.require(&[Lifecycle::Running], "record phase timing")?;
        *self.elapsed_by_phase.entry(phase).or_insert(0.0) += elapsed.as_secs_f64();
        Ok(())
    }

    pub fn set_artifact(&mut self, checksum: String, size: u64) -> Result<(), JobError> {
        self.require(&[Lifecycle::Running], "attach artifact")?;
        self.checksum = Some(checksum);
        self.size = Some(i64::try_from(size).unwrap_or(i64::MAX));
        Ok(())
    }

    /// Assign the terminal status. Allowed once, from `Created` (early
    /// exit before start) or `Running`.
    pub fn finish(&mut self, outcome: &Outcome) -> Result<(), JobError> {
        self.require(&[Lifecycle::Created, Lifecycle::Running], "finish")?;
        if !outcome.status.is_terminal() {
            return Err(JobError::NotTerminal {
                job_id: self.job_id.clone(),
                status: outcome.status.clone(),
            });
        }

        self.status = outcome.status.clone();
        self.location = outcome.location.as_ref().map(|l| l.as_str().to_string());
        self.datetime_end = Some(Utc::now());
        self.lifecycle = Lifecycle::Finished;
        Ok(())
    }

    /// Called once the status store has acknowledged the record.
    pub fn mark_persisted(&mut self) -> Result<(), JobError> {
        self.require(&[Lifecycle::Finished], "mark persisted")?;
        self.lifecycle = Lifecycle::Persisted;
        Ok(())
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn identifiers(&self) -> &BTreeMap<String, String> {
        &self.identifiers
    }

    pub fn identifier(&self, key: &str) -> Option<&str> {
        self.identifiers.get(key).map(String::as_str)
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn datetime_start(&self) -> DateTime<Utc> {
        self.datetime_start
    }

    pub fn datetime_end(&self) -> Option<DateTime<Utc>> {
        self.datetime_end
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn size(&self) -> Option<i64> {
        self.size
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn elapsed_by_phase(&self) -> &BTreeMap<JobPhase, f64> {
        &self.elapsed_by_phase
    }

    pub fn elapsed(&self, phase: JobPhase) -> f64 {
        self.elapsed_by_phase.get(&phase).copied().unwrap_or(0.0)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Wall time from start to end, if finished.
    pub fn total_seconds(&self) -> Option<f64> {
        self.datetime_end
            .map(|end| (end - self.datetime_start).num_milliseconds() as f64 / 1000.0)
    }
}

/// Get the current hostname.
fn get_hostname() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}
