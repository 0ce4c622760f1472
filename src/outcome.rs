//! Aggregate job outcome classification.
//!
//! Download codes are checked first and are fatal. Otherwise the compute and
//! upload phases fold into one of four statuses so an operator gets a single
//! actionable value per job.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Location string recorded when nothing was uploaded.
pub const NOT_APPLICABLE: &str = "Not Applicable";

/// Terminal (or initial) status of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Unknown,
    Completed,
    CwlFailed,
    UploadFailure,
    Failed,
    DownloadError,
    /// Tool-specific early-exit status such as `BAM_SIZE_ZERO_ERROR`.
    ToolError(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Completed => "COMPLETED",
            Self::CwlFailed => "CWL_FAILED",
            Self::UploadFailure => "UPLOAD_FAILURE",
            Self::Failed => "FAILED",
            Self::DownloadError => "DOWNLOAD_ERROR",
            Self::ToolError(code) => code,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN" => Some(Self::Unknown),
            "COMPLETED" => Some(Self::Completed),
            "CWL_FAILED" => Some(Self::CwlFailed),
            "UPLOAD_FAILURE" => Some(Self::UploadFailure),
            "FAILED" => Some(Self::Failed),
            "DOWNLOAD_ERROR" => Some(Self::DownloadError),
            other if other.ends_with("_ERROR") => Some(Self::ToolError(other.to_string())),
            _ => None,
        }
    }

    /// Status for an input of `kind` (e.g. `bam`) that downloaded empty.
    pub fn size_zero(kind: &str) -> Self {
        Self::ToolError(format!("{}_SIZE_ZERO_ERROR", kind.to_ascii_uppercase()))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown job status: {}", s)))
    }
}

/// Where results ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Uploaded(String),
    NotApplicable,
}

impl Location {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Uploaded(target) => target,
            Self::NotApplicable => NOT_APPLICABLE,
        }
    }
}

/// Classified result of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: JobStatus,
    /// `None` when the job aborted before anything could be uploaded.
    pub location: Option<Location>,
    /// First nonzero download code, if the download phase failed.
    pub download_exit_code: Option<i32>,
}

impl Outcome {
    /// Outcome of an early-exit branch that skipped compute and upload.
    pub fn aborted(status: JobStatus) -> Self {
        Self {
            status,
            location: None,
            download_exit_code: None,
        }
    }

    /// Exit code for the whole process: 0 on success, the download code
    /// when downloads failed, 1 otherwise.
    pub fn process_exit_code(&self) -> i32 {
        match (&self.status, self.download_exit_code) {
            (JobStatus::Completed, _) => 0,
            (JobStatus::DownloadError, Some(code)) if code != 0 => code,
            _ => 1,
        }
    }
}

fn first_failure(codes: &[i32]) -> Option<i32> {
    codes.iter().copied().find(|&code| code != 0)
}

/// Map phase exit codes to a status and location.
///
/// | download | compute  | upload  | status           | location       |
/// |----------|----------|---------|------------------|----------------|
/// | nonzero  | -        | -       | `DOWNLOAD_ERROR` | none           |
/// | zero     | zero     | zero    | `COMPLETED`      | upload target  |
/// | zero     | nonzero  | zero    | `CWL_FAILED`     | upload target  |
/// | zero     | zero     | nonzero | `UPLOAD_FAILURE` | Not Applicable |
/// | zero     | nonzero  | nonzero | `FAILED`         | Not Applicable |
pub fn classify(download: &[i32], compute: &[i32], upload: i32, upload_target: &str) -> Outcome {
    if let Some(code) = first_failure(download) {
        return Outcome {
            status: JobStatus::DownloadError,
            location: None,
            download_exit_code: Some(code),
        };
    }

    let compute_ok = first_failure(compute).is_none();
    let (status, location) = match (compute_ok, upload == 0) {
        (true, true) => (
            JobStatus::Completed,
            Location::Uploaded(upload_target.to_string()),
        ),
        (false, true) => (
            JobStatus::CwlFailed,
            Location::Uploaded(upload_target.to_string()),
        ),
        (true, false) => (JobStatus::UploadFailure, Location::NotApplicable),
        (false, false) => (JobStatus::Failed, Location::NotApplicable),
    };

    Outcome {
        status,
        location: Some(location),
        download_exit_code: None,
    }
}
