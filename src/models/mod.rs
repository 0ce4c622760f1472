//! Data models for jobs, their inputs and usage metrics.

mod input;
mod job;
mod metrics;

pub use input::PairInput;
pub use job::{JobError, JobPhase, JobRecord, Lifecycle};
pub use metrics::{JobMetrics, TimeMetrics};
