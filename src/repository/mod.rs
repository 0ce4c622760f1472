//! Persistence for job inputs, statuses and metrics.
//!
//! All access goes through Diesel with either a SQLite or a PostgreSQL
//! backend; schema changes are cetane migrations.

pub mod jobs;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod util;

pub use jobs::{DieselJobRepository, StatusStore};
pub use migrations::run_migrations;
pub use pool::{DbPool, DieselError};
