//! Command line interface.

mod commands;
pub mod logging;
mod progress;

pub use commands::{run, Cli};
pub use logging::{is_verbose, JobLog};
