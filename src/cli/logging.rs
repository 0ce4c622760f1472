//! Subscriber setup, plus a log file that follows the current job.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Handle to the per-job log file. Writes are discarded while no file is
/// open.
#[derive(Clone, Default)]
pub struct JobLog {
    file: Arc<Mutex<Option<File>>>,
}

impl JobLog {
    /// Start writing to `path`, creating its directory.
    pub fn open(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        *self.lock()? = Some(file);
        Ok(())
    }

    pub fn close(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(mut file) = guard.take() {
                let _ = file.flush();
            }
        }
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Option<File>>> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("job log lock poisoned"))
    }
}

pub struct JobLogWriter {
    log: JobLog,
}

impl Write for JobLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.log.lock()?.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.log.lock()?.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for JobLog {
    type Writer = JobLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        JobLogWriter { log: self.clone() }
    }
}

/// Install the global subscriber. The console honours `RUST_LOG`; the job
/// log always records this crate at debug so tool output is kept.
pub fn init(verbose: bool) -> JobLog {
    let default_filter = if verbose {
        "varscan_fanout=info"
    } else {
        "varscan_fanout=warn"
    };
    let job_log = JobLog::default();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
            ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(job_log.clone())
                .with_filter(EnvFilter::new("varscan_fanout=debug")),
        )
        .init();

    job_log
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_log_writes_only_while_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        let log = JobLog::default();

        log.make_writer().write_all(b"dropped\n").unwrap();
        log.open(&path).unwrap();
        log.make_writer().write_all(b"kept\n").unwrap();
        log.close();
        log.make_writer().write_all(b"dropped again\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn test_open_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job-1/results/job-1.varscan.log");
        let log = JobLog::default();

        log.open(&path).unwrap();
        log.make_writer().write_all(b"line\n").unwrap();
        log.close();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }
}
