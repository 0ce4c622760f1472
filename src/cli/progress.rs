//! Progress bar for the block fan-out.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::executor::PoolEvent;

/// Drain `rx` into a progress bar until every sender is dropped.
pub fn spawn_block_progress(total: u64, mut rx: mpsc::Receiver<PoolEvent>) -> JoinHandle<()> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} blocks {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );

    tokio::spawn(async move {
        let mut failed = 0usize;
        while let Some(event) = rx.recv().await {
            match event {
                PoolEvent::Started {
                    worker_id, task_id, ..
                } => pb.set_message(format!("worker {} -> {}", worker_id, task_id)),
                PoolEvent::Finished {
                    task_id, exit_code, ..
                } => {
                    if exit_code != 0 {
                        failed += 1;
                        pb.println(format!(
                            "{} {} exited with {}",
                            style("✗").red(),
                            task_id,
                            exit_code
                        ));
                    }
                    pb.inc(1);
                }
            }
        }

        if failed == 0 {
            pb.finish_with_message(format!("{}", style("done").green()));
        } else {
            pb.finish_with_message(format!("{}", style(format!("{} failed", failed)).red()));
        }
    })
}
