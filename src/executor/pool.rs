//! Bounded worker pool with submission-ordered results.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::{Task, TaskResult, TaskRunner};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("No result was produced for item {0}")]
    MissingResult(usize),
}

/// Progress notifications emitted while tasks run.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Started {
        worker_id: usize,
        index: usize,
        task_id: String,
    },
    Finished {
        worker_id: usize,
        index: usize,
        task_id: String,
        exit_code: i32,
    },
}

/// Fixed-size pool of workers pulling from a shared queue.
///
/// Workers never cancel each other: every submitted item runs to completion
/// and produces exactly one result, stored in the slot matching its
/// submission index.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    events: Option<mpsc::Sender<PoolEvent>>,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Result<Self, PoolError> {
        if concurrency == 0 {
            return Err(PoolError::InvalidConcurrency);
        }
        Ok(Self {
            concurrency,
            events: None,
        })
    }

    /// Send [`PoolEvent`]s to `tx` from [`run_tasks`](Self::run_tasks).
    ///
    /// The receiver must be drained, a full channel stalls the workers.
    pub fn with_events(mut self, tx: mpsc::Sender<PoolEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `work` over every item with at most `concurrency` in flight.
    ///
    /// `work` receives `(worker_id, index, item)`. The returned vector is
    /// aligned with `items`, whatever order the work finished in.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, work: F) -> Result<Vec<R>, PoolError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, usize, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let queue: Arc<Mutex<VecDeque<(usize, T)>>> =
            Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
        let slots: Arc<Mutex<Vec<Option<R>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let work = Arc::new(work);

        let workers = self.concurrency.min(total);
        debug!("Starting {} workers for {} items", workers, total);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let slots = slots.clone();
            let work = work.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let next = {
                        let mut queue = queue.lock().await;
                        queue.pop_front()
                    };

                    let Some((index, item)) = next else {
                        break;
                    };

                    let result = work(worker_id, index, item).await;
                    slots.lock().await[index] = Some(result);
                }
            }));
        }

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                warn!("Worker terminated abnormally: {}", e);
            }
        }

        let slots = std::mem::take(&mut *slots.lock().await);
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or(PoolError::MissingResult(index)))
            .collect()
    }

    /// Execute every task with `runner`. A task that cannot be launched
    /// yields a failing [`TaskResult`] instead of aborting its siblings.
    pub async fn run_tasks(
        &self,
        runner: &TaskRunner,
        tasks: Vec<Task>,
    ) -> Result<Vec<TaskResult>, PoolError> {
        let runner = Arc::new(runner.clone());
        let events = self.events.clone();

        self.run_all(tasks, move |worker_id, index, task: Task| {
            let runner = runner.clone();
            let events = events.clone();
            async move {
                if let Some(tx) = &events {
                    let _ = tx
                        .send(PoolEvent::Started {
                            worker_id,
                            index,
                            task_id: task.id.clone(),
                        })
                        .await;
                }

                let result = match runner.execute(&task).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("[{}] could not be launched: {}", task.id, e);
                        TaskResult::launch_failed(&task, &e)
                    }
                };

                if let Some(tx) = &events {
                    let _ = tx
                        .send(PoolEvent::Finished {
                            worker_id,
                            index,
                            task_id: task.id.clone(),
                            exit_code: result.exit_code,
                        })
                        .await;
                }

                result
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_concurrency_rejected() {
        assert_eq!(
            WorkerPool::new(0).err(),
            Some(PoolError::InvalidConcurrency)
        );
    }

    #[tokio::test]
    async fn test_empty_input() {
        let pool = WorkerPool::new(4).unwrap();
        let out: Vec<u32> = pool
            .run_all(Vec::<u32>::new(), |_, _, x| async move { x })
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_results_follow_submission_order() {
        let pool = WorkerPool::new(4).unwrap();
        // Later items finish first.
        let items: Vec<u64> = (0..12).collect();
        let out = pool
            .run_all(items, |_, _, x| async move {
                tokio::time::sleep(Duration::from_millis(60 - x * 5)).await;
                x * 10
            })
            .await
            .unwrap();
        assert_eq!(out, (0..12).map(|x| x * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        for concurrency in [1usize, 2, 3, 8] {
            let pool = WorkerPool::new(concurrency).unwrap();
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let a = active.clone();
            let p = peak.clone();
            let out = pool
                .run_all((0..10).collect::<Vec<u32>>(), move |_, _, x| {
                    let active = a.clone();
                    let peak = p.clone();
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        x
                    }
                })
                .await
                .unwrap();

            assert_eq!(out.len(), 10);
            assert!(peak.load(Ordering::SeqCst) <= concurrency);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failures_do_not_cancel_siblings() {
        let failing = [2usize, 5, 7];
        let tasks: Vec<Task> = (0..10)
            .map(|i| {
                let code = if failing.contains(&i) { 1 } else { 0 };
                Task::new(
                    format!("job.{}", i),
                    vec![
                        "sh".into(),
                        "-c".into(),
                        format!("sleep 0.0{}; exit {}", (10 - i) % 5, code),
                    ],
                    format!("/tmp/job.{}.out", i),
                )
            })
            .collect();

        let pool = WorkerPool::new(3).unwrap();
        let results = pool.run_tasks(&TaskRunner::new(), tasks).await.unwrap();

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.task_id, format!("job.{}", i));
            assert_eq!(result.success(), !failing.contains(&i), "task {}", i);
        }
    }

    #[tokio::test]
    async fn test_launch_failure_becomes_failing_result() {
        let tasks = vec![
            Task::new("a", vec!["/nonexistent/bin-a".into()], "/tmp/a"),
            Task::new("b", Vec::new(), "/tmp/b"),
        ];
        let pool = WorkerPool::new(2).unwrap();
        let results = pool.run_tasks(&TaskRunner::new(), tasks).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.launch_error.is_some()));
        assert!(results
            .iter()
            .all(|r| r.exit_code == crate::executor::LAUNCH_FAILURE_EXIT_CODE));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_events_are_emitted_per_task() {
        let (tx, mut rx) = mpsc::channel(64);
        let pool = WorkerPool::new(2).unwrap().with_events(tx);
        let tasks: Vec<Task> = (0..4)
            .map(|i| Task::new(format!("e.{}", i), vec!["true".into()], "/tmp/e"))
            .collect();

        let results = pool.run_tasks(&TaskRunner::new(), tasks).await.unwrap();
        drop(pool);

        let mut started = 0;
        let mut finished = 0;
        while let Some(event) = rx.recv().await {
            match event {
                PoolEvent::Started { .. } => started += 1,
                PoolEvent::Finished { exit_code, .. } => {
                    assert_eq!(exit_code, 0);
                    finished += 1;
                }
            }
        }
        assert_eq!(results.len(), 4);
        assert_eq!((started, finished), (4, 4));
    }
}
