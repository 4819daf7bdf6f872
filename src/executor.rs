use std::panic::{catch_unwind, AssertUnwindSafe};

use flume::{Receiver, Sender};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed number of worker threads that run blocking router calls.
///
/// Cloning gives another handle to the same workers. The workers exit once
/// every handle is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct Executor {
    job_tx: Sender<Job>,
    workers: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WORKERS)
    }
}

impl Executor {
    pub const DEFAULT_WORKERS: usize = 4;

    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (job_tx, job_rx) = flume::unbounded::<Job>();

        for n in 0..workers {
            let job_rx = job_rx.clone();
            let _worker_thread = std::thread::spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    job();
                }
                debug!("worker {n} exiting");
            });
        }

        Self { job_tx, workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queues `f`. A panic inside `f` is reported as an error of the job, the
    /// worker survives it.
    pub fn spawn<T, F>(&self, f: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (result_tx, result_rx) = flume::bounded(1);
        let job: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
                error!("router job panicked");
                Err(Error::Protocol("router job panicked".to_string()))
            });
            let _ = result_tx.send(result);
        });
        if self.job_tx.send(job).is_err() {
            warn!("no workers left to run router job");
        }
        JobHandle { result_rx }
    }
}

/// The pending result of a job queued on an [`Executor`].
#[derive(Debug)]
pub struct JobHandle<T> {
    result_rx: Receiver<Result<T>>,
}

impl<T> JobHandle<T> {
    /// Blocks until the job has run.
    pub fn wait(self) -> Result<T> {
        self.result_rx.recv().unwrap_or_else(|_| Err(dropped()))
    }

    pub async fn join(self) -> Result<T> {
        self.result_rx
            .recv_async()
            .await
            .unwrap_or_else(|_| Err(dropped()))
    }
}

fn dropped() -> Error {
    Error::Protocol("router job was dropped before it ran".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn runs_jobs() {
        let executor = Executor::new(2);
        let handles: Vec<_> = (0..10).map(|i| executor.spawn(move || Ok(i * 2))).collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn bounded_parallelism() {
        let executor = Executor::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let max = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = running.clone();
                let max = max.clone();
                executor.spawn(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle.wait().unwrap();
        }
        assert!(max.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn errors_and_panics_are_results() {
        let executor = Executor::new(1);
        let failed = executor.spawn(|| -> Result<()> { Err(Error::Connection("down".to_string())) });
        assert_eq!(failed.wait(), Err(Error::Connection("down".to_string())));

        let panicked = executor.spawn(|| -> Result<()> { panic!("boom") });
        assert!(matches!(panicked.wait(), Err(Error::Protocol(_))));

        // the worker is still alive
        assert_eq!(executor.spawn(|| Ok(1)).wait(), Ok(1));
    }

    #[tokio::test]
    async fn join_from_async() {
        let executor = Executor::default();
        assert_eq!(executor.workers(), Executor::DEFAULT_WORKERS);
        let value = executor.spawn(|| Ok("done".to_string())).join().await;
        assert_eq!(value.as_deref(), Ok("done"));
    }
}
