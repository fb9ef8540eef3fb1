use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{error, trace};

use crate::error::panic_message;

/// Result reported by a job to the worker that ran it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

/// A unit of work queued on a pool. Owns its input; replies on its own channel.
pub type Job = Box<dyn FnOnce() -> JobOutcome + Send + 'static>;

/// Status codes for worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Waiting on the pool queue
    Idle = 0,
    /// Running a job
    Processing = 1,
    /// Queue closed, thread exiting
    Stopped = 2,
}

impl WorkerStatus {
    fn from_raw(raw: usize) -> Self {
        match raw {
            0 => WorkerStatus::Idle,
            1 => WorkerStatus::Processing,
            _ => WorkerStatus::Stopped,
        }
    }
}

/// Counters shared by every worker of one pool.
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
}

/// One execution unit of a pool: a named OS thread draining the pool's FIFO queue.
///
/// Workers share no state with callers beyond the queue. Inputs move in with the
/// job and results move out over the job's reply channel.
pub struct PoolWorker {
    id: usize,
    pool_name: String,
    queue: flume::Receiver<Job>,
    status: Arc<AtomicUsize>,
    counters: Arc<PoolCounters>,
    dispatch: tracing::Dispatch,
}

impl fmt::Debug for PoolWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolWorker")
            .field("id", &self.id)
            .field("pool", &self.pool_name)
            .field("status", &WorkerStatus::from_raw(self.status.load(Ordering::Relaxed)))
            .finish()
    }
}

/// Handle kept by the pool for each spawned worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: usize,
    status: Arc<AtomicUsize>,
    _thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_raw(self.status.load(Ordering::Relaxed))
    }
}

impl PoolWorker {
    pub fn new(
        id: usize,
        pool_name: impl Into<String>,
        queue: flume::Receiver<Job>,
        counters: Arc<PoolCounters>,
        dispatch: tracing::Dispatch,
    ) -> Self {
        Self {
            id,
            pool_name: pool_name.into(),
            queue,
            status: Arc::new(AtomicUsize::new(WorkerStatus::Idle as usize)),
            counters,
            dispatch,
        }
    }

    /// Start the worker thread.
    pub fn spawn(self, thread_name: String) -> std::io::Result<WorkerHandle> {
        let id = self.id;
        let status = self.status.clone();
        let thread = thread::Builder::new().name(thread_name).spawn(move || {
            let dispatch = self.dispatch.clone();
            tracing::dispatcher::with_default(&dispatch, || self.run_loop());
        })?;
        Ok(WorkerHandle {
            id,
            status,
            _thread: thread,
        })
    }

    /// Run jobs until every sender of the queue is gone.
    fn run_loop(&self) {
        while let Ok(job) = self.queue.recv() {
            self.status.store(WorkerStatus::Processing as usize, Ordering::Relaxed);
            trace!(pool = %self.pool_name, worker = self.id, "job started");

            match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(JobOutcome::Completed) => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(JobOutcome::Failed) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    // Jobs catch their own handler panics; this only fires on a
                    // panic in the reply path itself.
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        pool = %self.pool_name,
                        worker = self.id,
                        "job panicked outside its handler: {}",
                        panic_message(payload)
                    );
                }
            }

            self.status.store(WorkerStatus::Idle as usize, Ordering::Relaxed);
        }

        self.status.store(WorkerStatus::Stopped as usize, Ordering::Relaxed);
        trace!(pool = %self.pool_name, worker = self.id, "queue closed, worker exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_worker_counts_outcomes_and_stops() {
        let (tx, rx) = flume::unbounded::<Job>();
        let counters = Arc::new(PoolCounters::default());
        let worker = PoolWorker::new(0, "test", rx, counters.clone(), crate::logging::current_subscriber());
        let handle = worker.spawn("satchel-test-0".into()).unwrap();

        tx.send(Box::new(|| JobOutcome::Completed)).unwrap();
        tx.send(Box::new(|| JobOutcome::Failed)).unwrap();
        tx.send(Box::new(|| panic!("reply path broke"))).unwrap();

        wait_until(|| {
            counters.completed.load(Ordering::Relaxed) == 1 && counters.failed.load(Ordering::Relaxed) == 2
        });

        drop(tx);
        wait_until(|| handle.status() == WorkerStatus::Stopped);
    }
}
