use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::future::try_join_all;
use tokio::sync::oneshot;
use tracing::{Instrument, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, panic_message};
use crate::shard::shard;

use super::worker::{Job, JobOutcome, PoolCounters, PoolWorker, WorkerHandle, WorkerStatus};

/// What a partition handler sends back: its output, its error, or a panic message.
type PartitionReply<R> = Result<anyhow::Result<Vec<R>>, String>;

/// Snapshot of a pool's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMetrics {
    pub name: String,
    pub size: usize,
    pub queued: usize,
    pub busy_workers: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

/// A fixed-size set of worker threads behind one FIFO task queue.
///
/// Created once per task kind and reused for the life of the process. Partitions
/// beyond the pool size wait in the queue; workers take them in submission order.
pub struct WorkerPool {
    config: PoolConfig,
    size: usize,
    queue: flume::Sender<Job>,
    workers: Vec<WorkerHandle>,
    counters: Arc<PoolCounters>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.config.name)
            .field("size", &self.size)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl WorkerPool {
    /// Spawn a pool of `size` workers (at least one).
    pub fn new(config: PoolConfig, size: usize) -> Result<Self, PoolError> {
        let size = size.max(1);
        let (queue, receiver) = flume::unbounded::<Job>();
        let counters = Arc::new(PoolCounters::default());
        let dispatch = crate::logging::current_subscriber();

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let worker = PoolWorker::new(id, config.name.clone(), receiver.clone(), counters.clone(), dispatch.clone());
            let thread_name = format!("{}{}-{}", config.thread_name_prefix, config.name, id);
            workers.push(worker.spawn(thread_name)?);
        }

        crate::log_pool!(config.name.as_str(), "created", size = size);

        Ok(Self {
            config,
            size,
            queue,
            workers,
            counters,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Queue one partition and return the channel its reply arrives on.
    fn submit<T, R, H>(&self, partition: Vec<T>, handler: Arc<H>) -> Result<oneshot::Receiver<PartitionReply<R>>, PoolError>
    where
        T: Send + 'static,
        R: Send + 'static,
        H: Fn(Vec<T>) -> anyhow::Result<Vec<R>> + Send + Sync + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (handler.as_ref())(partition))).map_err(panic_message);
            let status = match &outcome {
                Ok(Ok(_)) => JobOutcome::Completed,
                _ => JobOutcome::Failed,
            };
            // The dispatcher may have given up on this partition already.
            let _ = reply.send(outcome);
            status
        });

        self.queue
            .send(job)
            .map_err(|_| PoolError::WorkerLost(self.config.name.clone()))?;
        Ok(receiver)
    }

    /// Shard `units` across the pool, run `handler` on every partition and
    /// concatenate the outputs in submission order.
    ///
    /// The first failing partition fails the dispatch. Partitions already queued or
    /// running are not cancelled; they finish and their output is dropped.
    pub async fn dispatch<T, R, H>(&self, units: Vec<T>, handler: H) -> Result<Vec<R>, PoolError>
    where
        T: Send + 'static,
        R: Send + 'static,
        H: Fn(Vec<T>) -> anyhow::Result<Vec<R>> + Send + Sync + 'static,
    {
        let unit_count = units.len();
        let span = crate::pool_span!(self.config.name.as_str(), units = unit_count);

        async move {
            let handler = Arc::new(handler);
            let partitions = shard(units, self.size, self.config.strategy);
            crate::log_pool!(self.config.name.as_str(), "dispatch", partitions = partitions.len());

            let mut replies = Vec::with_capacity(partitions.len());
            for partition in partitions {
                replies.push(self.submit(partition, handler.clone())?);
            }

            let pool = self.config.name.as_str();
            let outputs = try_join_all(replies.into_iter().enumerate().map(|(index, reply)| async move {
                match reply.await {
                    Ok(Ok(Ok(output))) => Ok(output),
                    Ok(Ok(Err(source))) => {
                        warn!(pool, index, "partition failed: {:#}", source);
                        Err(PoolError::Partition {
                            pool: pool.to_string(),
                            index,
                            source,
                        })
                    }
                    Ok(Err(message)) => {
                        warn!(pool, index, "partition panicked: {}", message);
                        Err(PoolError::WorkerPanicked {
                            pool: pool.to_string(),
                            index,
                            message,
                        })
                    }
                    Err(_) => Err(PoolError::WorkerLost(pool.to_string())),
                }
            }))
            .await?;

            Ok(outputs.into_iter().flatten().collect())
        }
        .instrument(span)
        .await
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            name: self.config.name.clone(),
            size: self.size,
            queued: self.queue.len(),
            busy_workers: self
                .workers
                .iter()
                .filter(|worker| worker.status() == WorkerStatus::Processing)
                .count(),
            completed_tasks: self.counters.completed.load(Ordering::Relaxed),
            failed_tasks: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
