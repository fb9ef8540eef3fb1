//! # Single-Shot Workers
//!
//! Operations with side effects that must not be retried blindly (submitting a
//! signed transaction, consuming a note) each get a fresh worker thread of their
//! own. The payload moves into the worker, so a large `Vec<u8>` changes owner
//! without being copied. The worker is torn down before the call returns, on the
//! success path and on every failure path.

use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{WorkerError, panic_message};

enum ShotReply<R> {
    Finished(anyhow::Result<R>),
    Panicked(String),
    RuntimeUnavailable(io::Error),
}

#[derive(Debug, Default)]
struct ShotCounters {
    spawned: AtomicUsize,
    terminated: AtomicUsize,
}

/// Marks the worker terminated when its thread unwinds or returns.
struct ExitGuard(Arc<ShotCounters>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

/// Spawns one worker per call and guarantees its teardown.
///
/// Clones share counters, so a clone handed to another call site still reports
/// into the same totals.
#[derive(Debug, Clone, Default)]
pub struct SingleShotInvoker {
    counters: Arc<ShotCounters>,
}

impl SingleShotInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workers spawned so far.
    pub fn spawned(&self) -> usize {
        self.counters.spawned.load(Ordering::SeqCst)
    }

    /// Workers whose thread has exited.
    pub fn terminated(&self) -> usize {
        self.counters.terminated.load(Ordering::SeqCst)
    }

    /// Workers currently alive.
    pub fn running(&self) -> usize {
        self.spawned().saturating_sub(self.terminated())
    }

    /// Run `operation(payload)` on a fresh worker and wait for it.
    ///
    /// The operation runs on the worker's own single-threaded runtime, so its
    /// future does not need to be `Send`. Once started it cannot be cancelled:
    /// dropping the returned future leaves the worker to finish and exit alone.
    pub async fn invoke<P, R, F, Fut>(&self, label: &str, payload: P, operation: F) -> Result<R, WorkerError>
    where
        P: Send + 'static,
        R: Send + 'static,
        F: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<R>> + 'static,
    {
        let (reply, outcome) = oneshot::channel::<ShotReply<R>>();
        let counters = self.counters.clone();
        let dispatch = crate::logging::current_subscriber();

        let spawn_counters = counters.clone();
        counters.spawned.fetch_add(1, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name(format!("satchel-shot-{}", label))
            .spawn(move || {
                let _exit = ExitGuard(spawn_counters);
                tracing::dispatcher::with_default(&dispatch, || {
                    let message = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                        Ok(runtime) => {
                            match panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(operation(payload)))) {
                                Ok(result) => ShotReply::Finished(result),
                                Err(payload) => ShotReply::Panicked(panic_message(payload)),
                            }
                        }
                        Err(error) => ShotReply::RuntimeUnavailable(error),
                    };
                    let _ = reply.send(message);
                });
            })
            .map_err(|source| {
                counters.spawned.fetch_sub(1, Ordering::SeqCst);
                WorkerError::Spawn {
                    label: label.to_string(),
                    source,
                }
            })?;
        debug!(worker = label, "single-shot worker spawned");

        let outcome = outcome.await;

        // Terminate before reporting, whatever the outcome.
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(payload)) => warn!(worker = label, "worker thread panicked during teardown: {}", panic_message(payload)),
            Err(error) => warn!(worker = label, "failed to join worker thread: {}", error),
        }
        debug!(worker = label, "single-shot worker terminated");

        match outcome {
            Ok(ShotReply::Finished(Ok(value))) => Ok(value),
            Ok(ShotReply::Finished(Err(source))) => Err(WorkerError::Operation {
                label: label.to_string(),
                source,
            }),
            Ok(ShotReply::Panicked(message)) => Err(WorkerError::Panicked {
                label: label.to_string(),
                message,
            }),
            Ok(ShotReply::RuntimeUnavailable(source)) => Err(WorkerError::Spawn {
                label: label.to_string(),
                source,
            }),
            Err(_) => Err(WorkerError::Vanished(label.to_string())),
        }
    }
}
