use std::io;
use thiserror::Error;

use satchel_api::errors::StorageError;

/// Errors related to pool dispatch.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Partition {index} of pool '{pool}' failed: {source}")]
    Partition {
        pool: String,
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("Worker panicked while processing partition {index} of pool '{pool}': {message}")]
    WorkerPanicked {
        pool: String,
        index: usize,
        message: String,
    },
    #[error("Pool '{0}' lost its workers before the partition completed")]
    WorkerLost(String),
    #[error("Failed to spawn pool worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Errors related to single-shot worker invocations.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker '{label}': {source}")]
    Spawn {
        label: String,
        #[source]
        source: io::Error,
    },
    #[error("Worker '{label}' operation failed: {source}")]
    Operation {
        label: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Worker '{label}' panicked: {message}")]
    Panicked { label: String, message: String },
    #[error("Worker '{0}' exited without reporting a result")]
    Vanished(String),
}

impl WorkerError {
    /// The operation's own error, when the failure came from the operation.
    pub fn operation_error(&self) -> Option<&anyhow::Error> {
        match self {
            WorkerError::Operation { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised by one watchdog evaluation. Never fatal to the watchdog loop.
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("Session storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to lock wallet: {0}")]
    Lock(#[source] anyhow::Error),
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "Unknown panic".to_string(),
        },
    }
}
