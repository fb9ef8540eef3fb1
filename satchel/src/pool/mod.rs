//! # Worker Pools
//!
//! CPU-bound wallet work (record scanning, proof generation) runs on pools of
//! isolated worker threads.
//!
//! ## Key Concepts
//! - One pool per task kind, created lazily and reused for the process lifetime
//! - Inputs are sharded into partitions, one queued job per partition
//! - Workers share nothing with callers: partitions move in, results move out
//!
//! ## Failure Model
//! - A failing or panicking partition fails the whole dispatch
//! - Sibling partitions are never cancelled; their results are discarded
//! - Nothing is retried here; callers own retry policy

mod manager;
mod worker;
mod worker_pool;

pub use manager::{global, WorkerPoolManager};
pub use worker::{JobOutcome, WorkerStatus};
pub use worker_pool::{PoolMetrics, WorkerPool};
