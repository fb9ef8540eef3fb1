// Satchel background substrate
//
// This crate implements the concurrency and messaging core of the wallet's
// background process on top of the ports defined in satchel-api: worker pools
// for scanning and proving, single-shot workers for side-effecting operations,
// the exclusive client lock, the page message bridge and the autolock watchdog.

pub mod bridge;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod pool;
pub mod shard;
pub mod single_shot;
pub mod store;
pub mod system;
pub mod watchdog;

// Re-export commonly used types
pub use bridge::{InboundFrame, MessageBridge, PageClient};
pub use config::{AutolockConfig, BridgeConfig, PoolConfig, PoolSizing, SatchelConfig};
pub use error::{PoolError, WatchdogError, WorkerError};
pub use lock::{ClientLock, LockState, LockTicket, SharedClient};
pub use pool::{PoolMetrics, WorkerPool, WorkerPoolManager};
pub use shard::{ShardStrategy, shard};
pub use single_shot::SingleShotInvoker;
pub use store::{FileStore, MemoryStore};
pub use system::{SatchelSystem, Surface};
pub use watchdog::{AutolockWatchdog, SurfaceConnection, SurfaceCoordinator, WatchdogState};
