//! # Autolock Watchdog
//!
//! Every open wallet surface connects to the [`SurfaceCoordinator`] and runs an
//! [`AutolockWatchdog`]. The coordinator keeps the open-surface count and the
//! last closure timestamp in the session store; the watchdog reads them back to
//! decide whether the session has been idle long enough to lock.

mod autolock;
mod coordinator;

pub use autolock::{AutolockWatchdog, WatchdogState};
pub use coordinator::{SurfaceConnection, SurfaceCoordinator};
