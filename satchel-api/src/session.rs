//! # Session State and Ports
//!
//! The autolock watchdog shares one small record between every open wallet
//! surface. The record lives in external persistent storage, never in memory,
//! so that the idle timer survives a restart of the background process.
//!
//! ## Keys
//!
//! | key                                   | value                     |
//! |---------------------------------------|---------------------------|
//! | `satchel.open_surface_count`          | integer >= 0              |
//! | `satchel.last_all_surfaces_closed_at` | epoch millis, or absent   |
//! | `satchel.lock_threshold_ms`           | integer, optional override|
//! | `satchel.autolock_enabled`            | bool, user setting        |

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StorageError;
use crate::types::{EpochMillis, SatchelResult};

pub const OPEN_SURFACE_COUNT_KEY: &str = "satchel.open_surface_count";
pub const LAST_ALL_SURFACES_CLOSED_AT_KEY: &str = "satchel.last_all_surfaces_closed_at";
pub const LOCK_THRESHOLD_KEY: &str = "satchel.lock_threshold_ms";
pub const AUTOLOCK_ENABLED_KEY: &str = "satchel.autolock_enabled";

/// Persistent key/value storage shared by every surface.
///
/// Implementations must survive process restarts. Values are JSON.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value, `None` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }
}

/// Snapshot of the shared session record.
///
/// When `open_surface_count == 0` the closure timestamp is meaningful; while
/// surfaces are open it may be stale.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub open_surface_count: u32,
    pub last_all_surfaces_closed_at: Option<EpochMillis>,
    pub lock_threshold_ms: u64,
}

impl SessionState {
    /// Read the record from `store`, using `default_threshold` when no override is stored.
    pub async fn load<S: SessionStore + ?Sized>(
        store: &S,
        default_threshold: Duration,
    ) -> Result<Self, StorageError> {
        let open_surface_count = match store.get(OPEN_SURFACE_COUNT_KEY).await? {
            Some(value) => serde_json::from_value(value)?,
            None => 0,
        };
        let last_all_surfaces_closed_at = match store.get(LAST_ALL_SURFACES_CLOSED_AT_KEY).await? {
            Some(Value::Null) | None => None,
            Some(value) => Some(serde_json::from_value(value)?),
        };
        let lock_threshold_ms = match store.get(LOCK_THRESHOLD_KEY).await? {
            Some(value) => serde_json::from_value(value)?,
            None => default_threshold.as_millis() as u64,
        };
        Ok(Self {
            open_surface_count,
            last_all_surfaces_closed_at,
            lock_threshold_ms,
        })
    }

    /// Milliseconds since every surface was last closed, if ever.
    pub fn idle_millis(&self, now: EpochMillis) -> Option<u64> {
        self.last_all_surfaces_closed_at
            .map(|closed_at| now.saturating_sub(closed_at))
    }
}

/// Read the user's autolock setting, `default` when never set.
pub async fn autolock_enabled<S: SessionStore + ?Sized>(
    store: &S,
    default: bool,
) -> Result<bool, StorageError> {
    match store.get(AUTOLOCK_ENABLED_KEY).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(default),
    }
}

/// Wall-clock source in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> EpochMillis;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> EpochMillis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Locks the wallet session. Called by the watchdog when the idle threshold passes.
#[async_trait]
pub trait WalletLocker: Send + Sync {
    async fn lock(&self) -> SatchelResult<()>;
}

#[async_trait]
impl<L: WalletLocker + ?Sized> WalletLocker for Arc<L> {
    async fn lock(&self) -> SatchelResult<()> {
        (**self).lock().await
    }
}
