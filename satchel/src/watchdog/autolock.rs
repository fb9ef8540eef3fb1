use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use satchel_api::session::{self, Clock, LAST_ALL_SURFACES_CLOSED_AT_KEY, SessionState, SessionStore, WalletLocker};
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::AutolockConfig;
use crate::error::WatchdogError;

/// Watchdog view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Unlocked,
    Locked,
}

/// Decides, per surface, whether the wallet should lock itself.
///
/// The wallet locks when autolock is enabled, this is the only open surface, and
/// every surface was closed for longer than the threshold before it opened. All
/// inputs are read from the session store on each evaluation, so the decision
/// survives restarts of the background process.
pub struct AutolockWatchdog {
    surface: String,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    locker: Arc<dyn WalletLocker>,
    config: AutolockConfig,
    state: Mutex<WatchdogState>,
}

impl fmt::Debug for AutolockWatchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutolockWatchdog")
            .field("surface", &self.surface)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl AutolockWatchdog {
    pub fn new(
        surface: impl Into<String>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        locker: Arc<dyn WalletLocker>,
        config: AutolockConfig,
    ) -> Self {
        Self {
            surface: surface.into(),
            store,
            clock,
            locker,
            config,
            state: Mutex::new(WatchdogState::Unlocked),
        }
    }

    pub fn state(&self) -> WatchdogState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WatchdogState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Evaluate the lock condition once.
    ///
    /// Once `Locked`, further evaluations are no-ops until [`rearm`](Self::rearm).
    pub async fn evaluate(&self) -> Result<WatchdogState, WatchdogError> {
        if self.state() == WatchdogState::Locked {
            return Ok(WatchdogState::Locked);
        }

        if !session::autolock_enabled(self.store.as_ref(), self.config.enabled_by_default).await? {
            return Ok(WatchdogState::Unlocked);
        }

        let session = SessionState::load(self.store.as_ref(), self.config.lock_threshold).await?;
        if session.open_surface_count != 1 {
            debug!(surface = %self.surface, open = session.open_surface_count, "other surfaces open, not locking");
            return Ok(WatchdogState::Unlocked);
        }

        let now = self.clock.now_millis();
        let Some(idle) = session.idle_millis(now) else {
            return Ok(WatchdogState::Unlocked);
        };
        if idle <= session.lock_threshold_ms {
            return Ok(WatchdogState::Unlocked);
        }

        self.locker.lock().await.map_err(WatchdogError::Lock)?;
        self.set_state(WatchdogState::Locked);
        crate::log_watchdog!(self.surface, "locked", idle_ms = idle, threshold_ms = session.lock_threshold_ms);
        Ok(WatchdogState::Locked)
    }

    /// Return to `Unlocked` after the user unlocks, restarting the idle timer.
    pub async fn rearm(&self) -> Result<(), WatchdogError> {
        let now = self.clock.now_millis();
        self.store.set(LAST_ALL_SURFACES_CLOSED_AT_KEY, Value::from(now)).await?;
        self.set_state(WatchdogState::Unlocked);
        crate::log_watchdog!(self.surface, "rearmed", at = now);
        Ok(())
    }

    /// Evaluate at startup and then every `check_interval` until `shutdown` resolves.
    ///
    /// Evaluation failures are logged and the decision waits for the next tick.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(error) = self.evaluate().await {
                        warn!(surface = %self.surface, "autolock evaluation deferred: {}", error);
                    }
                }
            }
        }
        debug!(surface = %self.surface, "watchdog stopped");
    }
}
