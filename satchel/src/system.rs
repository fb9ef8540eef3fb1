use std::future::Future;
use std::sync::Arc;

use satchel_api::dispatcher::ActionDispatcher;
use satchel_api::errors::StorageError;
use satchel_api::session::{Clock, SessionStore, SystemClock, WalletLocker};
use tracing::info;

use crate::bridge::MessageBridge;
use crate::config::SatchelConfig;
use crate::error::{PoolError, WatchdogError};
use crate::pool::{self, PoolMetrics, WorkerPoolManager};
use crate::single_shot::SingleShotInvoker;
use crate::watchdog::{AutolockWatchdog, SurfaceConnection, SurfaceCoordinator, WatchdogState};

/// The background substrate, wired from one [`SatchelConfig`].
///
/// Owns the shared pieces every wallet operation funnels through: the worker
/// pools, the single-shot invoker and the surface coordinator. Bridges and
/// surfaces are created from it on demand.
pub struct SatchelSystem {
    config: SatchelConfig,
    pools: Arc<WorkerPoolManager>,
    invoker: SingleShotInvoker,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    locker: Arc<dyn WalletLocker>,
    coordinator: SurfaceCoordinator,
}

impl std::fmt::Debug for SatchelSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SatchelSystem")
            .field("config", &self.config)
            .field("pools", &self.pools)
            .finish_non_exhaustive()
    }
}

impl SatchelSystem {
    /// Start on the system clock and the process-wide pools.
    pub async fn start(
        config: SatchelConfig,
        store: Arc<dyn SessionStore>,
        locker: Arc<dyn WalletLocker>,
    ) -> Result<Self, StorageError> {
        Self::start_with(config, store, Arc::new(SystemClock), locker, pool::global()).await
    }

    /// Start with explicit clock and pool manager.
    ///
    /// Resets the open-surface count: surfaces from a previous run are gone.
    pub async fn start_with(
        config: SatchelConfig,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        locker: Arc<dyn WalletLocker>,
        pools: Arc<WorkerPoolManager>,
    ) -> Result<Self, StorageError> {
        let coordinator = SurfaceCoordinator::new(store.clone(), clock.clone());
        coordinator.init().await?;
        info!(
            parallelism = pools.available_parallelism(),
            scan_pool = %config.scan_pool.name,
            prove_pool = %config.prove_pool.name,
            "satchel substrate started"
        );

        Ok(Self {
            config,
            pools,
            invoker: SingleShotInvoker::new(),
            store,
            clock,
            locker,
            coordinator,
        })
    }

    pub fn config(&self) -> &SatchelConfig {
        &self.config
    }

    pub fn pools(&self) -> &Arc<WorkerPoolManager> {
        &self.pools
    }

    pub fn invoker(&self) -> &SingleShotInvoker {
        &self.invoker
    }

    pub fn coordinator(&self) -> &SurfaceCoordinator {
        &self.coordinator
    }

    /// Run record scanning over `units` on the scan pool.
    pub async fn scan<T, R, H>(&self, units: Vec<T>, handler: H) -> Result<Vec<R>, PoolError>
    where
        T: Send + 'static,
        R: Send + 'static,
        H: Fn(Vec<T>) -> anyhow::Result<Vec<R>> + Send + Sync + 'static,
    {
        self.pools.dispatch(&self.config.scan_pool, units, handler).await
    }

    /// Run proof generation over `units` on the prove pool.
    pub async fn prove<T, R, H>(&self, units: Vec<T>, handler: H) -> Result<Vec<R>, PoolError>
    where
        T: Send + 'static,
        R: Send + 'static,
        H: Fn(Vec<T>) -> anyhow::Result<Vec<R>> + Send + Sync + 'static,
    {
        self.pools.dispatch(&self.config.prove_pool, units, handler).await
    }

    pub fn pool_metrics(&self) -> Vec<PoolMetrics> {
        self.pools.metrics()
    }

    /// A page bridge in front of `dispatcher`.
    pub fn bridge<D: ActionDispatcher + 'static>(&self, dispatcher: D) -> MessageBridge<D> {
        MessageBridge::new(dispatcher, self.config.bridge.clone())
    }

    /// Register a newly opened surface and give it its own watchdog.
    pub async fn open_surface(&self, label: impl Into<String>) -> Result<Surface, StorageError> {
        let label = label.into();
        let connection = self.coordinator.connect().await?;
        let watchdog = Arc::new(AutolockWatchdog::new(
            format!("{}:{}", label, connection.id()),
            self.store.clone(),
            self.clock.clone(),
            self.locker.clone(),
            self.config.autolock.clone(),
        ));
        info!(surface = %label, id = %connection.id(), "surface opened");

        Ok(Surface { connection, watchdog })
    }
}

/// One open wallet surface: its coordinator connection and its watchdog.
#[derive(Debug)]
pub struct Surface {
    connection: SurfaceConnection,
    watchdog: Arc<AutolockWatchdog>,
}

impl Surface {
    pub fn watchdog(&self) -> &Arc<AutolockWatchdog> {
        &self.watchdog
    }

    /// Evaluate the watchdog once, as at surface startup.
    pub async fn check(&self) -> Result<WatchdogState, WatchdogError> {
        self.watchdog.evaluate().await
    }

    /// Run the watchdog until `shutdown` resolves.
    pub async fn watch<F: Future<Output = ()>>(&self, shutdown: F) {
        self.watchdog.run(shutdown).await
    }

    /// Close the surface, stamping the closure time.
    pub async fn close(self) -> Result<(), StorageError> {
        self.connection.disconnect().await
    }
}
