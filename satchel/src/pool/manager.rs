use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use lazy_static::lazy_static;

use crate::config::PoolConfig;
use crate::error::PoolError;

use super::worker_pool::{PoolMetrics, WorkerPool};

lazy_static! {
    static ref GLOBAL_POOLS: Arc<WorkerPoolManager> = Arc::new(WorkerPoolManager::new());
}

/// Process-wide pool manager. Its pools live until the process exits.
pub fn global() -> Arc<WorkerPoolManager> {
    GLOBAL_POOLS.clone()
}

/// Owns exactly one pool per task kind, created on first use.
#[derive(Debug)]
pub struct WorkerPoolManager {
    pools: Mutex<HashMap<String, Arc<WorkerPool>>>,
    available_parallelism: usize,
}

impl Default for WorkerPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPoolManager {
    /// Size pools against the machine's hardware parallelism.
    pub fn new() -> Self {
        Self::with_parallelism(num_cpus::get())
    }

    /// Size pools against an explicit parallelism instead of the hardware's.
    pub fn with_parallelism(available_parallelism: usize) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            available_parallelism: available_parallelism.max(1),
        }
    }

    pub fn available_parallelism(&self) -> usize {
        self.available_parallelism
    }

    /// The pool for `config.name`, spawning it on first request.
    ///
    /// Later requests get the existing pool even if their config differs.
    pub fn pool(&self, config: &PoolConfig) -> Result<Arc<WorkerPool>, PoolError> {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = pools.get(&config.name) {
            return Ok(pool.clone());
        }

        let size = config.sizing.resolve(self.available_parallelism);
        let pool = Arc::new(WorkerPool::new(config.clone(), size)?);
        pools.insert(config.name.clone(), pool.clone());
        Ok(pool)
    }

    /// Dispatch `units` on the pool for `config`'s task kind.
    pub async fn dispatch<T, R, H>(&self, config: &PoolConfig, units: Vec<T>, handler: H) -> Result<Vec<R>, PoolError>
    where
        T: Send + 'static,
        R: Send + 'static,
        H: Fn(Vec<T>) -> anyhow::Result<Vec<R>> + Send + Sync + 'static,
    {
        let pool = self.pool(config)?;
        pool.dispatch(units, handler).await
    }

    pub fn is_created(&self, name: &str) -> bool {
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn metrics(&self) -> Vec<PoolMetrics> {
        let pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        let mut metrics: Vec<PoolMetrics> = pools.values().map(|pool| pool.metrics()).collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        metrics
    }
}
