use std::time::Duration;

use crate::shard::ShardStrategy;

pub const DEFAULT_LOCK_THRESHOLD: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

// --- Pool Configuration ---

/// How many workers a pool gets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolSizing {
    /// `max(1, floor(available_parallelism / divisor))` workers.
    Divisor(usize),
    /// Exactly this many workers, for singleton resources such as an accelerator.
    Fixed(usize),
}

impl PoolSizing {
    /// Resolve the pool size against the given hardware parallelism. Never below 1.
    pub fn resolve(&self, available_parallelism: usize) -> usize {
        match *self {
            PoolSizing::Divisor(divisor) => (available_parallelism / divisor.max(1)).max(1),
            PoolSizing::Fixed(size) => size.max(1),
        }
    }
}

/// Configuration of one worker pool (one task kind).
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Task-kind name; pools are keyed by it.
    pub name: String,

    /// Worker count rule.
    pub sizing: PoolSizing,

    /// How inputs are partitioned across the pool.
    pub strategy: ShardStrategy,

    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, sizing: PoolSizing, strategy: ShardStrategy) -> Self {
        Self {
            name: name.into(),
            sizing,
            strategy,
            thread_name_prefix: "satchel-worker-".to_string(),
        }
    }

    /// Record scanning: full concurrency, small batches stay on one worker.
    pub fn scan() -> Self {
        Self::new("scan", PoolSizing::Divisor(1), ShardStrategy::Coalesce)
    }

    /// Proof generation: half the cores, every input may get its own worker.
    pub fn prove() -> Self {
        Self::new("prove", PoolSizing::Divisor(2), ShardStrategy::Spread)
    }

    /// Work bound to a singleton accelerator.
    pub fn accelerator() -> Self {
        Self::new("accelerator", PoolSizing::Fixed(1), ShardStrategy::Spread)
    }

    /// Resolved worker count on this machine.
    pub fn pool_size(&self) -> usize {
        self.sizing.resolve(num_cpus::get())
    }
}

// --- Autolock Configuration ---

/// Configuration for the autolock watchdog.
#[derive(Clone, Debug)]
pub struct AutolockConfig {
    /// Idle time after the last closure of all surfaces before the wallet locks.
    pub lock_threshold: Duration,

    /// Evaluation period while a surface is open.
    pub check_interval: Duration,

    /// Autolock setting used until the user stores one.
    pub enabled_by_default: bool,
}

impl Default for AutolockConfig {
    fn default() -> Self {
        Self {
            lock_threshold: DEFAULT_LOCK_THRESHOLD,
            check_interval: DEFAULT_CHECK_INTERVAL,
            enabled_by_default: true,
        }
    }
}

// --- Bridge Configuration ---

/// Configuration for both ends of the page bridge.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// How long the page side waits for a response. Long enough for proof generation.
    pub request_timeout: Duration,

    /// Drop page requests silently while dApp access is disabled.
    pub require_dapp_enabled: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            require_dapp_enabled: true,
        }
    }
}

// --- Substrate Configuration ---

/// Configuration for the whole background substrate.
#[derive(Clone, Debug)]
pub struct SatchelConfig {
    pub scan_pool: PoolConfig,
    pub prove_pool: PoolConfig,
    pub autolock: AutolockConfig,
    pub bridge: BridgeConfig,
}

impl Default for SatchelConfig {
    fn default() -> Self {
        Self {
            scan_pool: PoolConfig::scan(),
            prove_pool: PoolConfig::prove(),
            autolock: AutolockConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}
