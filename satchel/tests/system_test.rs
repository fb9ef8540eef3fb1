
use std::sync::Arc;
use std::time::Duration;

use satchel::config::{PoolConfig, PoolSizing, SatchelConfig};
use satchel::pool::WorkerPoolManager;
use satchel::shard::ShardStrategy;
use satchel::store::MemoryStore;
use satchel::system::SatchelSystem;
use satchel::watchdog::WatchdogState;
use satchel_api::session::{OPEN_SURFACE_COUNT_KEY, SessionStore};
use serde_json::json;
use test_helpers::{CountingLocker, ManualClock, RecordingDispatcher};

const START: u64 = 1_700_000_000_000;

async fn start(store: Arc<MemoryStore>, clock: Arc<ManualClock>, locker: Arc<CountingLocker>) -> SatchelSystem {
    let mut config = SatchelConfig::default();
    config.autolock.lock_threshold = Duration::from_millis(1000);
    SatchelSystem::start_with(
        config,
        store,
        clock,
        locker,
        Arc::new(WorkerPoolManager::with_parallelism(4)),
    )
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_system_routes_scan_and_prove_to_their_pools() {
    let system = start(
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::at(START)),
        Arc::new(CountingLocker::default()),
    )
    .await;

    let found = system
        .scan((0..100u32).collect(), |candidates: Vec<u32>| {
            Ok(candidates.into_iter().filter(|c| c % 7 == 0).collect())
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 15);

    let proofs = system
        .prove(vec!["tx-a", "tx-b"], |inputs: Vec<&'static str>| {
            Ok(inputs.into_iter().map(|i| format!("proof({})", i)).collect())
        })
        .await
        .unwrap();
    assert_eq!(proofs, vec!["proof(tx-a)", "proof(tx-b)"]);

    let metrics = system.pool_metrics();
    let names: Vec<&str> = metrics.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["prove", "scan"]);
    assert_eq!(metrics[0].size, 2);
    assert_eq!(metrics[1].size, 4);
}

#[tokio::test]
async fn test_surfaces_share_one_session_record() {
    let store = Arc::new(MemoryStore::new());
    store.set(OPEN_SURFACE_COUNT_KEY, json!(5)).await.unwrap();
    let clock = Arc::new(ManualClock::at(START));
    let locker = Arc::new(CountingLocker::default());
    let system = start(store.clone(), clock.clone(), locker.clone()).await;

    // Startup discards the stale count.
    assert_eq!(system.coordinator().open_surfaces().await.unwrap(), 0);

    let popup = system.open_surface("popup").await.unwrap();
    popup.close().await.unwrap();
    clock.advance(Duration::from_millis(1500));

    let first = system.open_surface("popup").await.unwrap();
    let second = system.open_surface("tab").await.unwrap();
    assert_eq!(first.check().await.unwrap(), WatchdogState::Unlocked);

    second.close().await.unwrap();
    // Closing the tab restarted the idle timer.
    assert_eq!(first.check().await.unwrap(), WatchdogState::Unlocked);

    clock.advance(Duration::from_millis(1001));
    assert_eq!(first.check().await.unwrap(), WatchdogState::Locked);
    assert_eq!(locker.count(), 1);
}

#[tokio::test]
async fn test_system_bridge_uses_config() {
    let system = start(
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::at(START)),
        Arc::new(CountingLocker::default()),
    )
    .await;

    let bridge = system.bridge(RecordingDispatcher::disabled());
    let raw = bridge
        .handle_raw("https://dapp.example", r#"{"type":"X","payload":"PING","reqId":"1"}"#)
        .await
        .unwrap();
    assert!(raw.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_system_single_shot_invoker() {
    let system = start(
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::at(START)),
        Arc::new(CountingLocker::default()),
    )
    .await;

    let receipt = system
        .invoker()
        .invoke("submit", vec![1u8, 2, 3], |bytes: Vec<u8>| async move {
            Ok::<_, anyhow::Error>(bytes.iter().map(|b| *b as u32).sum::<u32>())
        })
        .await
        .unwrap();
    assert_eq!(receipt, 6);
    assert_eq!(system.invoker().running(), 0);
}

#[test]
fn test_pool_presets() {
    assert_eq!(PoolConfig::scan().sizing.resolve(8), 8);
    assert_eq!(PoolConfig::scan().strategy, ShardStrategy::Coalesce);
    assert_eq!(PoolConfig::prove().sizing.resolve(8), 4);
    assert_eq!(PoolConfig::prove().sizing.resolve(1), 1);
    assert_eq!(PoolConfig::prove().strategy, ShardStrategy::Spread);
    assert_eq!(PoolConfig::accelerator().sizing.resolve(64), 1);
    assert_eq!(PoolSizing::Divisor(0).resolve(3), 3);
    assert_eq!(PoolSizing::Fixed(0).resolve(3), 1);
}

#[test]
fn test_default_config() {
    let config = SatchelConfig::default();
    assert_eq!(config.autolock.lock_threshold, Duration::from_secs(300));
    assert_eq!(config.autolock.check_interval, Duration::from_secs(5));
    assert!(config.autolock.enabled_by_default);
    assert_eq!(config.bridge.request_timeout, Duration::from_secs(300));
    assert!(config.bridge.require_dapp_enabled);
    assert_eq!(config.scan_pool.name, "scan");
    assert_eq!(config.prove_pool.name, "prove");
}
