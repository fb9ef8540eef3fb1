
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use satchel::config::AutolockConfig;
use satchel::store::{FileStore, MemoryStore};
use satchel::watchdog::{AutolockWatchdog, SurfaceCoordinator, WatchdogState};
use satchel::error::WatchdogError;
use satchel_api::session::{
    AUTOLOCK_ENABLED_KEY, Clock, LAST_ALL_SURFACES_CLOSED_AT_KEY, LOCK_THRESHOLD_KEY, OPEN_SURFACE_COUNT_KEY,
    SessionState, SessionStore,
};
use serde_json::json;
use test_helpers::{CountingLocker, FlakyStore, ManualClock, eventually};

const START: u64 = 1_700_000_000_000;

fn config(threshold_ms: u64) -> AutolockConfig {
    AutolockConfig {
        lock_threshold: Duration::from_millis(threshold_ms),
        check_interval: Duration::from_millis(10),
        enabled_by_default: true,
    }
}

async fn seeded_store(open: u32, closed_at: u64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set(OPEN_SURFACE_COUNT_KEY, json!(open)).await.unwrap();
    store.set(LAST_ALL_SURFACES_CLOSED_AT_KEY, json!(closed_at)).await.unwrap();
    store
}

fn watchdog(
    store: Arc<dyn SessionStore>,
    clock: Arc<ManualClock>,
    locker: Arc<CountingLocker>,
    threshold_ms: u64,
) -> AutolockWatchdog {
    AutolockWatchdog::new("popup", store, clock, locker, config(threshold_ms))
}

#[tokio::test]
async fn test_single_surface_past_threshold_locks() {
    let store = seeded_store(1, START - 1500).await;
    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store, Arc::new(ManualClock::at(START)), locker.clone(), 1000);

    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Locked);
    assert_eq!(dog.state(), WatchdogState::Locked);
    assert_eq!(locker.count(), 1);

    // Locked is terminal until re-armed.
    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Locked);
    assert_eq!(locker.count(), 1);
}

#[tokio::test]
async fn test_two_surfaces_stay_unlocked() {
    let store = seeded_store(2, START - 1500).await;
    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store, Arc::new(ManualClock::at(START)), locker.clone(), 1000);

    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Unlocked);
    assert_eq!(locker.count(), 0);
}

#[tokio::test]
async fn test_within_threshold_stays_unlocked() {
    let store = seeded_store(1, START - 500).await;
    let clock = Arc::new(ManualClock::at(START));
    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store, clock.clone(), locker.clone(), 1000);

    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Unlocked);

    // Exactly at the threshold is not past it.
    clock.advance(Duration::from_millis(500));
    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Unlocked);

    clock.advance(Duration::from_millis(1));
    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Locked);
}

#[tokio::test]
async fn test_disabled_autolock_never_locks() {
    let store = seeded_store(1, START - 10_000).await;
    store.set(AUTOLOCK_ENABLED_KEY, json!(false)).await.unwrap();
    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store, Arc::new(ManualClock::at(START)), locker.clone(), 1000);

    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Unlocked);
    assert_eq!(locker.count(), 0);
}

#[tokio::test]
async fn test_stored_threshold_overrides_config() {
    let store = seeded_store(1, START - 1500).await;
    store.set(LOCK_THRESHOLD_KEY, json!(60_000)).await.unwrap();
    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store, Arc::new(ManualClock::at(START)), locker.clone(), 1000);

    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Unlocked);
}

#[tokio::test]
async fn test_never_closed_does_not_lock() {
    let store = Arc::new(MemoryStore::new());
    store.set(OPEN_SURFACE_COUNT_KEY, json!(1)).await.unwrap();
    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store, Arc::new(ManualClock::at(START)), locker.clone(), 1000);

    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Unlocked);
}

#[tokio::test]
async fn test_storage_failure_is_deferred() {
    let store = Arc::new(FlakyStore::default());
    store.inner.set(OPEN_SURFACE_COUNT_KEY, json!(1)).await.unwrap();
    store.inner.set(LAST_ALL_SURFACES_CLOSED_AT_KEY, json!(START - 1500)).await.unwrap();
    store.set_failing(true);

    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store.clone(), Arc::new(ManualClock::at(START)), locker.clone(), 1000);

    assert!(matches!(dog.evaluate().await, Err(WatchdogError::Storage(_))));
    assert_eq!(dog.state(), WatchdogState::Unlocked);

    store.set_failing(false);
    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Locked);
}

#[tokio::test]
async fn test_locker_failure_keeps_unlocked() {
    let store = seeded_store(1, START - 1500).await;
    let locker = Arc::new(CountingLocker::default());
    locker.fail.store(true, Ordering::SeqCst);
    let dog = watchdog(store, Arc::new(ManualClock::at(START)), locker.clone(), 1000);

    assert!(matches!(dog.evaluate().await, Err(WatchdogError::Lock(_))));
    assert_eq!(dog.state(), WatchdogState::Unlocked);
}

#[tokio::test]
async fn test_rearm_restarts_idle_timer() {
    let store = seeded_store(1, START - 1500).await;
    let clock = Arc::new(ManualClock::at(START));
    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store.clone(), clock.clone(), locker.clone(), 1000);

    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Locked);
    dog.rearm().await.unwrap();
    assert_eq!(dog.state(), WatchdogState::Unlocked);
    assert_eq!(store.get(LAST_ALL_SURFACES_CLOSED_AT_KEY).await.unwrap(), Some(json!(START)));

    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Unlocked);
    clock.advance(Duration::from_millis(1001));
    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Locked);
    assert_eq!(locker.count(), 2);
}

#[tokio::test]
async fn test_run_evaluates_on_startup_and_each_tick() {
    let store = Arc::new(FlakyStore::default());
    store.inner.set(OPEN_SURFACE_COUNT_KEY, json!(1)).await.unwrap();
    store.inner.set(LAST_ALL_SURFACES_CLOSED_AT_KEY, json!(START - 1500)).await.unwrap();
    store.set_failing(true);

    let locker = Arc::new(CountingLocker::default());
    let dog = Arc::new(watchdog(store.clone(), Arc::new(ManualClock::at(START)), locker.clone(), 1000));
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

    let running = {
        let dog = dog.clone();
        tokio::spawn(async move {
            dog.run(async {
                let _ = stopped.await;
            })
            .await
        })
    };

    // Failing ticks are survived; the first healthy tick locks.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dog.state(), WatchdogState::Unlocked);
    store.set_failing(false);
    assert!(eventually(|| dog.state() == WatchdogState::Locked).await);

    stop.send(()).unwrap();
    running.await.unwrap();
    assert_eq!(locker.count(), 1);
}

#[tokio::test]
async fn test_coordinator_tracks_surfaces_and_stamps_closure() {
    let store = Arc::new(MemoryStore::new());
    store.set(OPEN_SURFACE_COUNT_KEY, json!(3)).await.unwrap();
    let clock = Arc::new(ManualClock::at(START));
    let coordinator = SurfaceCoordinator::new(store.clone(), clock.clone());

    // Stale counts from a previous run are discarded.
    coordinator.init().await.unwrap();
    assert_eq!(coordinator.open_surfaces().await.unwrap(), 0);

    let popup = coordinator.connect().await.unwrap();
    let tab = coordinator.connect().await.unwrap();
    assert_ne!(popup.id(), tab.id());
    assert_eq!(coordinator.open_surfaces().await.unwrap(), 2);

    clock.advance(Duration::from_millis(250));
    tab.disconnect().await.unwrap();
    let state = SessionState::load(store.as_ref(), Duration::from_secs(300)).await.unwrap();
    assert_eq!(state.open_surface_count, 1);
    assert_eq!(state.last_all_surfaces_closed_at, Some(START + 250));

    clock.advance(Duration::from_millis(250));
    drop(popup);

    // A dropped connection records its disconnect in the background.
    let expected = Some(json!(clock.now_millis()));
    for _ in 0..100 {
        if store.get(LAST_ALL_SURFACES_CLOSED_AT_KEY).await.unwrap() == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.get(LAST_ALL_SURFACES_CLOSED_AT_KEY).await.unwrap(), expected);
    assert_eq!(coordinator.open_surfaces().await.unwrap(), 0);
}

#[tokio::test]
async fn test_idle_timer_survives_restart() {
    let path = std::env::temp_dir().join(format!("satchel-watchdog-{}.json", uuid::Uuid::new_v4()));
    let clock = Arc::new(ManualClock::at(START));

    // First background process: a surface opens and closes.
    {
        let store: Arc<dyn SessionStore> = Arc::new(FileStore::open(&path).await.unwrap());
        let coordinator = SurfaceCoordinator::new(store, clock.clone());
        coordinator.init().await.unwrap();
        coordinator.connect().await.unwrap().disconnect().await.unwrap();
    }

    clock.advance(Duration::from_millis(1500));

    // Restarted process: a new surface opens and evaluates at startup.
    let store: Arc<dyn SessionStore> = Arc::new(FileStore::open(&path).await.unwrap());
    let coordinator = SurfaceCoordinator::new(store.clone(), clock.clone());
    coordinator.init().await.unwrap();
    let _surface = coordinator.connect().await.unwrap();

    let locker = Arc::new(CountingLocker::default());
    let dog = watchdog(store, clock, locker.clone(), 1000);
    assert_eq!(dog.evaluate().await.unwrap(), WatchdogState::Locked);
    assert_eq!(locker.count(), 1);

    let _ = std::fs::remove_file(&path);
}
