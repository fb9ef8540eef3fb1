use std::fmt;
use std::sync::Arc;

use satchel_api::errors::StorageError;
use satchel_api::session::{Clock, LAST_ALL_SURFACES_CLOSED_AT_KEY, OPEN_SURFACE_COUNT_KEY, SessionStore};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

struct CoordinatorInner {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    // Serializes this process's read-modify-write of the surface count.
    writes: Mutex<()>,
}

impl CoordinatorInner {
    async fn open_count(&self) -> Result<u32, StorageError> {
        match self.store.get(OPEN_SURFACE_COUNT_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(0),
        }
    }

    async fn surface_opened(&self, surface: Uuid) -> Result<u32, StorageError> {
        let _writes = self.writes.lock().await;
        let count = self.open_count().await?.saturating_add(1);
        self.store.set(OPEN_SURFACE_COUNT_KEY, Value::from(count)).await?;
        debug!(%surface, open = count, "surface connected");
        Ok(count)
    }

    async fn surface_closed(&self, surface: Uuid) -> Result<u32, StorageError> {
        let _writes = self.writes.lock().await;
        let count = self.open_count().await?.saturating_sub(1);
        self.store.set(OPEN_SURFACE_COUNT_KEY, Value::from(count)).await?;
        let now = self.clock.now_millis();
        self.store.set(LAST_ALL_SURFACES_CLOSED_AT_KEY, Value::from(now)).await?;
        debug!(%surface, open = count, closed_at = now, "surface disconnected");
        Ok(count)
    }
}

/// The background side of the surface lifecycle channel.
///
/// Tracks how many wallet surfaces are connected and stamps the closure time on
/// every disconnect, all through the shared session store.
#[derive(Clone)]
pub struct SurfaceCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl fmt::Debug for SurfaceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceCoordinator").finish_non_exhaustive()
    }
}

impl SurfaceCoordinator {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                clock,
                writes: Mutex::new(()),
            }),
        }
    }

    /// Reset the surface count at background-process startup.
    ///
    /// Connections do not survive a restart, so any stored count is stale. The
    /// closure timestamp is kept: the idle timer must survive the restart.
    pub async fn init(&self) -> Result<(), StorageError> {
        let _writes = self.inner.writes.lock().await;
        self.inner.store.set(OPEN_SURFACE_COUNT_KEY, Value::from(0u32)).await
    }

    pub async fn open_surfaces(&self) -> Result<u32, StorageError> {
        self.inner.open_count().await
    }

    /// Register a newly opened surface.
    pub async fn connect(&self) -> Result<SurfaceConnection, StorageError> {
        let id = Uuid::new_v4();
        self.inner.surface_opened(id).await?;
        Ok(SurfaceConnection {
            id,
            inner: Some(self.inner.clone()),
        })
    }
}

/// One open surface's connection to the coordinator.
///
/// Dropping it counts as a disconnect; the bookkeeping then runs on the current
/// Tokio runtime in the background.
pub struct SurfaceConnection {
    id: Uuid,
    inner: Option<Arc<CoordinatorInner>>,
}

impl fmt::Debug for SurfaceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceConnection").field("id", &self.id).finish()
    }
}

impl SurfaceConnection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Disconnect and wait for the store to record it.
    pub async fn disconnect(mut self) -> Result<(), StorageError> {
        match self.inner.take() {
            Some(inner) => inner.surface_closed(self.id).await.map(|_| ()),
            None => Ok(()),
        }
    }
}

impl Drop for SurfaceConnection {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = inner.surface_closed(id).await {
                        warn!(surface = %id, "failed to record disconnect: {}", error);
                    }
                });
            }
            Err(_) => warn!(surface = %id, "surface dropped outside a runtime; disconnect not recorded"),
        }
    }
}
