use std::fmt;
use std::sync::Arc;

use satchel_api::types::BoxedFuture;
use tokio::sync::Mutex;

use super::ticket::ClientLock;

/// A client handle that can only be reached through its [`ClientLock`].
///
/// The wallet client keeps internal state that corrupts under interleaved use,
/// so every operation borrows it mutably while holding the lock.
pub struct SharedClient<C> {
    lock: ClientLock,
    client: Arc<Mutex<C>>,
}

impl<C> Clone for SharedClient<C> {
    fn clone(&self) -> Self {
        Self {
            lock: self.lock.clone(),
            client: self.client.clone(),
        }
    }
}

impl<C> fmt::Debug for SharedClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedClient").field("lock", &self.lock).finish()
    }
}

impl<C: Send + 'static> SharedClient<C> {
    pub fn new(client: C) -> Self {
        Self {
            lock: ClientLock::new(),
            client: Arc::new(Mutex::new(client)),
        }
    }

    pub fn lock(&self) -> &ClientLock {
        &self.lock
    }

    /// Run `operation` against the client once every earlier caller is done.
    ///
    /// Whatever `operation` returns, errors included, goes back to this caller only.
    pub async fn with_client<T, F>(&self, operation: F) -> T
    where
        F: for<'a> FnOnce(&'a mut C) -> BoxedFuture<'a, T>,
    {
        let ticket = self.lock.acquire().await;
        let mut client = self.client.lock().await;
        let output = operation(&mut *client).await;
        drop(client);
        ticket.release();
        output
    }

    /// Queue background client work (e.g. a sync) behind all regular callers.
    pub fn when_idle<F>(&self, task: F)
    where
        F: for<'a> FnOnce(&'a mut C) -> BoxedFuture<'a, anyhow::Result<()>> + Send + 'static,
    {
        let client = self.client.clone();
        self.lock.run_when_idle(move || async move {
            let mut client = client.lock().await;
            task(&mut *client).await
        });
    }
}
