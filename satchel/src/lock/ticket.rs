use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use satchel_api::types::BoxedFuture;
use tokio::sync::oneshot;
use tracing::warn;

/// Observable state of the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Free,
    Held,
}

type IdleTask = Box<dyn FnOnce() -> BoxedFuture<'static, anyhow::Result<()>> + Send>;

struct Waiter {
    ticket: u64,
    grant: oneshot::Sender<u64>,
}

#[derive(Default)]
struct LockQueue {
    holder: Option<u64>,
    waiters: VecDeque<Waiter>,
    idle: VecDeque<IdleTask>,
}

impl LockQueue {
    /// Hand the lock to the oldest waiter still listening.
    fn grant_next_waiter(&mut self) -> bool {
        while let Some(waiter) = self.waiters.pop_front() {
            self.holder = Some(waiter.ticket);
            if waiter.grant.send(waiter.ticket).is_ok() {
                crate::log_lock!("handoff", ticket = waiter.ticket, queued = self.waiters.len());
                return true;
            }
        }
        self.holder = None;
        false
    }
}

struct LockInner {
    queue: Mutex<LockQueue>,
    next_ticket: AtomicU64,
}

impl LockInner {
    fn queue(&self) -> MutexGuard<'_, LockQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }
}

/// FIFO mutual exclusion for the shared wallet-client handle.
///
/// `Free -> Held` on acquire; `Held -> Free` on release, unless a queued caller
/// takes over directly. Callers are served strictly in arrival order. There is no
/// read-only mode, no priority and no timeout: a caller waits until its turn.
///
/// Low-priority idle tasks queued with [`ClientLock::run_when_idle`] only take the
/// lock when no regular caller is waiting for it.
#[derive(Clone)]
pub struct ClientLock {
    inner: Arc<LockInner>,
}

impl Default for ClientLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientLock")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .field("idle_queued", &self.idle_queued())
            .finish()
    }
}

impl ClientLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockInner {
                queue: Mutex::new(LockQueue::default()),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    pub fn state(&self) -> LockState {
        if self.inner.queue().holder.is_some() {
            LockState::Held
        } else {
            LockState::Free
        }
    }

    /// Callers waiting for the lock.
    pub fn queued(&self) -> usize {
        self.inner.queue().waiters.len()
    }

    /// Idle tasks waiting for the lock to go quiet.
    pub fn idle_queued(&self) -> usize {
        self.inner.queue().idle.len()
    }

    /// Wait for the lock. The returned ticket releases it when dropped.
    pub async fn acquire(&self) -> LockTicket {
        loop {
            let pending = {
                let mut queue = self.inner.queue();
                if queue.holder.is_none() {
                    let ticket = self.inner.issue();
                    queue.holder = Some(ticket);
                    crate::log_lock!("acquired", ticket = ticket);
                    return LockTicket::new(self.inner.clone(), ticket);
                }

                let ticket = self.inner.issue();
                let (grant, granted) = oneshot::channel();
                queue.waiters.push_back(Waiter { ticket, grant });
                crate::log_lock!("queued", ticket = ticket, position = queue.waiters.len());
                PendingAcquire {
                    inner: self.inner.clone(),
                    ticket,
                    granted: Some(granted),
                }
            };

            let ticket = pending.ticket;
            if let Some(granted) = pending.wait().await {
                return granted;
            }
            warn!(ticket, "lost queue entry without a grant; acquiring again");
        }
    }

    /// Run `operation` while holding the lock.
    ///
    /// The lock is released on every exit path: success, error, panic, or the
    /// returned future being dropped.
    pub async fn run<T, Fut>(&self, operation: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let ticket = self.acquire().await;
        let output = operation.await;
        ticket.release();
        output
    }

    /// Queue a low-priority task to run once the lock is idle.
    ///
    /// Fire-and-forget: a failing task is logged and never reported to anyone.
    pub fn run_when_idle<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task: IdleTask = Box::new(move || Box::pin(task()));
        let start = {
            let mut queue = self.inner.queue();
            if queue.holder.is_none() {
                let ticket = self.inner.issue();
                queue.holder = Some(ticket);
                Some((task, ticket))
            } else {
                queue.idle.push_back(task);
                None
            }
        };

        if let Some((task, ticket)) = start {
            spawn_idle(&self.inner, task, ticket);
        }
    }
}

fn release(inner: &Arc<LockInner>, ticket: u64) {
    let idle = {
        let mut queue = inner.queue();
        if queue.holder != Some(ticket) {
            warn!(ticket, holder = ?queue.holder, "release of a ticket that does not hold the lock");
            return;
        }
        if queue.grant_next_waiter() {
            return;
        }
        match queue.idle.pop_front() {
            Some(task) => {
                let idle_ticket = inner.issue();
                queue.holder = Some(idle_ticket);
                (task, idle_ticket)
            }
            None => {
                crate::log_lock!("released", ticket = ticket);
                return;
            }
        }
    };

    spawn_idle(inner, idle.0, idle.1);
}

fn spawn_idle(inner: &Arc<LockInner>, task: IdleTask, ticket: u64) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let ticket = LockTicket::new(inner.clone(), ticket);
            crate::log_lock!("idle task started", ticket = ticket.id());
            handle.spawn(async move {
                if let Err(error) = task().await {
                    warn!("Idle task failed: {:#}", error);
                }
                ticket.release();
            });
        }
        Err(_) => {
            warn!("No Tokio runtime available to run idle task; keeping it queued");
            let mut queue = inner.queue();
            queue.idle.push_front(task);
            if queue.holder == Some(ticket) {
                queue.grant_next_waiter();
            }
        }
    }
}

/// A caller waiting in the lock queue.
///
/// Dropping it before the grant arrives leaves the queue; dropping it after the
/// grant arrived passes the lock straight on.
struct PendingAcquire {
    inner: Arc<LockInner>,
    ticket: u64,
    granted: Option<oneshot::Receiver<u64>>,
}

impl PendingAcquire {
    async fn wait(mut self) -> Option<LockTicket> {
        let granted = match self.granted.as_mut() {
            Some(granted) => granted.await.ok(),
            None => None,
        };
        self.granted = None;
        granted.map(|ticket| LockTicket::new(self.inner.clone(), ticket))
    }
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        let Some(mut granted) = self.granted.take() else {
            return;
        };

        {
            let mut queue = self.inner.queue();
            if let Some(position) = queue.waiters.iter().position(|w| w.ticket == self.ticket) {
                queue.waiters.remove(position);
                crate::log_lock!("abandoned", ticket = self.ticket);
                return;
            }
        }

        // Granted while nobody was listening: pass the lock on.
        granted.close();
        if let Ok(ticket) = granted.try_recv() {
            release(&self.inner, ticket);
        }
    }
}

/// The right to operate the shared client. At most one is outstanding per lock.
///
/// Released explicitly with [`LockTicket::release`] or implicitly on drop, which
/// also covers unwinding.
pub struct LockTicket {
    inner: Arc<LockInner>,
    id: u64,
}

impl fmt::Debug for LockTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTicket").field("id", &self.id).finish()
    }
}

impl LockTicket {
    fn new(inner: Arc<LockInner>, id: u64) -> Self {
        Self { inner, id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockTicket {
    fn drop(&mut self) {
        release(&self.inner, self.id);
    }
}
