use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use satchel_api::errors::BridgeError;
use satchel_api::message::{PING, PONG, PageMessageType, PageRequest, PageResponse};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::config::BridgeConfig;

type Reply = oneshot::Sender<Result<Value, BridgeError>>;

/// Requests sent by the page and not yet answered, keyed by `reqId`.
#[derive(Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    entries: Mutex<HashMap<String, Reply>>,
}

impl PendingRequests {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Reply>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self) -> (String, oneshot::Receiver<Result<Value, BridgeError>>) {
        let req_id = format!("req_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (reply, outcome) = oneshot::channel();
        self.entries().insert(req_id.clone(), reply);
        (req_id, outcome)
    }

    fn take(&self, req_id: &str) -> Option<Reply> {
        self.entries().remove(req_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its entry from the registry however the request ends.
struct PendingEntry<'a> {
    registry: &'a PendingRequests,
    req_id: String,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.registry.take(&self.req_id);
    }
}

/// Page side of the bridge.
///
/// Sends request frames over `outbound` and matches response frames fed back
/// through [`handle_response`](Self::handle_response) or [`listen`](Self::listen).
#[derive(Clone)]
pub struct PageClient {
    outbound: flume::Sender<String>,
    pending: Arc<PendingRequests>,
    timeout: Duration,
}

impl std::fmt::Debug for PageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageClient")
            .field("pending", &self.pending.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PageClient {
    pub fn new(outbound: flume::Sender<String>, config: &BridgeConfig) -> Self {
        Self {
            outbound,
            pending: Arc::new(PendingRequests::default()),
            timeout: config.request_timeout,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Send `payload` and wait for the matching response.
    pub async fn request(&self, payload: Value) -> Result<Value, BridgeError> {
        self.request_within(payload, self.timeout).await
    }

    async fn request_within(&self, payload: Value, timeout: Duration) -> Result<Value, BridgeError> {
        let (req_id, outcome) = self.pending.register();
        let entry = PendingEntry {
            registry: &self.pending,
            req_id,
        };

        let frame = serde_json::to_string(&PageRequest::new(payload, entry.req_id.as_str()))
            .map_err(|e| BridgeError::Malformed(e.to_string()))?;
        self.outbound
            .send_async(frame)
            .await
            .map_err(|_| BridgeError::Disconnected)?;
        trace!(req_id = %entry.req_id, "page request sent");

        match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::Disconnected),
            Err(_) => {
                debug!(req_id = %entry.req_id, "page request timed out");
                Err(BridgeError::Timeout(entry.req_id.clone()))
            }
        }
    }

    /// Whether the wallet answers a liveness probe within `probe_timeout`.
    pub async fn is_available(&self, probe_timeout: Duration) -> bool {
        matches!(
            self.request_within(Value::String(PING.to_string()), probe_timeout).await,
            Ok(Value::String(answer)) if answer == PONG
        )
    }

    /// Resolve the pending request a response frame belongs to.
    ///
    /// Returns `false` for frames that are not responses or match no pending request.
    pub fn handle_response(&self, raw: &str) -> bool {
        let response: PageResponse = match serde_json::from_str(raw) {
            Ok(response) => response,
            Err(error) => {
                trace!("ignoring non-response frame: {}", error);
                return false;
            }
        };
        if response.kind == PageMessageType::Request {
            return false;
        }

        match self.pending.take(&response.req_id) {
            Some(reply) => {
                let _ = reply.send(response.into_result());
                true
            }
            None => {
                trace!(req_id = %response.req_id, "response for unknown request ignored");
                false
            }
        }
    }

    /// Reject every pending request with [`BridgeError::Disconnected`].
    pub fn disconnect(&self) {
        let drained: Vec<Reply> = self.pending.entries().drain().map(|(_, reply)| reply).collect();
        if !drained.is_empty() {
            debug!(rejected = drained.len(), "page bridge disconnected");
        }
        for reply in drained {
            let _ = reply.send(Err(BridgeError::Disconnected));
        }
    }

    /// Feed response frames from `inbound` until it closes, then disconnect.
    pub async fn listen(&self, inbound: flume::Receiver<String>) {
        while let Ok(frame) = inbound.recv_async().await {
            self.handle_response(&frame);
        }
        self.disconnect();
    }
}
