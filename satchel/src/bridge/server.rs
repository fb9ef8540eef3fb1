use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use satchel_api::dispatcher::ActionDispatcher;
use satchel_api::errors::BridgeError;
use satchel_api::message::{PageRequest, PageResponse};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, warn};

use crate::config::BridgeConfig;

/// One raw frame received from a page, tagged with the page's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub origin: String,
    pub body: String,
}

impl InboundFrame {
    pub fn new(origin: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            body: body.into(),
        }
    }
}

/// Wallet side of the page bridge.
///
/// Answers liveness probes itself and forwards every other request to the
/// action dispatcher. Dispatcher failures, panics included, come back to the
/// page as error responses carrying only a message.
pub struct MessageBridge<D> {
    dispatcher: Arc<D>,
    config: BridgeConfig,
}

impl<D> std::fmt::Debug for MessageBridge<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBridge").field("config", &self.config).finish()
    }
}

impl<D: ActionDispatcher + 'static> MessageBridge<D> {
    pub fn new(dispatcher: D, config: BridgeConfig) -> Self {
        Self::with_shared(Arc::new(dispatcher), config)
    }

    pub fn with_shared(dispatcher: Arc<D>, config: BridgeConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    /// Answer one request. `None` means the request is dropped without a reply.
    pub async fn handle(&self, origin: &str, request: PageRequest) -> Option<PageResponse> {
        let span = crate::bridge_span!(request.req_id.as_str(), origin);
        async move {
            if self.config.require_dapp_enabled && !self.dispatcher.is_dapp_enabled().await {
                debug!("dApp access disabled, request dropped");
                return None;
            }

            if request.is_ping() {
                return Some(PageResponse::pong(request.req_id));
            }

            let PageRequest { payload, req_id, .. } = request;
            let outcome = AssertUnwindSafe(self.dispatcher.dispatch(origin, payload))
                .catch_unwind()
                .await;

            let response = match outcome {
                Ok(Ok(result)) => PageResponse::success(req_id, result),
                Ok(Err(error)) => {
                    warn!("dispatcher failed: {:#}", error);
                    PageResponse::failure(req_id, error.to_string())
                }
                Err(_) => {
                    warn!("dispatcher panicked");
                    PageResponse::failure(req_id, "Unknown error")
                }
            };
            debug!(error = response.is_error(), "request answered");
            Some(response)
        }
        .instrument(span)
        .await
    }

    /// Answer one raw JSON frame with a raw JSON frame.
    pub async fn handle_raw(&self, origin: &str, raw: &str) -> Result<Option<String>, BridgeError> {
        let request = PageRequest::from_json(raw)?;
        match self.handle(origin, request).await {
            Some(response) => response
                .to_json()
                .map(Some)
                .map_err(|e| BridgeError::Malformed(e.to_string())),
            None => Ok(None),
        }
    }

    /// Listen for frames until `inbound` closes, answering each on its own task.
    ///
    /// A slow dispatch never holds up other requests. Malformed frames are logged
    /// and dropped. Returns once every in-flight request has been answered.
    pub async fn serve(self: Arc<Self>, inbound: flume::Receiver<InboundFrame>, outbound: flume::Sender<String>) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                frame = inbound.recv_async() => {
                    let Ok(frame) = frame else { break };
                    let bridge = self.clone();
                    let outbound = outbound.clone();
                    in_flight.spawn(async move {
                        match bridge.handle_raw(&frame.origin, &frame.body).await {
                            Ok(Some(response)) => {
                                if outbound.send_async(response).await.is_err() {
                                    debug!("page channel closed before response was sent");
                                }
                            }
                            Ok(None) => {}
                            Err(error) => warn!(origin = %frame.origin, "dropping page frame: {}", error),
                        }
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(error) = joined {
                        warn!("bridge request task failed: {}", error);
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(error) = joined {
                warn!("bridge request task failed: {}", error);
            }
        }
        debug!("bridge listener stopped");
    }
}
