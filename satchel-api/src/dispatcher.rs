use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::SatchelResult;

/// The wallet's domain request handler.
///
/// The message bridge forwards every non-probe page request here together with
/// the origin of the page that sent it. Errors are caught by the bridge and
/// flattened into an error response.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Process one domain request from `origin`.
    ///
    /// `Ok(None)` is sent to the page as a `null` payload.
    async fn dispatch(&self, origin: &str, request: Value) -> SatchelResult<Option<Value>>;

    /// Whether pages may talk to the wallet at all.
    async fn is_dapp_enabled(&self) -> bool {
        true
    }
}

#[async_trait]
impl<D: ActionDispatcher + ?Sized> ActionDispatcher for Arc<D> {
    async fn dispatch(&self, origin: &str, request: Value) -> SatchelResult<Option<Value>> {
        (**self).dispatch(origin, request).await
    }

    async fn is_dapp_enabled(&self) -> bool {
        (**self).is_dapp_enabled().await
    }
}
