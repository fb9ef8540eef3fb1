//! # Page Wire Protocol
//!
//! Frames exchanged between an embedded page and the wallet's message bridge.
//!
//! ```text
//! request:        { "type": string, "payload": "PING" | DomainRequest, "reqId": string }
//! response:       { "type": "MIDEN_PAGE_RESPONSE", "payload": DomainResponse | null, "reqId": string }
//! error response: { "type": "MIDEN_PAGE_ERROR_RESPONSE", "payload": null, "reqId": string, "error": string }
//! ```
//!
//! Domain requests and responses are opaque JSON to the substrate. The `reqId`
//! is chosen by the page and echoed verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BridgeError;

/// Liveness probe payload.
pub const PING: &str = "PING";

/// Liveness probe answer.
pub const PONG: &str = "PONG";

/// Message kinds of the page protocol.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageMessageType {
    #[serde(rename = "MIDEN_PAGE_REQUEST")]
    Request,
    #[serde(rename = "MIDEN_PAGE_RESPONSE")]
    Response,
    #[serde(rename = "MIDEN_PAGE_ERROR_RESPONSE")]
    ErrorResponse,
}

impl PageMessageType {
    /// Wire name of the message kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            PageMessageType::Request => "MIDEN_PAGE_REQUEST",
            PageMessageType::Response => "MIDEN_PAGE_RESPONSE",
            PageMessageType::ErrorResponse => "MIDEN_PAGE_ERROR_RESPONSE",
        }
    }
}

/// A request frame sent by a page.
///
/// `kind` is kept as a free string: pages are untrusted and the bridge answers
/// every well-formed frame regardless of the type they claim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PageRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "reqId")]
    pub req_id: String,
}

impl PageRequest {
    /// Build a request frame with the standard request type.
    pub fn new(payload: Value, req_id: impl Into<String>) -> Self {
        Self {
            kind: PageMessageType::Request.as_str().to_string(),
            payload,
            req_id: req_id.into(),
        }
    }

    /// Whether this request is the liveness probe.
    pub fn is_ping(&self) -> bool {
        self.payload.as_str() == Some(PING)
    }

    /// Parse a raw JSON frame.
    pub fn from_json(raw: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(raw).map_err(|e| BridgeError::Malformed(e.to_string()))
    }
}

/// A response frame sent back to a page.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PageResponse {
    #[serde(rename = "type")]
    pub kind: PageMessageType,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "reqId")]
    pub req_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageResponse {
    /// Answer to a liveness probe.
    pub fn pong(req_id: impl Into<String>) -> Self {
        Self::success(req_id, Some(Value::String(PONG.to_string())))
    }

    /// Successful response; an absent result is sent as `null`.
    pub fn success(req_id: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: PageMessageType::Response,
            payload: payload.unwrap_or(Value::Null),
            req_id: req_id.into(),
            error: None,
        }
    }

    /// Error response carrying only the failure message.
    pub fn failure(req_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind: PageMessageType::ErrorResponse,
            payload: Value::Null,
            req_id: req_id.into(),
            error: Some(error.into()),
        }
    }

    /// A response counts as an error when typed so or when it carries an error string.
    pub fn is_error(&self) -> bool {
        self.kind == PageMessageType::ErrorResponse || self.error.is_some()
    }

    /// Convert into the page-side outcome of the request.
    ///
    /// Error responses fall back to the payload text, then to `"Unknown error"`,
    /// when they carry no error string.
    pub fn into_result(self) -> Result<Value, BridgeError> {
        if !self.is_error() {
            return Ok(self.payload);
        }
        let message = match (self.error, self.payload) {
            (Some(error), _) if !error.is_empty() => error,
            (_, Value::String(text)) if !text.is_empty() => text,
            _ => "Unknown error".to_string(),
        };
        Err(BridgeError::Remote(message))
    }

    /// Serialize to a JSON frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_request_detection() {
        let request = PageRequest::from_json(r#"{"type":"X","payload":"PING","reqId":"abc"}"#).unwrap();
        assert!(request.is_ping());
        assert_eq!(request.kind, "X");
        assert_eq!(request.req_id, "abc");

        let request = PageRequest::new(json!({"type": "PERMISSION_REQUEST"}), "req_1");
        assert!(!request.is_ping());
    }

    #[test]
    fn test_pong_wire_shape() {
        let response = PageResponse::pong("abc");
        assert_eq!(
            response.to_json().unwrap(),
            r#"{"type":"MIDEN_PAGE_RESPONSE","payload":"PONG","reqId":"abc"}"#
        );
    }

    #[test]
    fn test_error_wire_shape() {
        let response = PageResponse::failure("abc", "boom");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({"type": "MIDEN_PAGE_ERROR_RESPONSE", "payload": null, "reqId": "abc", "error": "boom"})
        );
    }

    #[test]
    fn test_success_without_result_is_null() {
        let response = PageResponse::success("r", None);
        assert_eq!(response.payload, Value::Null);
        assert!(response.error.is_none());
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_result_fallbacks() {
        let with_error = PageResponse::failure("r", "denied");
        assert_eq!(with_error.into_result(), Err(BridgeError::Remote("denied".into())));

        let payload_only = PageResponse {
            kind: PageMessageType::ErrorResponse,
            payload: json!("rejected by user"),
            req_id: "r".into(),
            error: None,
        };
        assert_eq!(payload_only.into_result(), Err(BridgeError::Remote("rejected by user".into())));

        let bare = PageResponse {
            kind: PageMessageType::ErrorResponse,
            payload: Value::Null,
            req_id: "r".into(),
            error: None,
        };
        assert_eq!(bare.into_result(), Err(BridgeError::Remote("Unknown error".into())));
    }

    #[test]
    fn test_malformed_frame() {
        let err = PageRequest::from_json("{not json").unwrap_err();
        assert!(matches!(err, BridgeError::Malformed(_)));
    }
}
