//! # Collaborator Error Types
//!
//! Errors raised at the boundary between the substrate and its collaborators.
//!
//! - `StorageError`: the persistent session store failed to read or write
//! - `BridgeError`: a page request could not be completed
//!
//! Neither type is ever sent to a page as a live error. The bridge flattens
//! failures into the `error` string of an error response.

use thiserror::Error;

/// Failure of the persistent key/value store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend could not be read or written.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure of a file-backed store.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one request/response round trip over the page bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// An inbound frame could not be parsed as a page message.
    #[error("Malformed page message: {0}")]
    Malformed(String),

    /// No response arrived for the request in time.
    #[error("Request timeout")]
    Timeout(String),

    /// The channel to the other side closed while the request was pending.
    #[error("Bridge disconnected")]
    Disconnected,

    /// The other side answered with an error response.
    #[error("{0}")]
    Remote(String),

    /// The action dispatcher failed to process the request.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

impl BridgeError {
    /// The string carried in the `error` field of an error response.
    pub fn wire_message(&self) -> String {
        match self {
            BridgeError::Remote(message) | BridgeError::Dispatch(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_displays_verbatim() {
        let error = BridgeError::Remote("boom".to_string());
        assert_eq!(error.to_string(), "boom");
        assert_eq!(error.wire_message(), "boom");
    }

    #[test]
    fn test_dispatch_wire_message_drops_prefix() {
        let error = BridgeError::Dispatch("no account".to_string());
        assert_eq!(error.to_string(), "Dispatch failed: no account");
        assert_eq!(error.wire_message(), "no account");
    }

    #[test]
    fn test_timeout_matches_page_message() {
        assert_eq!(BridgeError::Timeout("req_1".into()).to_string(), "Request timeout");
    }
}
