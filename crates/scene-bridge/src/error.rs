//! Error types for the scene bridge.
//!
//! Errors split into two families: wire-level failures that poison the
//! connection they occurred on, and request-level failures that are reported
//! to the peer in an error envelope while the connection stays open.

use std::time::Duration;
use thiserror::Error;

/// Main error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Wire-level errors
    #[error("Framing error: {message}")]
    Framing { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Transport errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Failed to bind {endpoint}: {message}")]
    Bind { endpoint: String, message: String },

    #[error("Invalid endpoint: {message}")]
    InvalidEndpoint { message: String },

    // Request errors, reported in an error envelope
    #[error("unknown action: {action}")]
    UnknownAction { action: String },

    #[error("unknown tool {tool}")]
    UnknownTool { tool: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    // Execution errors
    #[error("operation {operation} failed: {message}")]
    Operation { operation: String, message: String },

    #[error("operation {operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("main loop is not running")]
    MainLoopClosed,

    #[error("main loop queue is full ({capacity} tasks pending)")]
    QueueFull { capacity: usize },

    // Registration errors
    #[error("tool already registered: {tool}")]
    DuplicateTool { tool: String },

    // Client-side view of a peer's error envelope
    #[error("server error: {message}")]
    Remote { message: String },
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

// Conversion implementations for common error types

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BridgeError {
    /// Shorthand for a framing violation.
    pub fn framing(message: impl Into<String>) -> Self {
        BridgeError::Framing {
            message: message.into(),
        }
    }

    /// Shorthand for a transport failure.
    pub fn connection(message: impl Into<String>) -> Self {
        BridgeError::Connection {
            message: message.into(),
        }
    }

    /// Check if this error poisons the connection it occurred on.
    ///
    /// Fatal errors close the connection without a reply; everything else is
    /// answered with an error envelope and the connection stays usable.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Framing { .. }
                | BridgeError::Io { .. }
                | BridgeError::Connection { .. }
                | BridgeError::Bind { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::UnknownTool {
            tool: "create_qube".into(),
        };
        assert_eq!(err.to_string(), "unknown tool create_qube");

        let err = BridgeError::UnknownAction {
            action: "ping".into(),
        };
        assert_eq!(err.to_string(), "unknown action: ping");
    }

    #[test]
    fn test_timeout_display_names_operation() {
        let err = BridgeError::Timeout {
            operation: "create_object".into(),
            timeout: Duration::from_secs(15),
        };
        assert!(err.to_string().contains("create_object"));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_connection_fatal_classification() {
        assert!(BridgeError::framing("bad length header").is_connection_fatal());
        assert!(BridgeError::connection("refused").is_connection_fatal());
        assert!(!BridgeError::UnknownAction { action: "ping".into() }.is_connection_fatal());
        assert!(!BridgeError::Timeout {
            operation: "slow".into(),
            timeout: Duration::from_secs(1),
        }
        .is_connection_fatal());
    }
}
