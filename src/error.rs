//! Error types for the gateway client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use gateway_client::{Error, GatewayClient, Result};
//!
//! async fn example(client: &GatewayClient) -> Result<()> {
//!     match client.request("sessions.list", serde_json::json!({})).await {
//!         Ok(sessions) => println!("{sessions}"),
//!         Err(Error::ConnectionLost) => println!("retry after reconnect"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionLost`], [`Error::NotConnected`], [`Error::Stopped`] |
//! | Authentication | [`Error::HelloRejected`] |
//! | Request | [`Error::Server`], [`Error::RequestTimeout`], [`Error::Timeout`], [`Error::Protocol`] |
//! | Device | [`Error::Identity`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the socket cannot be opened or a write fails.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The connection dropped while the request was in flight.
    ///
    /// Distinct from [`Error::Server`] so callers can tell a lost reply
    /// from a server-reported failure.
    #[error("Connection lost")]
    ConnectionLost,

    /// The client is not in the connected state.
    #[error("Not connected")]
    NotConnected,

    /// The client was stopped by its owner.
    #[error("Client stopped")]
    Stopped,

    // ========================================================================
    // Authentication Errors
    // ========================================================================
    /// The gateway answered the hello frame with `hello_error`.
    #[error("Hello rejected: {reason}")]
    HelloRejected {
        /// Reason code sent by the gateway.
        reason: String,
        /// Whether automatic reconnection may retry.
        retryable: bool,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The gateway answered a request with `{id, error}`.
    #[error("Server error: {message}")]
    Server {
        /// Error message from the gateway.
        message: String,
        /// Optional machine-readable code.
        code: Option<String>,
    },

    /// Request timed out waiting for its response.
    #[error("Request {request_id} ({method}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Method of the request.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Operation timeout.
    ///
    /// Returned when a connection phase exceeds its deadline.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Device identity could not be loaded, created or used.
    #[error("Device identity error: {message}")]
    Identity {
        /// Description of the identity error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a hello rejection error.
    #[inline]
    pub fn hello_rejected(reason: impl Into<String>, retryable: bool) -> Self {
        Self::HelloRejected {
            reason: reason.into(),
            retryable,
        }
    }

    /// Creates a server-reported request error.
    #[inline]
    pub fn server(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Server {
            message: message.into(),
            code,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a device identity error.
    #[inline]
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionLost
                | Self::NotConnected
                | Self::Stopped
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the gateway rejected the credentials.
    #[inline]
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::HelloRejected { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry, typically after the
    /// client reconnects.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ConnectionLost
            | Self::NotConnected
            | Self::Connection { .. }
            | Self::Timeout { .. }
            | Self::RequestTimeout { .. } => true,
            Self::HelloRejected { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_request_timeout_display() {
        let err = Error::request_timeout(RequestId::from_sequence(7), "chat.send", 1500);
        assert_eq!(
            err.to_string(),
            "Request r7 (chat.send) timed out after 1500ms"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::timeout("handshake", 5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionLost.is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::Stopped.is_connection_error());
        assert!(!Error::server("nope", None).is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_connection_lost_is_distinct_from_server_error() {
        let lost = Error::ConnectionLost;
        let server = Error::server("boom", Some("E_BOOM".into()));

        assert!(lost.is_recoverable());
        assert!(!server.is_recoverable());
        assert!(!server.is_connection_error());
    }

    #[test]
    fn test_hello_rejected_recoverability() {
        let fatal = Error::hello_rejected("invalid_token", false);
        let transient = Error::hello_rejected("server_busy", true);

        assert!(fatal.is_auth_error());
        assert!(!fatal.is_recoverable());
        assert!(transient.is_recoverable());
    }

    #[test]
    fn test_stopped_not_recoverable() {
        assert!(!Error::Stopped.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
