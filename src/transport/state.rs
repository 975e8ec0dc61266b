//! Connection state machine.
//!
//! ```text
//! idle → connecting → authenticating → connected → closing → idle
//!            │               │              │
//!            └───────────────┴──────────────┴──→ reconnecting(attempt, delay) → connecting
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

// ============================================================================
// ConnectionState
// ============================================================================

/// State of the client's connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, stopped, or given up.
    #[default]
    Idle,
    /// Opening the socket.
    Connecting,
    /// Socket open, hello sent, waiting for the result.
    Authenticating,
    /// Hello accepted; requests and events flow.
    Connected,
    /// Caller-initiated shutdown in progress.
    Closing,
    /// Waiting `delay` before reconnect attempt number `attempt`.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
}

impl ConnectionState {
    /// Returns `true` if requests may be sent.
    #[inline]
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the client is doing anything at all.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Returns a short name for logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Reconnecting { .. } => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting(attempt={attempt}, delay={}ms)", delay.as_millis())
            }
            other => f.write_str(other.label()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
