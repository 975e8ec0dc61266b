//! WebSocket transport layer.
//!
//! This module owns the socket once the handshake has succeeded and
//! describes how the client moves between connection attempts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌─────────────────┐
//! │  GatewayClient   │                              │  Gateway        │
//! │                  │         WebSocket            │                 │
//! │  Supervisor      │◄────────────────────────────►│  hello / rpc /  │
//! │  → Connection    │        ws:// or wss://       │  event streams  │
//! │                  │                              │                 │
//! └──────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Idle` until the client is started
//! 2. `Connecting` while the socket opens
//! 3. `Authenticating` while hello is in flight
//! 4. `Connected` once `hello_ok` arrives; a `Connection` now owns the socket
//! 5. `Reconnecting` after an abnormal close, waiting out the backoff delay
//! 6. `Closing` while the owner stops the client
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Socket event loop and request correlation |
//! | `reconnect` | Backoff schedule |
//! | `state` | Connection state machine |

// ============================================================================
// Submodules
// ============================================================================

/// Socket event loop and request correlation.
pub(crate) mod connection;

/// Reconnection backoff schedule.
pub mod reconnect;

/// Connection state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub(crate) use connection::{CloseReason, Connection, EventSink, WsStream};
pub use connection::{CLOSE_ABNORMAL, CLOSE_INVALID_PAYLOAD, CLOSE_NO_STATUS, CLOSE_NORMAL};
pub use reconnect::ReconnectConfig;
pub use state::ConnectionState;
