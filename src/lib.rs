//! Gateway Client - resilient WebSocket client for an agent gateway.
//!
//! This library keeps one authenticated WebSocket session to a gateway
//! alive, multiplexes request/response calls over it and fans out
//! server-pushed events to subscribers.
//!
//! # Architecture
//!
//! The client is a small set of cooperating tokio tasks:
//!
//! - **Supervisor**: opens the socket, runs the hello handshake, reconnects
//!   with exponential backoff
//! - **Connection loop**: owns the socket, correlates responses by `id`,
//!   routes events, fails pending requests when the socket closes
//! - **Facade**: [`GatewayClient`] methods callable from any task
//!
//! Key design principles:
//!
//! - Each connection gets a fresh [`Generation`]; nothing from an old
//!   connection leaks into a new one
//! - In-flight requests are never replayed after a reconnect
//! - Event handlers run isolated: a panicking handler is logged and skipped
//!
//! # Quick Start
//!
//! ```no_run
//! use gateway_client::{GatewayClient, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = GatewayClient::builder()
//!         .url("ws://127.0.0.1:18789")
//!         .token("secret")
//!         .on_hello(|hello| println!("connected ({})", hello.generation))
//!         .build()?;
//!
//!     client.on("chat", |event| println!("chat: {}", event.data));
//!     client.start();
//!
//!     let status = client.request("status", json!({})).await?;
//!     println!("status: {status}");
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`GatewayClient`], builder, options, callbacks |
//! | [`device`] | Device identity, key storage and device token cache |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Gateway frame types |
//! | [`transport`] | Connection state and reconnect policy |
//!
//! # Features
//!
//! - **`tls`**: enables `wss://` URLs via native-tls

// ============================================================================
// Modules
// ============================================================================

/// Gateway client facade and configuration.
///
/// Use [`GatewayClient::builder()`] to create a configured client.
pub mod client;

/// Device identity and token persistence.
pub mod device;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Gateway protocol frame types.
pub mod protocol;

/// WebSocket connection handling.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    CLOSE_AUTH_REJECTED, CLOSE_HELLO_REJECTED, ClientBuilder, ClientOptions, CloseInfo,
    Credentials, EventDispatcher, GatewayClient, GatewaySettings, HelloInfo, IDEMPOTENCY_KEY_FIELD,
    RequestOptions, StreamFilter,
};

// Device types
pub use device::{
    AuthCache, DeviceAuthToken, DeviceIdentity, DeviceSigner, FileAuthCache, FileKeyStore,
    KeyStore, MemoryAuthCache, MemoryKeyStore,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Generation, RequestId, SubscriptionId};

// Protocol types
pub use protocol::{EventFrame, StreamKind};

// Transport types
pub use transport::{ConnectionState, ReconnectConfig};
