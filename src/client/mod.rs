//! Gateway client.
//!
//! This module provides the entry point for talking to a gateway.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GatewayClient`] | Facade: `start`, `stop`, `request`, event subscriptions |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Timeouts, limits and reconnect policy |
//! | [`GatewaySettings`] | Persisted URL and shared secret |
//! | [`EventDispatcher`] | Event fan-out shared across reconnects |
//! | [`HelloInfo`] / [`CloseInfo`] | Lifecycle callback payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Client facade and shared state.
pub mod core;

/// Event subscriptions and fan-out.
pub mod events;

/// Socket open and hello round-trip.
mod handshake;

/// Lifecycle payloads and credentials.
pub mod info;

/// Client tuning options.
pub mod options;

/// Persisted connection settings.
pub mod settings;

/// Reconnect supervisor.
mod supervisor;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use self::core::{GatewayClient, IDEMPOTENCY_KEY_FIELD};
pub use events::{EventDispatcher, EventHandler, StreamFilter};
pub use info::{CloseHandler, CloseInfo, Credentials, HelloHandler, HelloInfo};
pub use options::{ClientOptions, RequestOptions};
pub use settings::GatewaySettings;
pub use supervisor::{CLOSE_AUTH_REJECTED, CLOSE_HELLO_REJECTED};
