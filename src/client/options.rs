//! Client tuning options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gateway_client::{ClientOptions, ReconnectConfig};
//!
//! let options = ClientOptions::new()
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_challenge_timeout(Duration::from_millis(500))
//!     .with_reconnect(ReconnectConfig::disabled());
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::protocol::PROTOCOL_VERSION;
use crate::transport::ReconnectConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default socket open timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default hello round-trip timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on in-flight requests.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 256;

// ============================================================================
// ClientOptions
// ============================================================================

/// Timeouts, limits and reconnect policy for a [`GatewayClient`](crate::GatewayClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Protocol version sent in the hello frame.
    pub protocol_version: u32,

    /// Default timeout for each request.
    pub request_timeout: Duration,

    /// Timeout for opening the socket.
    pub connect_timeout: Duration,

    /// Timeout for the hello round-trip.
    pub handshake_timeout: Duration,

    /// How long to wait for a server challenge before signing a local
    /// nonce. `None` signs a local nonce immediately.
    pub challenge_timeout: Option<Duration>,

    /// Maximum number of in-flight requests.
    pub max_pending_requests: usize,

    /// Reconnect backoff policy.
    pub reconnect: ReconnectConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            challenge_timeout: None,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the protocol version.
    #[inline]
    #[must_use]
    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the socket open timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the hello round-trip timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Waits up to `timeout` for a server challenge before signing.
    #[inline]
    #[must_use]
    pub fn with_challenge_timeout(mut self, timeout: Duration) -> Self {
        self.challenge_timeout = Some(timeout);
        self
    }

    /// Sets the in-flight request cap.
    #[inline]
    #[must_use]
    pub fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout.is_zero()
            || self.connect_timeout.is_zero()
            || self.handshake_timeout.is_zero()
        {
            return Err("Timeouts must be greater than zero".to_string());
        }

        if self.max_pending_requests == 0 {
            return Err("max_pending_requests must be greater than zero".to_string());
        }

        let multiplier = self.reconnect.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {multiplier}"
            ));
        }

        if self.reconnect.initial_delay > self.reconnect.max_delay {
            return Err("reconnect initial_delay must not exceed max_delay".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// RequestOptions
// ============================================================================

/// Per-call overrides for [`GatewayClient::request_with`](crate::GatewayClient::request_with).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Overrides [`ClientOptions::request_timeout`].
    pub timeout: Option<Duration>,

    /// Inserted into the params object as `idempotencyKey`.
    pub idempotency_key: Option<String>,
}

impl RequestOptions {
    /// Creates empty request options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options carrying a fresh random idempotency key.
    #[must_use]
    pub fn idempotent() -> Self {
        Self::new().with_idempotency_key(uuid::Uuid::new_v4().to_string())
    }

    /// Sets the timeout for this call.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the idempotency key for this call.
    #[inline]
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
