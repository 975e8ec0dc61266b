//! Lifecycle payloads passed to `on_hello` and `on_close`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::identifiers::Generation;
use crate::protocol::{AuthInfo, Features, HelloOk};

// ============================================================================
// Types
// ============================================================================

/// Callback invoked on every successful hello, including reconnects.
pub type HelloHandler = Arc<dyn Fn(&HelloInfo) + Send + Sync>;

/// Callback invoked whenever a connection or connection attempt ends.
pub type CloseHandler = Arc<dyn Fn(&CloseInfo) + Send + Sync>;

// ============================================================================
// HelloInfo
// ============================================================================

/// What the gateway granted on a successful hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloInfo {
    /// Connection generation (1 for the first connection).
    pub generation: Generation,
    /// Negotiated protocol version.
    pub protocol: u32,
    /// Methods and event streams available on this connection.
    pub features: Features,
    /// Role and scopes granted to this connection.
    pub auth: AuthInfo,
    /// Whether the gateway issued a device token.
    pub device_token_issued: bool,
}

impl HelloInfo {
    pub(crate) fn new(generation: Generation, hello_ok: HelloOk) -> Self {
        Self {
            generation,
            protocol: hello_ok.protocol,
            features: hello_ok.features,
            auth: hello_ok.auth,
            device_token_issued: hello_ok.device_token.is_some(),
        }
    }

    /// Returns `true` unless this is the first connection.
    #[inline]
    #[must_use]
    pub fn is_reconnect(&self) -> bool {
        !self.generation.is_first()
    }
}

// ============================================================================
// CloseInfo
// ============================================================================

/// Why a connection (or connection attempt) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Generation of the last established connection.
    pub generation: Generation,
    /// WebSocket close code, or 4000/4001 for hello rejections.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
    /// Whether the client will reconnect on its own.
    pub will_retry: bool,
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "closed ({}): {}", self.code, self.reason)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Shared-secret credentials.
///
/// A device identity, when configured, is used instead of these.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token.
    pub token: Option<String>,
    /// Shared password.
    pub password: Option<String>,
}

impl Credentials {
    /// Token credentials.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            password: None,
        }
    }

    /// Password credentials.
    #[must_use]
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            token: None,
            password: Some(password.into()),
        }
    }

    /// Returns `true` if neither a token nor a password is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.password.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::IssuedDeviceToken;

    #[test]
    fn test_hello_info_from_hello_ok() {
        let hello_ok = HelloOk {
            protocol: 3,
            features: Features {
                methods: vec!["status".into()],
                events: vec!["chat".into()],
            },
            auth: AuthInfo {
                role: "operator".into(),
                scopes: vec![],
            },
            device_token: Some(IssuedDeviceToken::Bare("dt".into())),
        };

        let first = HelloInfo::new(Generation::new(1), hello_ok.clone());
        assert!(!first.is_reconnect());
        assert!(first.device_token_issued);
        assert!(first.features.supports_method("status"));

        let second = HelloInfo::new(Generation::new(2), hello_ok);
        assert!(second.is_reconnect());
    }

    #[test]
    fn test_credentials() {
        assert!(Credentials::default().is_empty());
        assert!(!Credentials::token("t").is_empty());

        let debug = format!("{:?}", Credentials::password("hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_close_info_display() {
        let info = CloseInfo {
            generation: Generation::new(1),
            code: 1006,
            reason: "stream ended".into(),
            will_retry: true,
        };
        assert_eq!(info.to_string(), "closed (1006): stream ended");
    }
}
