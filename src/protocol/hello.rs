//! Handshake frame types.
//!
//! The first frame on every socket is a [`Hello`]. The gateway answers
//! with exactly one [`HelloOk`] or [`HelloError`]. A gateway that wants
//! the device to sign a fresh nonce sends a [`Challenge`] first.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DeviceSigner;

// ============================================================================
// Constants
// ============================================================================

/// Protocol version requested by default.
pub const PROTOCOL_VERSION: u32 = 3;

/// Hello error reasons that mean "the credentials are wrong".
///
/// Automatic reconnection stops on these until credentials change.
const NON_RETRYABLE_REASONS: &[&str] = &[
    "unauthorized",
    "invalid_token",
    "invalid_password",
    "invalid_signature",
    "bad_signature",
    "device_token_expired",
    "device_token_invalid",
    "device_not_paired",
    "auth_failed",
    "protocol_unsupported",
];

// ============================================================================
// AuthMode
// ============================================================================

/// Credential kind carried by a hello frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Bearer token.
    Token,
    /// Shared password.
    Password,
    /// Device keypair, either signed or with a cached device token.
    Device,
}

// ============================================================================
// HelloAuth
// ============================================================================

/// The `auth` object of a hello frame.
///
/// Secret fields are redacted from the `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuth {
    /// Credential kind.
    pub mode: AuthMode,
    /// Bearer token, or the cached device token in device mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Device id (device mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Device public key (device mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Signature over the hello payload (signed device mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Nonce that was signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Signing time, ms since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl HelloAuth {
    /// Bearer token credentials.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::empty(AuthMode::Token)
        }
    }

    /// Password credentials.
    #[must_use]
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::empty(AuthMode::Password)
        }
    }

    /// Device credentials proven by a fresh signature over `nonce` and `ts`.
    #[must_use]
    pub fn device_signed(signer: &dyn DeviceSigner, nonce: impl Into<String>, ts: i64) -> Self {
        let nonce = nonce.into();
        let payload = signature_payload(signer.device_id(), signer.public_key(), &nonce, ts);
        Self {
            device_id: Some(signer.device_id().to_string()),
            public_key: Some(signer.public_key().to_string()),
            signature: Some(signer.sign(payload.as_bytes())),
            nonce: Some(nonce),
            ts: Some(ts),
            ..Self::empty(AuthMode::Device)
        }
    }

    /// Device credentials using a device token issued by an earlier hello.
    #[must_use]
    pub fn device_token(signer: &dyn DeviceSigner, token: impl Into<String>, ts: i64) -> Self {
        Self {
            token: Some(token.into()),
            device_id: Some(signer.device_id().to_string()),
            public_key: Some(signer.public_key().to_string()),
            ts: Some(ts),
            ..Self::empty(AuthMode::Device)
        }
    }

    /// Returns `true` if this is device mode reusing a cached token.
    #[inline]
    #[must_use]
    pub fn uses_device_token(&self) -> bool {
        self.mode == AuthMode::Device && self.token.is_some() && self.signature.is_none()
    }

    fn empty(mode: AuthMode) -> Self {
        Self {
            mode,
            token: None,
            password: None,
            device_id: None,
            public_key: None,
            signature: None,
            nonce: None,
            ts: None,
        }
    }
}

impl fmt::Debug for HelloAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("HelloAuth")
            .field("mode", &self.mode)
            .field("token", &redact(&self.token))
            .field("password", &redact(&self.password))
            .field("device_id", &self.device_id)
            .field("public_key", &self.public_key)
            .field("signature", &redact(&self.signature))
            .field("nonce", &self.nonce)
            .field("ts", &self.ts)
            .finish()
    }
}

/// Builds the byte string a device signs in its hello.
///
/// Format: `gateway-hello-v1\n{deviceId}\n{publicKey}\n{nonce}\n{ts}`.
#[must_use]
pub fn signature_payload(device_id: &str, public_key: &str, nonce: &str, ts: i64) -> String {
    format!("gateway-hello-v1\n{device_id}\n{public_key}\n{nonce}\n{ts}")
}

// ============================================================================
// Hello
// ============================================================================

/// The hello frame.
///
/// # Format
///
/// ```json
/// { "type": "hello", "protocol": 3, "auth": { "mode": "token", "token": "..." } }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Hello {
    #[serde(rename = "type")]
    frame_type: &'static str,
    /// Requested protocol version.
    pub protocol: u32,
    /// Credentials.
    pub auth: HelloAuth,
}

impl Hello {
    /// Creates a hello frame.
    #[inline]
    #[must_use]
    pub fn new(protocol: u32, auth: HelloAuth) -> Self {
        Self {
            frame_type: "hello",
            protocol,
            auth,
        }
    }
}

// ============================================================================
// Challenge
// ============================================================================

/// Server-issued nonce: `{ "type": "challenge", "nonce": "...", "ts": 123 }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Challenge {
    /// Value to sign.
    pub nonce: String,
    /// Server time, ms since the Unix epoch.
    #[serde(default)]
    pub ts: Option<i64>,
}

// ============================================================================
// HelloOk
// ============================================================================

/// Successful handshake result.
///
/// # Format
///
/// ```json
/// {
///   "type": "hello_ok",
///   "protocol": 3,
///   "features": { "methods": ["chat.send"], "events": ["chat"] },
///   "auth": { "role": "operator", "scopes": ["operator.admin"] },
///   "deviceToken": "..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    /// Negotiated protocol version.
    pub protocol: u32,
    /// Capability lists.
    #[serde(default)]
    pub features: Features,
    /// Authorization granted to this connection.
    #[serde(default)]
    pub auth: AuthInfo,
    /// Device token for future connects, if issued.
    #[serde(default)]
    pub device_token: Option<IssuedDeviceToken>,
}

/// Methods and events the gateway supports on this connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    /// Callable methods.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Event streams the gateway may push.
    #[serde(default)]
    pub events: Vec<String>,
}

impl Features {
    /// Returns `true` if `method` is advertised.
    #[inline]
    #[must_use]
    pub fn supports_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    /// Returns `true` if `stream` is advertised.
    #[inline]
    #[must_use]
    pub fn supports_event(&self, stream: &str) -> bool {
        self.events.iter().any(|e| e == stream)
    }
}

/// Authorization descriptor: `{ role, scopes }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// Role name.
    #[serde(default)]
    pub role: String,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AuthInfo {
    /// Returns `true` if `scope` was granted.
    #[inline]
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Device token as sent in `hello_ok.deviceToken`.
///
/// Gateways send either a bare string or an object with an expiry.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IssuedDeviceToken {
    /// Token without a server-declared expiry.
    Bare(String),
    /// Token with expiry.
    Detailed {
        /// Token value.
        token: String,
        /// Expiry, ms since the Unix epoch.
        #[serde(default, rename = "expiresAt")]
        expires_at: Option<i64>,
    },
}

impl IssuedDeviceToken {
    /// Returns the token value.
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::Bare(token) | Self::Detailed { token, .. } => token,
        }
    }

    /// Returns the declared expiry in ms since the Unix epoch.
    #[must_use]
    pub fn expires_at_ms(&self) -> Option<i64> {
        match self {
            Self::Bare(_) => None,
            Self::Detailed { expires_at, .. } => *expires_at,
        }
    }
}

impl fmt::Debug for IssuedDeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedDeviceToken")
            .field("expires_at", &self.expires_at_ms())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HelloError
// ============================================================================

/// Rejected handshake: `{ "type": "hello_error", "reason": "invalid_token" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelloError {
    /// Reason code.
    pub reason: String,
    /// Optional human-readable detail.
    #[serde(default)]
    pub message: Option<String>,
}

impl HelloError {
    /// Returns `false` when the reason says the credentials themselves
    /// were rejected.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !NON_RETRYABLE_REASONS.contains(&self.reason.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    use crate::device::DeviceIdentity;

    #[test]
    fn test_token_hello_shape() {
        let hello = Hello::new(PROTOCOL_VERSION, HelloAuth::token("secret"));
        let value = serde_json::to_value(&hello).unwrap();

        assert_eq!(
            value,
            json!({"type": "hello", "protocol": 3, "auth": {"mode": "token", "token": "secret"}})
        );
    }

    #[test]
    fn test_password_hello_shape() {
        let value = serde_json::to_value(Hello::new(3, HelloAuth::password("pw"))).unwrap();
        assert_eq!(value["auth"], json!({"mode": "password", "password": "pw"}));
    }

    #[test]
    fn test_signed_device_hello_verifies() {
        let identity = DeviceIdentity::generate();
        let auth = HelloAuth::device_signed(&identity, "nonce-1", 1_700_000_000_000);

        assert_eq!(auth.mode, AuthMode::Device);
        assert!(!auth.uses_device_token());
        assert_eq!(auth.device_id.as_deref(), Some(identity.device_id()));

        let payload = signature_payload(
            identity.device_id(),
            identity.public_key(),
            "nonce-1",
            1_700_000_000_000,
        );
        let signature = auth.signature.as_deref().unwrap();
        assert!(identity.verify(payload.as_bytes(), signature));
    }

    #[test]
    fn test_device_token_hello_has_no_signature() {
        let identity = DeviceIdentity::generate();
        let auth = HelloAuth::device_token(&identity, "dev-tok", 5);
        let value = serde_json::to_value(&auth).unwrap();

        assert!(auth.uses_device_token());
        assert_eq!(value["token"], "dev-tok");
        assert_eq!(value.get("signature"), None);
        assert_eq!(value["deviceId"], Value::String(identity.device_id().into()));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", HelloAuth::token("super-secret"));
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_hello_ok_parsing() {
        let ok: HelloOk = serde_json::from_value(json!({
            "type": "hello_ok",
            "protocol": 3,
            "features": {"methods": ["chat.send", "status"], "events": ["chat"]},
            "auth": {"role": "operator", "scopes": ["operator.read"]},
            "deviceToken": {"token": "dt", "expiresAt": 99}
        }))
        .unwrap();

        assert!(ok.features.supports_method("status"));
        assert!(!ok.features.supports_method("config.apply"));
        assert!(ok.features.supports_event("chat"));
        assert!(ok.auth.has_scope("operator.read"));
        assert_eq!(ok.device_token.as_ref().map(IssuedDeviceToken::token), Some("dt"));
        assert_eq!(ok.device_token.unwrap().expires_at_ms(), Some(99));
    }

    #[test]
    fn test_hello_ok_minimal() {
        let ok: HelloOk =
            serde_json::from_value(json!({"type": "hello_ok", "protocol": 2, "deviceToken": "t"}))
                .unwrap();
        assert_eq!(ok.features, Features::default());
        assert_eq!(ok.auth.role, "");
        assert_eq!(ok.device_token, Some(IssuedDeviceToken::Bare("t".into())));
    }

    #[test]
    fn test_hello_error_classification() {
        let fatal = HelloError {
            reason: "invalid_token".into(),
            message: None,
        };
        let transient = HelloError {
            reason: "gateway_starting".into(),
            message: None,
        };
        assert!(!fatal.is_retryable());
        assert!(transient.is_retryable());
    }
}
