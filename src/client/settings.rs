//! Persisted connection settings.
//!
//! The file holds the gateway URL and, optionally, the shared token or
//! password. It is written owner-only since it may carry secrets.
//!
//! ```json
//! { "gatewayUrl": "wss://gateway.example:18789", "token": "..." }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{default_file, read_json, write_private_json};
use crate::error::Result;

// ============================================================================
// GatewaySettings
// ============================================================================

/// Where to connect and which shared secret to use.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySettings {
    /// WebSocket URL of the gateway.
    pub gateway_url: String,

    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Shared password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl GatewaySettings {
    /// Creates settings for `gateway_url` with no credentials.
    #[inline]
    #[must_use]
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            ..Self::default()
        }
    }

    /// Sets the bearer token.
    #[inline]
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the shared password.
    #[inline]
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Returns `<config dir>/gateway-client/settings.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        default_file("settings.json")
    }

    /// Loads settings from `path`. A missing file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Io`] if the file cannot be read
    /// - [`crate::Error::Json`] if the file is not valid settings JSON
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let settings = read_json(path).await?;
        debug!(path = %path.display(), found = settings.is_some(), "Loaded gateway settings");
        Ok(settings)
    }

    /// Saves settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the file cannot be written.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_private_json(path.as_ref(), self).await
    }
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("gateway_url", &self.gateway_url)
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

    use serde_json::json;

    #[test]
    fn test_json_shape() {
        let settings = GatewaySettings::new("ws://127.0.0.1:18789").with_token("t");
        assert_eq!(
            serde_json::to_value(&settings).unwrap(),
            json!({"gatewayUrl": "ws://127.0.0.1:18789", "token": "t"})
        );
    }

    #[test]
    fn test_debug_redacts() {
        let settings = GatewaySettings::new("ws://x").with_password("hunter2");
        let debug = format!("{settings:?}");
        assert!(debug.contains("ws://x"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_default_path_file_name() {
        assert!(GatewaySettings::default_path().ends_with("settings.json"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        assert!(GatewaySettings::load(&path).await.unwrap().is_none());

        let settings = GatewaySettings::new("wss://gw.example").with_password("pw");
        settings.save(&path).await.unwrap();

        let loaded = GatewaySettings::load(&path).await.unwrap();
        assert_eq!(loaded, Some(settings));
    }
}
