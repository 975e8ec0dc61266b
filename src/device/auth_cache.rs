//! Cached device tokens.
//!
//! A signed hello may be answered with a device token. The next connect
//! presents that token instead of a fresh signature, until it expires,
//! the gateway rejects it, or the owner logs out.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::protocol::{AuthInfo, IssuedDeviceToken};

use super::{default_file, read_json, remove_file, write_private_json};

// ============================================================================
// DeviceAuthToken
// ============================================================================

/// A device token issued by the gateway.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthToken {
    /// Token value.
    pub token: String,
    /// Device the token was issued to.
    pub device_id: String,
    /// When the client received it.
    pub issued_at: DateTime<Utc>,
    /// Server-declared expiry, if any.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Role granted alongside the token.
    #[serde(default)]
    pub role: String,
    /// Scopes granted alongside the token.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl DeviceAuthToken {
    /// Creates a token record.
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token: token.into(),
            device_id: device_id.into(),
            issued_at,
            expires_at,
            role: String::new(),
            scopes: Vec::new(),
        }
    }

    /// Builds the record for a token received in `hello_ok`.
    pub(crate) fn from_hello(
        device_id: &str,
        issued: &IssuedDeviceToken,
        auth: &AuthInfo,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = issued
            .expires_at_ms()
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        Self {
            role: auth.role.clone(),
            scopes: auth.scopes.clone(),
            ..Self::new(device_id, issued.token(), now, expires_at)
        }
    }

    /// Returns `true` if the token has expired at `now`.
    #[inline]
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Returns `true` if the token has expired.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for DeviceAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAuthToken")
            .field("device_id", &self.device_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("role", &self.role)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AuthCache
// ============================================================================

/// Backend that holds the current device token.
#[async_trait]
pub trait AuthCache: Send + Sync {
    /// Loads the stored token, if any.
    async fn load(&self) -> Result<Option<DeviceAuthToken>>;

    /// Stores `token`, replacing any previous one.
    async fn store(&self, token: &DeviceAuthToken) -> Result<()>;

    /// Discards the stored token.
    async fn clear(&self) -> Result<()>;

    /// Loads the token only if it belongs to `device_id` and has not
    /// expired. Expired tokens are discarded.
    async fn load_valid(&self, device_id: &str) -> Result<Option<DeviceAuthToken>> {
        match self.load().await? {
            Some(token) if token.device_id != device_id => {
                debug!(cached = %token.device_id, device_id, "Cached device token is for another device");
                Ok(None)
            }
            Some(token) if token.is_expired() => {
                debug!(device_id, "Cached device token expired");
                self.clear().await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }
}

#[async_trait]
impl<T: AuthCache + ?Sized> AuthCache for Arc<T> {
    async fn load(&self) -> Result<Option<DeviceAuthToken>> {
        (**self).load().await
    }

    async fn store(&self, token: &DeviceAuthToken) -> Result<()> {
        (**self).store(token).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }

    async fn load_valid(&self, device_id: &str) -> Result<Option<DeviceAuthToken>> {
        (**self).load_valid(device_id).await
    }
}

// ============================================================================
// FileAuthCache
// ============================================================================

/// Stores the token as an owner-only JSON file.
#[derive(Debug, Clone)]
pub struct FileAuthCache {
    path: PathBuf,
}

impl FileAuthCache {
    /// Creates a cache at `path`.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a cache at the default location
    /// (`<config dir>/gateway-client/device-auth.json`).
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(default_file("device-auth.json"))
    }

    /// Returns the file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuthCache for FileAuthCache {
    async fn load(&self) -> Result<Option<DeviceAuthToken>> {
        read_json(&self.path).await
    }

    async fn store(&self, token: &DeviceAuthToken) -> Result<()> {
        write_private_json(&self.path, token).await
    }

    async fn clear(&self) -> Result<()> {
        remove_file(&self.path).await
    }
}

// ============================================================================
// MemoryAuthCache
// ============================================================================

/// Keeps the token in memory only.
#[derive(Debug, Default)]
pub struct MemoryAuthCache {
    slot: Mutex<Option<DeviceAuthToken>>,
}

impl MemoryAuthCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthCache for MemoryAuthCache {
    async fn load(&self) -> Result<Option<DeviceAuthToken>> {
        Ok(self.slot.lock().clone())
    }

    async fn store(&self, token: &DeviceAuthToken) -> Result<()> {
        *self.slot.lock() = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.slot.lock().take();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
