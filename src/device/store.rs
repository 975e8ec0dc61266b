//! Identity persistence.
//!
//! [`KeyStore::load_or_create`] is the entry point: the first call
//! generates and saves a keypair, every later call returns the same one.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::Result;

use super::identity::{DeviceIdentity, DeviceSigner, StoredIdentity};
use super::{default_file, read_json, write_private_json};

// ============================================================================
// KeyStore
// ============================================================================

/// Backend that holds the device identity.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Loads the stored identity. `Ok(None)` means "not yet created".
    async fn load(&self) -> Result<Option<DeviceIdentity>>;

    /// Persists `identity`, replacing any previous one.
    async fn save(&self, identity: &DeviceIdentity) -> Result<()>;

    /// Loads the identity, generating and saving one on first use.
    async fn load_or_create(&self) -> Result<DeviceIdentity> {
        if let Some(identity) = self.load().await? {
            debug!(device_id = %identity.device_id(), "Loaded device identity");
            return Ok(identity);
        }

        let identity = DeviceIdentity::generate();
        self.save(&identity).await?;
        info!(device_id = %identity.device_id(), "Created device identity");
        Ok(identity)
    }
}

#[async_trait]
impl<T: KeyStore + ?Sized> KeyStore for Arc<T> {
    async fn load(&self) -> Result<Option<DeviceIdentity>> {
        (**self).load().await
    }

    async fn save(&self, identity: &DeviceIdentity) -> Result<()> {
        (**self).save(identity).await
    }

    async fn load_or_create(&self) -> Result<DeviceIdentity> {
        (**self).load_or_create().await
    }
}

// ============================================================================
// FileKeyStore
// ============================================================================

/// Stores the identity as an owner-only JSON file.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Creates a store at `path`.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at the default location
    /// (`<config dir>/gateway-client/device.json`).
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(default_file("device.json"))
    }

    /// Returns the file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn load(&self) -> Result<Option<DeviceIdentity>> {
        match read_json::<StoredIdentity>(&self.path).await? {
            Some(stored) => DeviceIdentity::from_stored(&stored).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, identity: &DeviceIdentity) -> Result<()> {
        write_private_json(&self.path, &identity.to_stored()).await
    }
}

// ============================================================================
// MemoryKeyStore
// ============================================================================

/// Keeps the identity in memory only.
///
/// For environments without durable secure storage: the identity lives
/// as long as the process.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    slot: Mutex<Option<DeviceIdentity>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load(&self) -> Result<Option<DeviceIdentity>> {
        Ok(self.slot.lock().clone())
    }

    async fn save(&self, identity: &DeviceIdentity) -> Result<()> {
        *self.slot.lock() = Some(identity.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
