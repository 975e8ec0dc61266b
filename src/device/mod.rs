//! Device identity and device-token persistence.
//!
//! A device proves who it is with an Ed25519 keypair instead of a
//! password. After the first signed hello the gateway may issue a
//! short-lived device token, cached here so later connects can skip
//! re-signing.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DeviceSigner`] | Signing capability used by the handshake |
//! | [`DeviceIdentity`] | In-process Ed25519 keypair |
//! | [`KeyStore`] | Loads or creates the identity ([`FileKeyStore`], [`MemoryKeyStore`]) |
//! | [`DeviceAuthToken`] | Cached device token |
//! | [`AuthCache`] | Token persistence ([`FileAuthCache`], [`MemoryAuthCache`]) |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Cached device tokens.
pub mod auth_cache;

/// Ed25519 device identity.
pub mod identity;

/// Identity persistence.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use auth_cache::{AuthCache, DeviceAuthToken, FileAuthCache, MemoryAuthCache};
pub use identity::{DeviceIdentity, DeviceSigner};
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore};

// ============================================================================
// Constants
// ============================================================================

/// Directory name under the platform config dir.
const APP_DIR: &str = "gateway-client";

// ============================================================================
// File Helpers
// ============================================================================

/// Returns `<config dir>/gateway-client/<file>`, or `./<file>` when the
/// platform has no config dir.
pub(crate) fn default_file(file: &str) -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(file))
        .unwrap_or_else(|| PathBuf::from(file))
}

/// Reads a JSON file. A missing file is `Ok(None)`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes a JSON file readable only by the owner.
///
/// The bytes go to a uniquely named sibling temp file, created `0600` on
/// unix, which is then renamed into place.
pub(crate) async fn write_private_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || persist_private(&path, &json))
        .await
        .map_err(IoError::other)??;
    Ok(())
}

fn persist_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Removes a file. A missing file is not an error.
pub(crate) async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Tests
// ============================================================================
