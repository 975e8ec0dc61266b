//! Ed25519 device identity.
//!
//! The public key is sent as unpadded base64url; the device id is the
//! lowercase hex SHA-256 of the raw public key, so it is stable for as
//! long as the keypair is.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

// ============================================================================
// DeviceSigner
// ============================================================================

/// Signing capability used by the handshake.
///
/// Implement this to back the device identity with a platform keystore;
/// [`DeviceIdentity`] is the in-process implementation.
pub trait DeviceSigner: Send + Sync {
    /// Stable device id derived from the public key.
    fn device_id(&self) -> &str;

    /// Public key as sent on the wire.
    fn public_key(&self) -> &str;

    /// Signs `payload`, returning a base64 signature.
    fn sign(&self, payload: &[u8]) -> String;
}

// ============================================================================
// DeviceIdentity
// ============================================================================

/// An Ed25519 keypair with its derived device id.
///
/// The private key only leaves this type in the stored form written by
/// key stores.
#[derive(Clone)]
pub struct DeviceIdentity {
    device_id: String,
    public_key: String,
    signing_key: SigningKey,
}

impl DeviceIdentity {
    /// Generates a fresh keypair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Rebuilds an identity from its 32-byte secret key.
    #[must_use]
    pub fn from_secret_key(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let public_key = URL_SAFE_NO_PAD.encode(verifying_key.as_bytes());
        let device_id = hex::encode(Sha256::digest(verifying_key.as_bytes()));

        Self {
            device_id,
            public_key,
            signing_key,
        }
    }

    /// Verifies a base64 signature produced by [`DeviceSigner::sign`].
    #[must_use]
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(bytes) = STANDARD.decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        self.signing_key
            .verifying_key()
            .verify(payload, &signature)
            .is_ok()
    }

    /// Converts to the persisted form.
    pub(crate) fn to_stored(&self) -> StoredIdentity {
        StoredIdentity {
            version: StoredIdentity::VERSION,
            device_id: self.device_id.clone(),
            public_key: self.public_key.clone(),
            private_key: STANDARD.encode(self.signing_key.to_bytes()),
            created_at: Utc::now(),
        }
    }

    /// Restores from the persisted form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] if the key is malformed or does not
    /// match the stored public key.
    pub(crate) fn from_stored(stored: &StoredIdentity) -> Result<Self> {
        if stored.version != StoredIdentity::VERSION {
            return Err(Error::identity(format!(
                "unsupported identity version {}",
                stored.version
            )));
        }

        let bytes = STANDARD
            .decode(stored.private_key.as_bytes())
            .map_err(|e| Error::identity(format!("decode private key: {e}")))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::identity("invalid private key length"))?;

        let identity = Self::from_secret_key(&secret);
        if identity.public_key != stored.public_key || identity.device_id != stored.device_id {
            return Err(Error::identity("stored public key does not match private key"));
        }

        Ok(identity)
    }
}

impl DeviceSigner for DeviceIdentity {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn public_key(&self) -> &str {
        &self.public_key
    }

    fn sign(&self, payload: &[u8]) -> String {
        STANDARD.encode(self.signing_key.sign(payload).to_bytes())
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// StoredIdentity
// ============================================================================

/// On-disk identity record.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredIdentity {
    pub version: u32,
    pub device_id: String,
    pub public_key: String,
    pub private_key: String,
    pub created_at: DateTime<Utc>,
}

impl StoredIdentity {
    const VERSION: u32 = 1;
}

// ============================================================================
// Tests
// ============================================================================
