//! Key management: the master secret and obligation-key derivation.
//!
//! `DeriveKey(secret, fingerprint)` is a BLAKE3 keyed hash under the 32-byte
//! master secret over a fixed context tag followed by the fingerprint bytes.
//! Distinct fingerprints give independent keys; the empty set maps to the
//! fixed "cleared" key.

use chava_core::{Fingerprint, ObligationSet};
use rand::RngCore;
use std::fmt;

use crate::crypto::ObligationKey;
use crate::error::Result;

/// Context tag mixed into every obligation-key derivation.
const KEY_CONTEXT: &[u8] = b"chava-obligation-key-v0\x00";

/// Context for stretching a passphrase into a master secret.
const PASSPHRASE_CONTEXT: &str = "chava-v0 master secret from passphrase";

/// The process-wide master secret.
///
/// Not serializable, and `Debug` never shows the bytes.
#[derive(Clone)]
pub struct MasterSecret([u8; 32]);

impl MasterSecret {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Map an arbitrary-length secret to 32 bytes.
    pub fn from_passphrase(passphrase: &[u8]) -> Self {
        Self(blake3::derive_key(PASSPHRASE_CONTEXT, passphrase))
    }

    /// Generate a fresh random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn derive(&self, fingerprint: &Fingerprint) -> ObligationKey {
        let mut hasher = blake3::Hasher::new_keyed(&self.0);
        hasher.update(KEY_CONTEXT);
        hasher.update(fingerprint.as_bytes());
        ObligationKey::from_bytes(*hasher.finalize().as_bytes())
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(<redacted>)")
    }
}

/// The key-management contract.
///
/// `derive` must be deterministic for a given secret and fingerprint for the
/// lifetime of the process. Implementations may front an external service.
pub trait KeyManager: Send + Sync {
    /// Derive the key for a canonical fingerprint.
    fn derive(&self, fingerprint: &Fingerprint) -> Result<ObligationKey>;

    /// Derive the key for an obligation set.
    fn key_for(&self, obligations: &ObligationSet) -> Result<ObligationKey> {
        self.derive(&obligations.fingerprint())
    }
}

/// Derives keys in-process from a [`MasterSecret`].
#[derive(Debug, Clone)]
pub struct LocalKeyManager {
    secret: MasterSecret,
}

impl LocalKeyManager {
    pub fn new(secret: MasterSecret) -> Self {
        Self { secret }
    }

    /// A key manager with a fresh random secret.
    pub fn generate() -> Self {
        Self::new(MasterSecret::generate())
    }
}

impl KeyManager for LocalKeyManager {
    fn derive(&self, fingerprint: &Fingerprint) -> Result<ObligationKey> {
        Ok(self.secret.derive(fingerprint))
    }
}

impl<K: KeyManager + ?Sized> KeyManager for std::sync::Arc<K> {
    fn derive(&self, fingerprint: &Fingerprint) -> Result<ObligationKey> {
        (**self).derive(fingerprint)
    }
}
