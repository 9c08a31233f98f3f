//! The sealed-value envelope.
//!
//! A value is sealed under the key derived from its object's current
//! obligation set. The associated data binds the envelope to its object id,
//! the tip of its evidence log, and the log's parents: an envelope copied onto
//! another object, or left under a log with records dropped, reordered or
//! re-parented, no longer opens.

use chava_core::{EvidenceLog, ObjectId, ObligationSet};
use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionNonce, ObligationKey};
use crate::error::{CryptoError, Result};
use crate::keys::KeyManager;

const AAD_DOMAIN: &[u8] = b"chava-envelope-v1\x00";

/// Format identifier for sealed envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305, 256-bit key, [`associated_data`] as AAD.
    ChaCha20Poly1305 = 1,
}

/// Ciphertext plus what is needed to open it, given the right key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    pub format: EncryptionFormat,

    /// Fresh per seal.
    pub nonce: EncryptionNonce,

    /// Encrypted bytes including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// Seal `plaintext` under `key`, authenticating `aad`.
    pub fn seal(plaintext: &[u8], aad: &[u8], key: &ObligationKey) -> Result<Self> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, aad, &nonce)?;

        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    /// Open under `key`; `aad` must match what was sealed.
    pub fn open(&self, aad: &[u8], key: &ObligationKey) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => key.decrypt(&self.ciphertext, aad, &self.nonce),
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// Garbage bytes are reported as a decryption failure, since a stored
    /// ciphertext that doesn't parse can't be opened either.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|_| CryptoError::DecryptionError)
    }

    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}

/// Associated data binding an envelope to its object and evidence log.
///
/// `domain || len(id) || id || tip || len(parents) || parents`, lengths as
/// big-endian u32.
pub fn associated_data(id: &ObjectId, evidence: &EvidenceLog) -> Vec<u8> {
    let id = id.as_str().as_bytes();
    let parents = evidence.parents();

    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + 8 + id.len() + 32 * (parents.len() + 1));
    aad.extend_from_slice(AAD_DOMAIN);
    aad.extend_from_slice(&(id.len() as u32).to_be_bytes());
    aad.extend_from_slice(id);
    aad.extend_from_slice(evidence.tip().as_bytes());
    aad.extend_from_slice(&(parents.len() as u32).to_be_bytes());
    for parent in parents {
        aad.extend_from_slice(parent.as_bytes());
    }
    aad
}

/// Seal `plaintext` under the key for `obligations`, returning envelope bytes.
pub fn seal_for(
    keys: &dyn KeyManager,
    id: &ObjectId,
    evidence: &EvidenceLog,
    obligations: &ObligationSet,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let key = keys.key_for(obligations)?;
    SealedEnvelope::seal(plaintext, &associated_data(id, evidence), &key)?.to_bytes()
}

/// Open envelope bytes under the key for `obligations`.
pub fn open_for(
    keys: &dyn KeyManager,
    id: &ObjectId,
    evidence: &EvidenceLog,
    obligations: &ObligationSet,
    sealed: &[u8],
) -> Result<Vec<u8>> {
    let key = keys.key_for(obligations)?;
    SealedEnvelope::from_bytes(sealed)?.open(&associated_data(id, evidence), &key)
}
