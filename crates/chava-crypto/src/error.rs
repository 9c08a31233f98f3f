//! Error types for key derivation and sealing.
//!
//! Messages never carry key bytes or plaintext.

use thiserror::Error;

/// Errors that can occur while deriving keys or sealing values.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Sealing failed.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// The ciphertext does not open under the derived key and object id.
    ///
    /// Either the envelope was tampered with, it belongs to another object,
    /// or it was sealed under a different obligation set.
    #[error("decryption failed: ciphertext does not authenticate under the derived key")]
    DecryptionError,

    /// The key manager could not produce a key.
    #[error("key derivation error: {0}")]
    KeyDerivationError(String),

    /// Envelope bytes could not be encoded or decoded.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] chava_core::CoreError),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
