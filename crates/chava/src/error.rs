//! Error types for Chava.
//!
//! No variant carries plaintext, key bytes, or the master secret.

use chava_core::{CoreError, IntegrityError, Obligation};
use chava_crypto::CryptoError;
use chava_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Chava operations.
#[derive(Debug, Error)]
pub enum ChavaError {
    /// No verifier is registered for this kind.
    #[error("unknown obligation kind: {0}")]
    UnknownObligationKind(String),

    /// The object doesn't owe `(kind, scope)`, possibly because it was
    /// already discharged.
    #[error("obligation not found: {kind}:{scope}")]
    ObligationNotFound { kind: String, scope: String },

    /// The verifier rejected the value. The object is unchanged.
    #[error("verification failed for {kind}:{scope}: {reason}")]
    VerificationFailure {
        kind: String,
        scope: String,
        reason: String,
    },

    /// Unwrap was attempted while obligations remain.
    #[error("obligations outstanding: {}", render(.outstanding))]
    ObligationViolation { outstanding: Vec<Obligation> },

    /// The ciphertext did not open under the key for the current obligations.
    #[error("decryption failed: ciphertext does not match the object's obligation key")]
    Decryption,

    /// The key manager failed.
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// Evidence chain or accounting check failed.
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Another writer stored a newer version first.
    #[error("storage conflict on {id}: expected version {expected:?}, found {current:?}")]
    StorageConflict {
        id: String,
        expected: Option<u64>,
        current: Option<u64>,
    },

    /// Unknown object id.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Projection path doesn't exist in the value.
    #[error("path not found: {0:?}")]
    PathNotFound(String),

    /// A value could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Other crypto error.
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl ChavaError {
    /// Whether re-reading the object and retrying can succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ChavaError::StorageConflict { .. })
    }
}

impl From<CryptoError> for ChavaError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionError => ChavaError::Decryption,
            CryptoError::KeyDerivationError(msg) => ChavaError::KeyDerivation(msg),
            CryptoError::CoreError(e) => ChavaError::Core(e),
            other => ChavaError::Crypto(other),
        }
    }
}

impl From<StoreError> for ChavaError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ChavaError::NotFound(id),
            other => ChavaError::Store(other),
        }
    }
}

fn render(obligations: &[Obligation]) -> String {
    let items: Vec<String> = obligations.iter().map(|o| o.to_string()).collect();
    format!("[{}]", items.join(", "))
}

/// Result type for Chava operations.
pub type Result<T> = std::result::Result<T, ChavaError>;
