//! Error types for Chava Core.

use thiserror::Error;

/// Core errors that can occur while building or decoding objects.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid obligation kind: {0:?}")]
    InvalidKind(String),

    #[error("invalid scope: {0:?}")]
    InvalidScope(String),

    #[error("duplicate obligation {kind}:{scope}")]
    DuplicateObligation { kind: String, scope: String },

    #[error("invalid object id: {0:?}")]
    InvalidObjectId(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Integrity errors: the evidence log or its accounting against the
/// obligation set does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("record hash mismatch at position {position}")]
    HashMismatch { position: usize },

    #[error("broken chain link at position {position}")]
    BrokenLink { position: usize },

    #[error("evidence recorded for outstanding obligation {kind}:{scope}")]
    EvidenceForOutstanding { kind: String, scope: String },

    #[error("obligation {kind}:{scope} has more than one evidence record")]
    DuplicateEvidence { kind: String, scope: String },
}

impl IntegrityError {
    /// The log position the error refers to, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            IntegrityError::HashMismatch { position } | IntegrityError::BrokenLink { position } => {
                Some(*position)
            }
            _ => None,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
