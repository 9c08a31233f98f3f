//! # Chava Core
//!
//! Pure primitives for Chava: obligations, evidence logs, and the object
//! model that ties a sealed value to the checks it still owes.
//!
//! This crate contains no I/O, no storage, and no key material. Sealing and
//! unsealing live in `chava-crypto`; persistence lives in `chava-store`.
//!
//! ## Key Types
//!
//! - [`Obligation`] - A `(kind, scope)` verification requirement
//! - [`ObligationSet`] - Canonically ordered set of obligations
//! - [`Fingerprint`] - Order-independent encoding of a set, the key-derivation input
//! - [`EvidenceLog`] - Append-only, hash-chained discharge records
//! - [`ChavaObject`] - One immutable version of ⟨ciphertext, obligations, evidence⟩
//! - [`ObjectRecord`] - The persisted exchange format
//!
//! ## Canonicalization
//!
//! Fingerprints and evidence hashes are computed over deterministic CBOR. See
//! [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod evidence;
pub mod object;
pub mod path;
pub mod types;
pub mod validation;

pub use canonical::{evidence_hash_input, fingerprint_bytes};
pub use crypto::Blake3Hash;
pub use error::{CoreError, IntegrityError, Result};
pub use evidence::{verify_chain, EvidenceLog, EvidenceRecord, GENESIS_HASH};
pub use object::{ChavaObject, ObjectRecord};
pub use path::{PathSyntax, ScopePath};
pub use types::{Fingerprint, Incarnation, ObjectId, Obligation, ObligationSet};
pub use validation::{validate_accounting, validate_object};
