//! # Chava Crypto
//!
//! Obligation-derived keys and the sealed-value envelope.
//!
//! ## Encryption Model
//!
//! A value is encrypted under a key derived from the master secret and the
//! fingerprint of the obligations it still owes:
//!
//! 1. **Fingerprint**: canonical bytes of the obligation set (see `chava-core`)
//! 2. **Obligation key**: `BLAKE3-keyed(secret, context || fingerprint)`
//! 3. **Envelope**: ChaCha20-Poly1305 over the plaintext; the object id,
//!    evidence tip and evidence parents are the associated data
//!
//! Removing one obligation changes the fingerprint and so the key. The value
//! can only be read under the empty set's "cleared" key once every
//! obligation has been discharged.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chava_core::{EvidenceLog, ObjectId, ObligationSet};
//! use chava_crypto::{open_for, seal_for, LocalKeyManager, MasterSecret};
//!
//! let keys = LocalKeyManager::new(MasterSecret::from_passphrase(b"hunter2"));
//! let id = ObjectId::random();
//! let obligations = ObligationSet::from_pairs([("sql_safe", "")]).unwrap();
//! let evidence = EvidenceLog::new();
//!
//! let sealed = seal_for(&keys, &id, &evidence, &obligations, b"SELECT 1;").unwrap();
//! let plain = open_for(&keys, &id, &evidence, &obligations, &sealed).unwrap();
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod keys;

pub use crypto::{EncryptionNonce, ObligationKey};
pub use envelope::{associated_data, open_for, seal_for, EncryptionFormat, SealedEnvelope};
pub use error::{CryptoError, Result};
pub use keys::{KeyManager, LocalKeyManager, MasterSecret};
