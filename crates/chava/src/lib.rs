//! # Chava
//!
//! Values that stay encrypted until every verification they owe has passed.
//!
//! ## Overview
//!
//! A Chava object is a sealed value plus the obligations it still owes and
//! a hash-chained log of the ones already discharged:
//!
//! - **Obligation**: a `(kind, scope)` check, e.g. `("sql_safe", "")`
//! - **Discharge**: run the verifier for one obligation; on pass, drop it,
//!   append evidence, and re-encrypt under the key for the smaller set
//! - **Unwrap**: decrypt, allowed only once nothing is outstanding
//! - **Projection**: carve out a sub-value with the obligations scoped to it
//!
//! The encryption key is derived from the exact outstanding set, so skipping
//! the check in application code doesn't help: the plaintext can't be opened
//! until the set is empty.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chava::{Chava, ChavaConfig, ObligationRegistry, Verdict};
//! use chava::core::ObligationSet;
//! use chava::crypto::{LocalKeyManager, MasterSecret};
//! use chava::store::SqliteStore;
//! use serde_json::{json, Value};
//!
//! async fn example() -> chava::Result<()> {
//!     let registry = ObligationRegistry::new().with("sql_safe", |v: &Value, _: &str| {
//!         match v.as_str() {
//!             Some(s) if s.contains("DROP") => Verdict::fail("destructive"),
//!             _ => Verdict::pass(),
//!         }
//!     });
//!     let keys = LocalKeyManager::new(MasterSecret::from_passphrase(b"secret"));
//!     let store = SqliteStore::open("chava.db")?;
//!     let chava = Chava::new(store, keys, registry, ChavaConfig::default());
//!
//!     let obligations = ObligationSet::from_pairs([("sql_safe", "")])?;
//!     let object = chava.create(&json!("SELECT 1;"), obligations)?;
//!     let object = chava.store(&object).await?;
//!
//!     let cleared = chava.discharge_stored(object.id(), "sql_safe", "", "verifier_v1").await?;
//!     let value = chava.unwrap(&cleared)?;
//!     # let _ = value;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `chava::core` - Obligations, evidence, the object model
//! - `chava::crypto` - Key management and the sealed envelope
//! - `chava::store` - Storage abstraction and SQLite

pub mod config;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod registry;

// Re-export component crates
pub use chava_core as core;
pub use chava_crypto as crypto;
pub use chava_store as store;

// Re-export main types for convenience
pub use config::ChavaConfig;
pub use error::{ChavaError, Result};
pub use kernel::{Chava, DischargeItem};
pub use registry::{ObligationRegistry, Verdict, Verifier};

// Re-export commonly used core types
pub use chava_core::{
    Blake3Hash, ChavaObject, EvidenceLog, EvidenceRecord, Incarnation, ObjectId, Obligation,
    ObligationSet,
};
pub use chava_store::EvidenceRef;
