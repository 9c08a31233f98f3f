//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::path::Path;

use chava::{Chava, ChavaConfig, ChavaObject, ObligationRegistry, ObligationSet};
use chava_crypto::{LocalKeyManager, MasterSecret};
use chava_store::{MemoryStore, SqliteStore, Store};
use serde_json::Value;

/// Secret used by every fixture unless a test asks for another.
pub const TEST_SECRET: [u8; 32] = [7u8; 32];

/// Key manager over [`TEST_SECRET`].
pub fn test_keys() -> LocalKeyManager {
    LocalKeyManager::new(MasterSecret::from_bytes(TEST_SECRET))
}

/// Build an obligation set from literal pairs. Panics on invalid input.
pub fn obligations(pairs: &[(&str, &str)]) -> ObligationSet {
    ObligationSet::from_pairs(pairs.iter().copied()).expect("invalid obligation pairs")
}

/// A kernel over an in-memory store with the reference verifiers.
pub struct TestFixture<S: Store = MemoryStore> {
    pub chava: Chava<S>,
}

impl TestFixture<MemoryStore> {
    /// Memory store, reference registry, default config.
    pub fn new() -> Self {
        Self::with_registry(reference_registry())
    }

    pub fn with_registry(registry: ObligationRegistry) -> Self {
        Self::with_config(registry, ChavaConfig::default())
    }

    pub fn with_config(registry: ObligationRegistry, config: ChavaConfig) -> Self {
        Self {
            chava: Chava::new(MemoryStore::new(), test_keys(), registry, config),
        }
    }
}

impl TestFixture<SqliteStore> {
    /// SQLite store at `path` with the reference registry.
    pub fn sqlite(path: impl AsRef<Path>) -> chava::Result<Self> {
        let store = SqliteStore::open(path)?;
        Ok(Self {
            chava: Chava::new(store, test_keys(), reference_registry(), ChavaConfig::default()),
        })
    }
}

impl<S: Store + 'static> TestFixture<S> {
    /// Create an object (not stored).
    pub fn create(&self, value: &Value, pairs: &[(&str, &str)]) -> ChavaObject {
        self.chava
            .create(value, obligations(pairs))
            .expect("create failed")
    }

    /// Create and store an object, returning the persisted copy.
    pub async fn create_stored(&self, value: &Value, pairs: &[(&str, &str)]) -> ChavaObject {
        let object = self.create(value, pairs);
        self.chava.store(&object).await.expect("store failed")
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

fn reference_registry() -> ObligationRegistry {
    crate::verifiers::reference_registry().expect("reference patterns compile")
}
