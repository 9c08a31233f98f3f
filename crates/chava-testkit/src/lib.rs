//! # Chava Testkit
//!
//! Testing utilities for Chava.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A kernel over a memory or SQLite store with a fixed secret
//! - **Generators**: Proptest strategies for obligations, scopes and values
//! - **Verifiers**: Reference `sql_safe`, `pii_clean` and `schema_ok` checks
//!
//! ## Test Fixtures
//!
//! ```rust
//! use chava_testkit::fixtures::TestFixture;
//! use serde_json::json;
//!
//! let fixture = TestFixture::new();
//! let object = fixture.create(&json!("SELECT 1;"), &[("sql_safe", "")]);
//! assert!(object.is_locked());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use chava_testkit::generators::obligation_set;
//!
//! proptest! {
//!     #[test]
//!     fn fingerprint_is_deterministic(set in obligation_set(5)) {
//!         prop_assert_eq!(set.fingerprint(), set.clone().fingerprint());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod verifiers;

pub use fixtures::{obligations, test_keys, TestFixture, TEST_SECRET};
pub use verifiers::{reference_registry, schema_ok, PiiClean, SqlSafe};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}
