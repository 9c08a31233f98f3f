//! # Chava Store
//!
//! Storage abstraction for Chava. Provides a trait-based interface for
//! object persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store persists the current version of each object as an
//! [`ObjectRecord`](chava_core::ObjectRecord) keyed by id, together with
//! secondary indexes over outstanding obligations and evidence. Writes are
//! compare-and-swap on the object's incarnation and version number.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`WriteResult`] - Outcome of a conditional write
//! - [`EvidenceRef`] - Verifier index entry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chava_store::{SqliteStore, Store, WriteResult};
//!
//! async fn example() {
//!     let store = SqliteStore::open("chava.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     // let record: ObjectRecord = ...;
//!     // match store.put(&record, None).await.unwrap() {
//!     //     WriteResult::Written => {}
//!     //     WriteResult::Conflict { current } => { /* re-read and retry */ }
//!     // }
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{EvidenceRef, Store, StoreExt, WriteResult};

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
