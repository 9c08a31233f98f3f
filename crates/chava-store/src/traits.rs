//! Store trait: the abstract interface for object persistence.
//!
//! This trait allows the kernel to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use chava_core::{Blake3Hash, EvidenceRecord, Incarnation, ObjectId, ObjectRecord};

use crate::error::{Result, StoreError};

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// The write was applied.
    Written,
    /// The persisted version no longer matches the caller's expectation.
    Conflict {
        /// The version currently persisted (`None` if the object is absent).
        current: Option<u64>,
    },
}

/// A pointer into one object's evidence log, as kept by the verifier index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceRef {
    pub object_id: ObjectId,
    /// Position of the record in the object's log.
    pub position: usize,
    pub kind: String,
    pub scope: String,
    pub verifier_id: String,
    pub timestamp: i64,
    pub record_hash: Blake3Hash,
}

impl EvidenceRef {
    pub fn new(object_id: ObjectId, position: usize, record: &EvidenceRecord) -> Self {
        Self {
            object_id,
            position,
            kind: record.kind.clone(),
            scope: record.scope.clone(),
            verifier_id: record.verifier_id.clone(),
            timestamp: record.timestamp,
            record_hash: record.record_hash,
        }
    }
}

/// The Store trait: async interface for object persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Compare-and-swap**: `put` and `delete` apply only if the persisted
///   `(incarnation, version)` equals the caller's. There is no blind
///   overwrite, and a version number from before a delete never matches
///   the object re-created in its place.
/// - **Atomic indexes**: index rows are replaced in the same step as the
///   object, so they never point at a version that isn't stored.
/// - **Outstanding obligations only**: the kind indexes list objects that
///   still owe an obligation; the verifier index lists evidence records.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Object Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Write an object version and refresh its index entries.
    ///
    /// `expected` is the version the caller read (`None` for a new object,
    /// which must not already exist). An update also requires the stored
    /// incarnation to equal `record.incarnation`.
    async fn put(&self, record: &ObjectRecord, expected: Option<u64>) -> Result<WriteResult>;

    /// Get the current version of an object.
    async fn get(&self, id: &ObjectId) -> Result<Option<ObjectRecord>>;

    /// Remove an object and its index entries if it is still at
    /// `(incarnation, expected)`.
    async fn delete(
        &self,
        id: &ObjectId,
        incarnation: Incarnation,
        expected: u64,
    ) -> Result<WriteResult>;

    /// Check if an object exists.
    async fn contains(&self, id: &ObjectId) -> Result<bool>;

    /// All stored object ids, sorted.
    async fn list_ids(&self) -> Result<Vec<ObjectId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Index Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Objects with an outstanding obligation of `kind`, sorted by id.
    async fn query_by_kind(&self, kind: &str) -> Result<Vec<ObjectId>>;

    /// Objects with the outstanding obligation `(kind, scope)`, sorted by id.
    async fn query_by_kind_scope(&self, kind: &str, scope: &str) -> Result<Vec<ObjectId>>;

    /// Evidence produced by `verifier_id`, ordered by
    /// `(timestamp, object_id, position)`.
    async fn query_by_verifier(&self, verifier_id: &str) -> Result<Vec<EvidenceRef>>;

    /// Like [`Store::query_by_verifier`], restricted to `start <= timestamp <= end`.
    async fn query_by_verifier_between(
        &self,
        verifier_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<EvidenceRef>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Get an object, failing with [`StoreError::NotFound`] if it's absent.
    fn get_required(
        &self,
        id: &ObjectId,
    ) -> impl std::future::Future<Output = Result<ObjectRecord>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn get_required(&self, id: &ObjectId) -> Result<ObjectRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// Sort evidence refs into index order.
pub(crate) fn sort_refs(refs: &mut [EvidenceRef]) {
    refs.sort_by(|a, b| {
        (a.timestamp, &a.object_id, a.position).cmp(&(b.timestamp, &b.object_id, b.position))
    });
}
