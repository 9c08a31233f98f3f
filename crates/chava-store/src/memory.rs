//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use chava_core::{Incarnation, ObjectId, ObjectRecord};

use crate::error::{Result, StoreError};
use crate::traits::{sort_refs, EvidenceRef, Store, WriteResult};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; the
/// compare-and-swap and the index refresh happen under one write guard.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Current object versions indexed by id.
    objects: BTreeMap<ObjectId, ObjectRecord>,

    /// Obligation index: kind -> scope -> ids.
    obligations: HashMap<String, BTreeMap<String, BTreeSet<ObjectId>>>,

    /// Evidence index: verifier_id -> refs.
    evidence: HashMap<String, Vec<EvidenceRef>>,
}

impl MemoryStoreInner {
    fn index(&mut self, record: &ObjectRecord) {
        for o in &record.obligations {
            self.obligations
                .entry(o.kind.clone())
                .or_default()
                .entry(o.scope.clone())
                .or_default()
                .insert(record.id.clone());
        }
        for (position, r) in record.evidence.iter().enumerate() {
            self.evidence
                .entry(r.verifier_id.clone())
                .or_default()
                .push(EvidenceRef::new(record.id.clone(), position, r));
        }
    }

    fn unindex(&mut self, record: &ObjectRecord) {
        for o in &record.obligations {
            if let Some(scopes) = self.obligations.get_mut(&o.kind) {
                if let Some(ids) = scopes.get_mut(&o.scope) {
                    ids.remove(&record.id);
                    if ids.is_empty() {
                        scopes.remove(&o.scope);
                    }
                }
                if scopes.is_empty() {
                    self.obligations.remove(&o.kind);
                }
            }
        }
        for r in &record.evidence {
            if let Some(refs) = self.evidence.get_mut(&r.verifier_id) {
                refs.retain(|e| e.object_id != record.id);
                if refs.is_empty() {
                    self.evidence.remove(&r.verifier_id);
                }
            }
        }
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::InvalidData(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::InvalidData(format!("lock poisoned: {}", e)))
    }

    fn evidence_refs<F>(&self, verifier_id: &str, keep: F) -> Result<Vec<EvidenceRef>>
    where
        F: Fn(&EvidenceRef) -> bool,
    {
        let inner = self.read()?;
        let mut refs: Vec<EvidenceRef> = inner
            .evidence
            .get(verifier_id)
            .map(|refs| refs.iter().filter(|r| keep(r)).cloned().collect())
            .unwrap_or_default();
        sort_refs(&mut refs);
        Ok(refs)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, record: &ObjectRecord, expected: Option<u64>) -> Result<WriteResult> {
        let mut inner = self.write()?;

        let stored = inner.objects.get(&record.id).map(|r| (r.incarnation, r.version));
        let matches = match (stored, expected) {
            (None, None) => true,
            (Some(token), Some(version)) => token == (record.incarnation, version),
            _ => false,
        };
        if !matches {
            return Ok(WriteResult::Conflict {
                current: stored.map(|(_, v)| v),
            });
        }

        if let Some(old) = inner.objects.remove(&record.id) {
            inner.unindex(&old);
        }
        inner.index(record);
        inner.objects.insert(record.id.clone(), record.clone());

        Ok(WriteResult::Written)
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<ObjectRecord>> {
        let inner = self.read()?;
        Ok(inner.objects.get(id).cloned())
    }

    async fn delete(
        &self,
        id: &ObjectId,
        incarnation: Incarnation,
        expected: u64,
    ) -> Result<WriteResult> {
        let mut inner = self.write()?;

        let stored = inner.objects.get(id).map(|r| (r.incarnation, r.version));
        if stored != Some((incarnation, expected)) {
            return Ok(WriteResult::Conflict {
                current: stored.map(|(_, v)| v),
            });
        }

        if let Some(old) = inner.objects.remove(id) {
            inner.unindex(&old);
        }
        Ok(WriteResult::Written)
    }

    async fn contains(&self, id: &ObjectId) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.objects.contains_key(id))
    }

    async fn list_ids(&self) -> Result<Vec<ObjectId>> {
        let inner = self.read()?;
        Ok(inner.objects.keys().cloned().collect())
    }

    async fn query_by_kind(&self, kind: &str) -> Result<Vec<ObjectId>> {
        let inner = self.read()?;
        let ids: BTreeSet<ObjectId> = inner
            .obligations
            .get(kind)
            .map(|scopes| scopes.values().flatten().cloned().collect())
            .unwrap_or_default();
        Ok(ids.into_iter().collect())
    }

    async fn query_by_kind_scope(&self, kind: &str, scope: &str) -> Result<Vec<ObjectId>> {
        let inner = self.read()?;
        Ok(inner
            .obligations
            .get(kind)
            .and_then(|scopes| scopes.get(scope))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn query_by_verifier(&self, verifier_id: &str) -> Result<Vec<EvidenceRef>> {
        self.evidence_refs(verifier_id, |_| true)
    }

    async fn query_by_verifier_between(
        &self,
        verifier_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<EvidenceRef>> {
        self.evidence_refs(verifier_id, |r| r.timestamp >= start && r.timestamp <= end)
    }
}
