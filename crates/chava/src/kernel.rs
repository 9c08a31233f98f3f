//! The Chava kernel: engine, key manager, registry and store in one API.
//!
//! Transitions (`create`, `discharge`, `unwrap`, `project`, `merge`) are
//! pure and never touch storage. Persistence is explicit through `store`
//! and `retrieve`; the `*_stored` and batch operations combine the two and
//! retry on storage conflicts.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use chava_core::{validate_object, ChavaObject, ObjectId, ObligationSet};
use chava_crypto::KeyManager;
use chava_store::{EvidenceRef, Store, StoreExt, WriteResult};

use crate::config::ChavaConfig;
use crate::engine;
use crate::error::{ChavaError, Result};
use crate::registry::ObligationRegistry;

/// One entry of a batch discharge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DischargeItem {
    pub id: ObjectId,
    pub kind: String,
    pub scope: String,
    pub verifier_id: String,
}

impl DischargeItem {
    pub fn new(
        id: ObjectId,
        kind: impl Into<String>,
        scope: impl Into<String>,
        verifier_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind: kind.into(),
            scope: scope.into(),
            verifier_id: verifier_id.into(),
        }
    }
}

/// The main Chava struct.
///
/// Cheap to clone; clones share the store, key manager and registry.
pub struct Chava<S: Store> {
    store: Arc<S>,
    keys: Arc<dyn KeyManager>,
    registry: Arc<ObligationRegistry>,
    config: ChavaConfig,
}

impl<S: Store> Clone for Chava<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: Arc::clone(&self.keys),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<S: Store + 'static> Chava<S> {
    /// Create a new kernel instance.
    pub fn new(
        store: S,
        keys: impl KeyManager + 'static,
        registry: ObligationRegistry,
        config: ChavaConfig,
    ) -> Self {
        Self {
            store: Arc::new(store),
            keys: Arc::new(keys),
            registry: Arc::new(registry),
            config,
        }
    }

    /// The storage backend.
    pub fn backend(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &ObligationRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ChavaConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Object Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal `value` under a fresh random id.
    pub fn create(&self, value: &Value, obligations: ObligationSet) -> Result<ChavaObject> {
        self.create_with_id(ObjectId::random(), value, obligations)
    }

    /// Seal `value` under a caller-chosen id.
    pub fn create_with_id(
        &self,
        id: ObjectId,
        value: &Value,
        obligations: ObligationSet,
    ) -> Result<ChavaObject> {
        engine::create(self.keys.as_ref(), id, value, obligations)
    }

    /// Discharge one obligation in memory. The result still has to be stored.
    pub fn discharge(
        &self,
        object: &ChavaObject,
        kind: &str,
        scope: &str,
        verifier_id: &str,
    ) -> Result<ChavaObject> {
        engine::discharge(self.keys.as_ref(), &self.registry, object, kind, scope, verifier_id)
    }

    /// Read the plaintext of a fully discharged object.
    pub fn unwrap(&self, object: &ChavaObject) -> Result<Value> {
        engine::unwrap(self.keys.as_ref(), object)
    }

    /// Derive an independent object from the sub-value at `path`.
    pub fn project(&self, object: &ChavaObject, path: &str) -> Result<ChavaObject> {
        engine::project(self.keys.as_ref(), object, path)
    }

    /// Conjoin two objects into one owing both obligation sets.
    pub fn merge(&self, a: &ChavaObject, b: &ChavaObject) -> Result<ChavaObject> {
        engine::merge(self.keys.as_ref(), a, b)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Storage Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist `object`, provided the stored version is still the one it was
    /// derived from. Returns the object marked as persisted.
    pub async fn store(&self, object: &ChavaObject) -> Result<ChavaObject> {
        let record = object.to_record();
        let expected = object.base_version();

        match self.store.put(&record, expected).await? {
            WriteResult::Written => {
                tracing::debug!(
                    object_id = %object.id(),
                    version = object.version(),
                    "object stored"
                );
                Ok(object.clone().persisted())
            }
            WriteResult::Conflict { current } => {
                tracing::info!(
                    object_id = %object.id(),
                    expected = ?expected,
                    current = ?current,
                    "storage conflict"
                );
                Err(ChavaError::StorageConflict {
                    id: object.id().to_string(),
                    expected,
                    current,
                })
            }
        }
    }

    /// Load the current version of an object.
    ///
    /// With `verify_on_load`, the evidence chain and obligation accounting are
    /// checked and a failure is surfaced as [`ChavaError::Integrity`].
    pub async fn retrieve(&self, id: &ObjectId) -> Result<ChavaObject> {
        let record = self.store.get_required(id).await?;
        let object = ChavaObject::from_record(record)?.persisted();

        if self.config.verify_on_load {
            if let Err(e) = validate_object(&object) {
                tracing::warn!(object_id = %id, error = %e, "integrity check failed on load");
                return Err(e.into());
            }
        }
        Ok(object)
    }

    /// Delete the stored object `object` was loaded from, provided it is
    /// still that version of that incarnation.
    ///
    /// An object that was never stored has nothing to delete and yields
    /// [`ChavaError::NotFound`].
    pub async fn delete(&self, object: &ChavaObject) -> Result<()> {
        let id = object.id();
        let Some(expected) = object.base_version() else {
            return Err(ChavaError::NotFound(id.to_string()));
        };

        match self.store.delete(id, object.incarnation(), expected).await? {
            WriteResult::Written => {
                tracing::debug!(object_id = %id, version = expected, "object deleted");
                Ok(())
            }
            WriteResult::Conflict { current: None } => Err(ChavaError::NotFound(id.to_string())),
            WriteResult::Conflict { current } => Err(ChavaError::StorageConflict {
                id: id.to_string(),
                expected: Some(expected),
                current,
            }),
        }
    }

    /// Ids of every stored object.
    pub async fn list(&self) -> Result<Vec<ObjectId>> {
        Ok(self.store.list_ids().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Objects still owing an obligation of `kind`.
    pub async fn query_by_kind(&self, kind: &str) -> Result<Vec<ObjectId>> {
        Ok(self.store.query_by_kind(kind).await?)
    }

    /// Objects still owing `(kind, scope)`.
    pub async fn query_by_kind_scope(&self, kind: &str, scope: &str) -> Result<Vec<ObjectId>> {
        Ok(self.store.query_by_kind_scope(kind, scope).await?)
    }

    /// Evidence produced by `verifier_id`.
    pub async fn query_by_verifier(&self, verifier_id: &str) -> Result<Vec<EvidenceRef>> {
        Ok(self.store.query_by_verifier(verifier_id).await?)
    }

    /// Evidence produced by `verifier_id` with `start <= timestamp <= end`.
    pub async fn query_by_verifier_between(
        &self,
        verifier_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<EvidenceRef>> {
        Ok(self
            .store
            .query_by_verifier_between(verifier_id, start, end)
            .await?)
    }

    /// The subset of `ids` whose stored objects owe nothing.
    pub async fn filter_cleared(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        let mut objects = Vec::with_capacity(ids.len());
        for id in ids {
            objects.push(self.retrieve(id).await?);
        }
        Ok(engine::filter_cleared(&objects)
            .map(|o| o.id().clone())
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read-Modify-Write Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Retrieve, discharge, and store one obligation, re-reading and retrying
    /// on conflict up to `max_conflict_retries` times.
    pub async fn discharge_stored(
        &self,
        id: &ObjectId,
        kind: &str,
        scope: &str,
        verifier_id: &str,
    ) -> Result<ChavaObject> {
        self.update_with_retry(id, |object| self.discharge(object, kind, scope, verifier_id))
            .await
    }

    /// Discharge every outstanding obligation of `kind` on each stored object.
    ///
    /// Objects that owe nothing of that kind come back unchanged. Results are
    /// per object, in the order of `ids`.
    pub async fn discharge_kind(
        &self,
        ids: &[ObjectId],
        kind: &str,
        verifier_id: &str,
    ) -> Vec<Result<ChavaObject>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self
                .update_with_retry(id, |object| {
                    let scopes: Vec<String> = object
                        .obligations()
                        .iter()
                        .filter(|o| o.kind == kind)
                        .map(|o| o.scope.clone())
                        .collect();

                    let mut current = object.clone();
                    for scope in &scopes {
                        current = self.discharge(&current, kind, scope, verifier_id)?;
                    }
                    Ok(current)
                })
                .await;
            results.push(result);
        }
        results
    }

    /// Apply many discharges, reporting a result per item in input order.
    ///
    /// Items for different objects run in parallel, at most
    /// `batch_concurrency` objects at a time. Items for the same object run
    /// one after another in input order. One failure never aborts the rest.
    pub async fn discharge_batch(&self, items: Vec<DischargeItem>) -> Vec<Result<ChavaObject>> {
        let total = items.len();
        let mut groups: BTreeMap<ObjectId, Vec<(usize, DischargeItem)>> = BTreeMap::new();
        for (index, item) in items.into_iter().enumerate() {
            groups.entry(item.id.clone()).or_default().push((index, item));
        }

        let permits = Arc::new(Semaphore::new(self.config.batch_concurrency.max(1)));
        let mut handles = Vec::with_capacity(groups.len());
        for (_, group) in groups {
            let indices: Vec<usize> = group.iter().map(|(index, _)| *index).collect();
            let kernel = self.clone();
            let permits = Arc::clone(&permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let mut out = Vec::with_capacity(group.len());
                for (index, item) in group {
                    let result = kernel
                        .discharge_stored(&item.id, &item.kind, &item.scope, &item.verifier_id)
                        .await;
                    out.push((index, result));
                }
                out
            });
            handles.push((indices, handle));
        }

        let mut results: Vec<Option<Result<ChavaObject>>> = (0..total).map(|_| None).collect();
        for (indices, handle) in handles {
            match handle.await {
                Ok(out) => {
                    for (index, result) in out {
                        results[index] = Some(result);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "batch discharge task failed");
                    for index in indices {
                        results[index] = Some(Err(ChavaError::TaskFailed(e.to_string())));
                    }
                }
            }
        }

        let results: Vec<Result<ChavaObject>> = results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(ChavaError::TaskFailed("no result".into()))))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(items = total, failed, "batch discharge finished");
        results
    }

    async fn update_with_retry<F>(&self, id: &ObjectId, mut update: F) -> Result<ChavaObject>
    where
        F: FnMut(&ChavaObject) -> Result<ChavaObject>,
    {
        let mut attempt = 0u32;
        loop {
            let current = self.retrieve(id).await?;
            let next = update(&current)?;
            if next.version() == current.version() {
                return Ok(current);
            }

            match self.store(&next).await {
                Err(e) if e.is_conflict() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    tracing::debug!(object_id = %id, attempt, "retrying after conflict");
                }
                other => return other,
            }
        }
    }
}
