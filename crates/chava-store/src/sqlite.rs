//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Chava. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.
//!
//! Every `put` and `delete` runs in one transaction: the version check, the
//! object row, and both index tables commit together or not at all.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use chava_core::{Blake3Hash, Incarnation, ObjectId, ObjectRecord};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{EvidenceRef, Store, WriteResult};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

/// The stored `(incarnation, version)` of `id`, if present.
fn current_token(tx: &Transaction<'_>, id: &str) -> Result<Option<(Incarnation, u64)>> {
    let row: Option<(Vec<u8>, i64)> = tx
        .query_row(
            "SELECT incarnation, version FROM objects WHERE object_id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(bytes, version)| -> Result<(Incarnation, u64)> {
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| StoreError::InvalidData(format!("bad incarnation for {}", id)))?;
        Ok((Incarnation::from_bytes(bytes), version as u64))
    })
    .transpose()
}

fn clear_indexes(tx: &Transaction<'_>, id: &str) -> Result<()> {
    tx.execute("DELETE FROM obligation_index WHERE object_id = ?1", params![id])?;
    tx.execute("DELETE FROM evidence_index WHERE object_id = ?1", params![id])?;
    Ok(())
}

fn write_indexes(tx: &Transaction<'_>, record: &ObjectRecord) -> Result<()> {
    let id = record.id.as_str();

    let mut stmt = tx.prepare_cached(
        "INSERT INTO obligation_index (object_id, kind, scope) VALUES (?1, ?2, ?3)",
    )?;
    for o in &record.obligations {
        stmt.execute(params![id, o.kind, o.scope])?;
    }

    let mut stmt = tx.prepare_cached(
        "INSERT INTO evidence_index (
            object_id, position, verifier_id, kind, scope, timestamp, record_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (position, r) in record.evidence.iter().enumerate() {
        stmt.execute(params![
            id,
            position as i64,
            r.verifier_id,
            r.kind,
            r.scope,
            r.timestamp,
            r.record_hash.as_bytes().as_slice(),
        ])?;
    }

    Ok(())
}

fn row_to_evidence_ref(row: &rusqlite::Row<'_>) -> rusqlite::Result<EvidenceRef> {
    let object_id: String = row.get("object_id")?;
    let hash_bytes: Vec<u8> = row.get("record_hash")?;
    let hash: [u8; 32] = hash_bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(6, "record_hash".into(), rusqlite::types::Type::Blob)
    })?;
    let object_id = ObjectId::new(object_id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(EvidenceRef {
        object_id,
        position: row.get::<_, i64>("position")? as usize,
        kind: row.get("kind")?,
        scope: row.get("scope")?,
        verifier_id: row.get("verifier_id")?,
        timestamp: row.get("timestamp")?,
        record_hash: Blake3Hash::from_bytes(hash),
    })
}

fn ids_from_rows(rows: Vec<String>) -> Result<Vec<ObjectId>> {
    rows.into_iter()
        .map(|s| ObjectId::new(s).map_err(|e| StoreError::InvalidData(e.to_string())))
        .collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn put(&self, record: &ObjectRecord, expected: Option<u64>) -> Result<WriteResult> {
        let record = record.clone();
        let encoded = record.to_cbor()?;

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let id = record.id.as_str();

            let stored = current_token(&tx, id)?;
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

            tx.execute(
                "INSERT INTO objects (object_id, incarnation, version, record, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(object_id) DO UPDATE SET
                    incarnation = excluded.incarnation,
                    version = excluded.version,
                    record = excluded.record,
                    updated_at = excluded.updated_at",
                params![
                    id,
                    record.incarnation.as_bytes().as_slice(),
                    record.version as i64,
                    encoded,
                    crate::now_millis()
                ],
            )?;
            clear_indexes(&tx, id)?;
            write_indexes(&tx, &record)?;

            tx.commit()?;
            Ok(WriteResult::Written)
        })
        .await
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<ObjectRecord>> {
        let id = id.clone();

        let bytes: Option<Vec<u8>> = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT record FROM objects WHERE object_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        bytes
            .map(|b| ObjectRecord::from_cbor(&b).map_err(StoreError::from))
            .transpose()
    }

    async fn delete(
        &self,
        id: &ObjectId,
        incarnation: Incarnation,
        expected: u64,
    ) -> Result<WriteResult> {
        let id = id.clone();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let stored = current_token(&tx, id.as_str())?;
            if stored != Some((incarnation, expected)) {
                return Ok(WriteResult::Conflict {
                    current: stored.map(|(_, v)| v),
                });
            }

            tx.execute("DELETE FROM objects WHERE object_id = ?1", params![id.as_str()])?;
            clear_indexes(&tx, id.as_str())?;

            tx.commit()?;
            Ok(WriteResult::Written)
        })
        .await
    }

    async fn contains(&self, id: &ObjectId) -> Result<bool> {
        let id = id.clone();

        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM objects WHERE object_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn list_ids(&self) -> Result<Vec<ObjectId>> {
        let rows = self
            .run(|conn| {
                let mut stmt = conn.prepare("SELECT object_id FROM objects ORDER BY object_id")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await?;
        ids_from_rows(rows)
    }

    async fn query_by_kind(&self, kind: &str) -> Result<Vec<ObjectId>> {
        let kind = kind.to_string();

        let rows = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT object_id FROM obligation_index
                     WHERE kind = ?1 ORDER BY object_id",
                )?;
                let rows = stmt
                    .query_map(params![kind], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await?;
        ids_from_rows(rows)
    }

    async fn query_by_kind_scope(&self, kind: &str, scope: &str) -> Result<Vec<ObjectId>> {
        let kind = kind.to_string();
        let scope = scope.to_string();

        let rows = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT object_id FROM obligation_index
                     WHERE kind = ?1 AND scope = ?2 ORDER BY object_id",
                )?;
                let rows = stmt
                    .query_map(params![kind, scope], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await?;
        ids_from_rows(rows)
    }

    async fn query_by_verifier(&self, verifier_id: &str) -> Result<Vec<EvidenceRef>> {
        self.query_by_verifier_between(verifier_id, i64::MIN, i64::MAX)
            .await
    }

    async fn query_by_verifier_between(
        &self,
        verifier_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<EvidenceRef>> {
        let verifier_id = verifier_id.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT object_id, position, verifier_id, kind, scope, timestamp, record_hash
                 FROM evidence_index
                 WHERE verifier_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp, object_id, position",
            )?;
            let refs = stmt
                .query_map(params![verifier_id, start, end], row_to_evidence_ref)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(refs)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, record_with_evidence};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = record_with_evidence("a", &[("pii_clean", "comment")], &[("sql_safe", "", "v1", 5)], 1);

        assert_eq!(store.put(&rec, None).await.unwrap(), WriteResult::Written);
        assert_eq!(store.get(&rec.id).await.unwrap(), Some(rec));
        assert!(store.get(&ObjectId::new("missing").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = SqliteStore::open_memory().unwrap();
        store.put(&record("a", &[("k", "")], 0), None).await.unwrap();

        assert_eq!(
            store.put(&record("a", &[], 1), Some(0)).await.unwrap(),
            WriteResult::Written
        );
        assert_eq!(
            store.put(&record("a", &[], 1), Some(0)).await.unwrap(),
            WriteResult::Conflict { current: Some(1) }
        );
        assert_eq!(
            store.put(&record("b", &[], 1), Some(0)).await.unwrap(),
            WriteResult::Conflict { current: None }
        );
    }

    #[tokio::test]
    async fn test_recreated_id_rejects_old_lineage() {
        let store = SqliteStore::open_memory().unwrap();
        let old = record("a", &[("k", "")], 0);
        store.put(&old, None).await.unwrap();
        store.delete(&old.id, old.incarnation, 0).await.unwrap();

        let mut fresh = record("a", &[("fresh", "")], 0);
        fresh.incarnation = Incarnation::random();
        store.put(&fresh, None).await.unwrap();

        // Same version number, different lineage.
        let stale = record("a", &[], 1);
        assert_eq!(
            store.put(&stale, Some(0)).await.unwrap(),
            WriteResult::Conflict { current: Some(0) }
        );
        assert_eq!(
            store.delete(&old.id, old.incarnation, 0).await.unwrap(),
            WriteResult::Conflict { current: Some(0) }
        );
        assert_eq!(store.get(&fresh.id).await.unwrap(), Some(fresh.clone()));
        assert_eq!(store.query_by_kind("fresh").await.unwrap(), vec![fresh.id.clone()]);
        assert!(store.query_by_kind("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_puts_one_winner() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        store.put(&record("a", &[("k", "")], 0), None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(&record("a", &[], 1), Some(0)).await.unwrap()
            }));
        }

        let mut written = 0;
        for handle in handles {
            if handle.await.unwrap() == WriteResult::Written {
                written += 1;
            }
        }
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_indexes_replaced_on_update() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .put(&record("a", &[("sql_safe", ""), ("pii_clean", "comment")], 0), None)
            .await
            .unwrap();
        store.put(&record("b", &[("sql_safe", "")], 0), None).await.unwrap();

        let a = ObjectId::new("a").unwrap();
        let b = ObjectId::new("b").unwrap();
        assert_eq!(store.query_by_kind("sql_safe").await.unwrap(), vec![a.clone(), b.clone()]);

        let next = record_with_evidence("a", &[("pii_clean", "comment")], &[("sql_safe", "", "v1", 10)], 1);
        store.put(&next, Some(0)).await.unwrap();

        assert_eq!(store.query_by_kind("sql_safe").await.unwrap(), vec![b]);
        assert_eq!(
            store.query_by_kind_scope("pii_clean", "comment").await.unwrap(),
            vec![a.clone()]
        );
        let refs = store.query_by_verifier("v1").await.unwrap();
        assert_eq!(refs, vec![EvidenceRef::new(a, 0, &next.evidence[0])]);
    }

    #[tokio::test]
    async fn test_verifier_time_range() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = record_with_evidence(
            "a",
            &[],
            &[("k1", "", "v1", 100), ("k2", "", "v1", 200), ("k3", "", "v1", 300)],
            3,
        );
        store.put(&rec, None).await.unwrap();

        let kinds: Vec<String> = store
            .query_by_verifier_between("v1", 100, 200)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.kind)
            .collect();
        assert_eq!(kinds, vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_delete_clears_indexes() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = record_with_evidence("a", &[("k", "")], &[("j", "", "v1", 1)], 1);
        store.put(&rec, None).await.unwrap();

        assert_eq!(
            store.delete(&rec.id, rec.incarnation, 0).await.unwrap(),
            WriteResult::Conflict { current: Some(1) }
        );
        assert_eq!(
            store.delete(&rec.id, rec.incarnation, 1).await.unwrap(),
            WriteResult::Written
        );
        assert!(!store.contains(&rec.id).await.unwrap());
        assert!(store.query_by_kind("k").await.unwrap().is_empty());
        assert!(store.query_by_verifier("v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chava.db");
        let rec = record("a", &[("sql_safe", "")], 0);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(&rec, None).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get(&rec.id).await.unwrap(), Some(rec));
        assert_eq!(store.list_ids().await.unwrap(), vec![ObjectId::new("a").unwrap()]);
    }
}
