//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, crate::now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated store schema");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: objects plus obligation and evidence indexes.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Current version of every object
        CREATE TABLE objects (
            object_id TEXT PRIMARY KEY,
            incarnation BLOB NOT NULL,        -- 16 bytes, fresh per create
            version INTEGER NOT NULL,         -- with incarnation, the concurrency token
            record BLOB NOT NULL,             -- CBOR ObjectRecord
            updated_at INTEGER NOT NULL       -- local time of last write (Unix ms)
        );

        -- Outstanding obligations
        CREATE TABLE obligation_index (
            object_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            scope TEXT NOT NULL,
            PRIMARY KEY (object_id, kind, scope)
        );

        -- Evidence records by verifier
        CREATE TABLE evidence_index (
            object_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            verifier_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            scope TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            record_hash BLOB NOT NULL,        -- 32 bytes
            PRIMARY KEY (object_id, position)
        );

        CREATE INDEX idx_obligation_kind_scope ON obligation_index(kind, scope);
        CREATE INDEX idx_evidence_verifier_time ON evidence_index(verifier_id, timestamp);
        "#,
    )?;

    Ok(())
}
