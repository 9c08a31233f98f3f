//! Persistence, indexes and queries against SQLite.

use chava::engine;
use chava::store::Store;
use chava::{ChavaError, ObjectId};
use chava_testkit::{init_tracing, obligations, test_keys, TestFixture};
use serde_json::json;
use tempfile::TempDir;

fn sqlite_fixture(dir: &TempDir) -> TestFixture<chava::store::SqliteStore> {
    TestFixture::sqlite(dir.path().join("chava.db")).unwrap()
}

#[tokio::test]
async fn objects_survive_reopen() -> anyhow::Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let path = dir.path().join("chava.db");

    let id = {
        let fixture = TestFixture::sqlite(&path)?;
        let object = fixture
            .create_stored(&json!({"id": 1, "name": "kept"}), &[("schema_ok", "")])
            .await;
        let cleared = fixture
            .chava
            .discharge_stored(object.id(), "schema_ok", "", "v1")
            .await?;
        assert_eq!(cleared.version(), 1);
        cleared.id().clone()
    };

    let fixture = TestFixture::sqlite(&path)?;
    let loaded = fixture.chava.retrieve(&id).await?;
    assert_eq!(loaded.version(), 1);
    assert_eq!(loaded.base_version(), Some(1));
    assert_eq!(fixture.chava.unwrap(&loaded)?, json!({"id": 1, "name": "kept"}));
    assert_eq!(fixture.chava.list().await?, vec![id]);
    Ok(())
}

#[tokio::test]
async fn kind_indexes_track_outstanding_obligations() {
    let dir = TempDir::new().unwrap();
    let fixture = sqlite_fixture(&dir);

    let a = fixture
        .create_stored(
            &json!({"address": "1 Main St", "query": "SELECT 1;"}),
            &[("pii_clean", "address"), ("sql_safe", "query")],
        )
        .await;
    let b = fixture
        .create_stored(&json!("SELECT 2;"), &[("sql_safe", "")])
        .await;

    let mut expected = vec![a.id().clone(), b.id().clone()];
    expected.sort();
    assert_eq!(fixture.chava.query_by_kind("sql_safe").await.unwrap(), expected);
    assert_eq!(
        fixture
            .chava
            .query_by_kind_scope("pii_clean", "address")
            .await
            .unwrap(),
        vec![a.id().clone()]
    );

    fixture
        .chava
        .discharge_stored(a.id(), "sql_safe", "query", "v1")
        .await
        .unwrap();

    assert_eq!(
        fixture.chava.query_by_kind("sql_safe").await.unwrap(),
        vec![b.id().clone()]
    );
    assert!(fixture
        .chava
        .query_by_kind_scope("sql_safe", "query")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn verifier_queries_and_time_range() {
    let dir = TempDir::new().unwrap();
    let fixture = sqlite_fixture(&dir);
    let registry = chava_testkit::reference_registry().unwrap();
    let keys = test_keys();

    let object = fixture
        .create_stored(
            &json!({"bio": "quiet", "query": "SELECT 1;"}),
            &[("pii_clean", "bio"), ("sql_safe", "query")],
        )
        .await;

    let step = engine::discharge_at(&keys, &registry, &object, "pii_clean", "bio", "auditor", 1_000)
        .unwrap();
    let step = fixture.chava.store(&step).await.unwrap();
    let step = engine::discharge_at(&keys, &registry, &step, "sql_safe", "query", "auditor", 2_000)
        .unwrap();
    fixture.chava.store(&step).await.unwrap();

    let refs = fixture.chava.query_by_verifier("auditor").await.unwrap();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].position, 0);
    assert_eq!(refs[0].kind, "pii_clean");
    assert_eq!(refs[1].timestamp, 2_000);
    assert_eq!(refs[1].record_hash, step.evidence().tip());

    let early = fixture
        .chava
        .query_by_verifier_between("auditor", 0, 1_500)
        .await
        .unwrap();
    assert_eq!(early.len(), 1);
    assert_eq!(early[0].scope, "bio");

    assert!(fixture
        .chava
        .query_by_verifier("someone_else")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn delete_checks_version() {
    let dir = TempDir::new().unwrap();
    let fixture = sqlite_fixture(&dir);
    let object = fixture
        .create_stored(&json!("SELECT 1;"), &[("sql_safe", "")])
        .await;
    let cleared = fixture
        .chava
        .discharge_stored(object.id(), "sql_safe", "", "v1")
        .await
        .unwrap();

    // The version 0 copy is stale now.
    assert!(matches!(
        fixture.chava.delete(&object).await,
        Err(ChavaError::StorageConflict { current: Some(1), .. })
    ));

    fixture.chava.delete(&cleared).await.unwrap();
    assert!(matches!(
        fixture.chava.retrieve(object.id()).await,
        Err(ChavaError::NotFound(_))
    ));
    assert!(fixture.chava.query_by_verifier("v1").await.unwrap().is_empty());
    assert!(matches!(
        fixture.chava.delete(&cleared).await,
        Err(ChavaError::NotFound(_))
    ));

    let unsaved = fixture.create(&json!("SELECT 2;"), &[("sql_safe", "")]);
    assert!(matches!(
        fixture.chava.delete(&unsaved).await,
        Err(ChavaError::NotFound(_))
    ));
}

#[tokio::test]
async fn filter_cleared_keeps_unlocked_only() {
    let dir = TempDir::new().unwrap();
    let fixture = sqlite_fixture(&dir);

    let locked = fixture
        .create_stored(&json!("SELECT 1;"), &[("sql_safe", "")])
        .await;
    let open = fixture.create_stored(&json!("plain"), &[]).await;
    let cleared = fixture
        .create_stored(&json!("SELECT 2;"), &[("sql_safe", "")])
        .await;
    fixture
        .chava
        .discharge_stored(cleared.id(), "sql_safe", "", "v1")
        .await
        .unwrap();

    let ids = vec![locked.id().clone(), open.id().clone(), cleared.id().clone()];
    let result = fixture.chava.filter_cleared(&ids).await.unwrap();
    assert_eq!(result, vec![open.id().clone(), cleared.id().clone()]);

    let missing = ObjectId::new("gone").unwrap();
    assert!(fixture.chava.filter_cleared(&[missing]).await.is_err());
}

#[tokio::test]
async fn ciphertext_bound_to_its_id() {
    let dir = TempDir::new().unwrap();
    let fixture = sqlite_fixture(&dir);
    let a = fixture.create_stored(&json!("first"), &[]).await;
    let b = fixture.create_stored(&json!("second"), &[]).await;

    // Move a's ciphertext into b's record.
    let backend = fixture.chava.backend();
    let donor = backend.get(a.id()).await.unwrap().unwrap();
    let mut record = backend.get(b.id()).await.unwrap().unwrap();
    record.ciphertext = donor.ciphertext;
    backend.put(&record, Some(record.version)).await.unwrap();

    let moved = fixture.chava.retrieve(b.id()).await.unwrap();
    assert!(matches!(fixture.chava.unwrap(&moved), Err(ChavaError::Decryption)));
    assert_eq!(obligations(&[]), moved.obligations().clone());
}
