//! End-to-end behavior of the kernel over the in-memory store.

use chava::store::Store;
use chava::{ChavaError, Verdict};
use chava_testkit::{init_tracing, obligations, TestFixture};
use serde_json::{json, Value};

const QUERY: &str = "SELECT * FROM users WHERE id=1;";

#[test]
fn unwrap_refuses_outstanding_obligation() {
    let fixture = TestFixture::new();
    let object = fixture.create(&json!(QUERY), &[("sql_safe", "")]);

    let err = fixture.chava.unwrap(&object).unwrap_err();
    match &err {
        ChavaError::ObligationViolation { outstanding } => {
            assert_eq!(outstanding.len(), 1);
            assert_eq!(outstanding[0].to_string(), "sql_safe:");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.to_string(), "obligations outstanding: [sql_safe:]");
}

#[test]
fn discharge_then_unwrap_returns_value() {
    init_tracing();
    let fixture = TestFixture::new();
    let object = fixture.create(&json!(QUERY), &[("sql_safe", "")]);

    let cleared = fixture
        .chava
        .discharge(&object, "sql_safe", "", "verifier_v1")
        .unwrap();

    assert!(cleared.is_unlocked());
    assert_eq!(cleared.version(), object.version() + 1);
    assert_eq!(cleared.evidence().len(), 1);
    assert_eq!(cleared.evidence().records()[0].verifier_id, "verifier_v1");
    assert_ne!(cleared.ciphertext(), object.ciphertext());
    assert_eq!(fixture.chava.unwrap(&cleared).unwrap(), json!(QUERY));

    // The input version is untouched and still locked.
    assert!(object.is_locked());
    assert!(fixture.chava.unwrap(&object).is_err());
}

#[test]
fn rejected_value_leaves_object_unchanged() {
    let fixture = TestFixture::new();
    let object = fixture.create(&json!("DROP TABLE users;"), &[("sql_safe", "")]);

    let err = fixture
        .chava
        .discharge(&object, "sql_safe", "", "verifier_v1")
        .unwrap_err();
    assert!(matches!(
        err,
        ChavaError::VerificationFailure { ref kind, ref scope, .. } if kind == "sql_safe" && scope.is_empty()
    ));

    assert_eq!(object.obligations(), &obligations(&[("sql_safe", "")]));
    assert!(object.evidence().is_empty());
    assert_eq!(object.version(), 0);
}

#[test]
fn partial_discharge_reports_remaining() {
    let fixture = TestFixture::new();
    let object = fixture.create(
        &json!({"address": {"street": "1 Main St"}, "query": QUERY}),
        &[("pii_redacted", "address"), ("sql_safe", "query")],
    );

    let partial = fixture
        .chava
        .discharge(&object, "sql_safe", "query", "verifier_v1")
        .unwrap();

    match fixture.chava.unwrap(&partial).unwrap_err() {
        ChavaError::ObligationViolation { outstanding } => {
            let rendered: Vec<String> = outstanding.iter().map(ToString::to_string).collect();
            assert_eq!(rendered, vec!["pii_redacted:address"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn whole_value_scope_with_second_obligation() {
    let fixture = TestFixture::new();
    let object = fixture.create(&json!(QUERY), &[("pii_redacted", "address"), ("sql_safe", "")]);

    let partial = fixture
        .chava
        .discharge(&object, "sql_safe", "", "verifier_v1")
        .unwrap();

    let err = fixture.chava.unwrap(&partial).unwrap_err();
    assert_eq!(err.to_string(), "obligations outstanding: [pii_redacted:address]");
}

#[tokio::test]
async fn tampered_proof_fails_integrity_on_load() {
    init_tracing();
    let fixture = TestFixture::new();
    let object = fixture
        .create_stored(&json!(QUERY), &[("sql_safe", "")])
        .await;
    let cleared = fixture
        .chava
        .discharge_stored(object.id(), "sql_safe", "", "verifier_v1")
        .await
        .unwrap();
    assert!(fixture.chava.retrieve(cleared.id()).await.is_ok());

    let backend = fixture.chava.backend();
    let mut record = backend.get(cleared.id()).await.unwrap().unwrap();
    let mut proof = record.evidence[0].proof.to_vec();
    if proof.is_empty() {
        proof.push(0);
    }
    proof[0] ^= 0x01;
    record.evidence[0].proof = proof.into();
    backend.put(&record, Some(record.version)).await.unwrap();

    match fixture.chava.retrieve(cleared.id()).await.unwrap_err() {
        ChavaError::Integrity(e) => assert_eq!(e.position(), Some(0)),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn truncated_or_reparented_log_fails_to_open() {
    init_tracing();
    let fixture = TestFixture::new();
    let value = json!({"a": "quiet", "b": "calm"});
    let object = fixture
        .create_stored(&value, &[("pii_clean", "a"), ("pii_clean", "b")])
        .await;
    fixture
        .chava
        .discharge_stored(object.id(), "pii_clean", "a", "verifier_v1")
        .await
        .unwrap();
    let cleared = fixture
        .chava
        .discharge_stored(object.id(), "pii_clean", "b", "verifier_v1")
        .await
        .unwrap();
    assert_eq!(fixture.chava.unwrap(&cleared).unwrap(), value);

    let backend = fixture.chava.backend();
    let good = backend.get(cleared.id()).await.unwrap().unwrap();

    let mut dropped_last = good.clone();
    dropped_last.evidence.pop();
    let mut emptied = good.clone();
    emptied.evidence.clear();
    let mut reparented = good.clone();
    reparented.parents = vec![chava::Blake3Hash::hash(b"elsewhere")];

    for tampered in [dropped_last, emptied, reparented] {
        backend.put(&tampered, Some(good.version)).await.unwrap();

        // Each log is still a valid chain, so loading succeeds.
        let loaded = fixture.chava.retrieve(cleared.id()).await.unwrap();
        assert!(loaded.is_unlocked());
        assert!(matches!(fixture.chava.unwrap(&loaded), Err(ChavaError::Decryption)));
    }

    backend.put(&good, Some(good.version)).await.unwrap();
    let restored = fixture.chava.retrieve(cleared.id()).await.unwrap();
    assert_eq!(fixture.chava.unwrap(&restored).unwrap(), value);
}

#[test]
fn unknown_kind_and_missing_obligation() {
    let fixture = TestFixture::new();
    let object = fixture.create(&json!("x"), &[("lint_clean", ""), ("sql_safe", "")]);

    assert!(matches!(
        fixture.chava.discharge(&object, "lint_clean", "", "v"),
        Err(ChavaError::UnknownObligationKind(k)) if k == "lint_clean"
    ));
    assert!(matches!(
        fixture.chava.discharge(&object, "sql_safe", "nope", "v"),
        Err(ChavaError::ObligationNotFound { .. })
    ));
}

#[test]
fn projection_inherits_only_subtree_obligations() {
    let fixture = TestFixture::new();
    let object = fixture.create(
        &json!({
            "address": {"street": "1 Main St", "zip": "12345"},
            "addressing": "formal",
            "query": QUERY,
        }),
        &[
            ("pii_clean", "address.street"),
            ("schema_ok", "address"),
            ("pii_clean", "addressing"),
            ("sql_safe", "query"),
        ],
    );

    let projected = fixture.chava.project(&object, "address").unwrap();

    assert_ne!(projected.id(), object.id());
    assert_eq!(
        projected.obligations(),
        &obligations(&[("pii_clean", "street"), ("schema_ok", "")])
    );
    assert!(projected.evidence().is_empty());
    assert_eq!(projected.evidence().parents(), &[object.evidence().tip()]);

    // Discharging the projection leaves the source alone.
    let projected = fixture
        .chava
        .discharge(&projected, "pii_clean", "street", "v1")
        .unwrap();
    assert_eq!(object.obligations().len(), 4);
    assert_eq!(projected.obligations().len(), 1);

    assert!(matches!(
        fixture.chava.project(&object, "phone"),
        Err(ChavaError::PathNotFound(p)) if p == "phone"
    ));
}

#[test]
fn merge_requires_both_sides() {
    let fixture = TestFixture::new();
    let a = fixture.create(&json!(QUERY), &[("sql_safe", "")]);
    let b = fixture.create(&json!({"id": 3, "name": "n"}), &[("schema_ok", "")]);

    let merged = fixture.chava.merge(&a, &b).unwrap();
    assert_eq!(
        merged.obligations(),
        &obligations(&[("sql_safe", "0"), ("schema_ok", "1")])
    );

    let merged = fixture
        .chava
        .discharge(&merged, "sql_safe", "0", "v1")
        .unwrap();
    assert!(fixture.chava.unwrap(&merged).is_err());

    let merged = fixture
        .chava
        .discharge(&merged, "schema_ok", "1", "v1")
        .unwrap();
    assert_eq!(
        fixture.chava.unwrap(&merged).unwrap(),
        Value::Array(vec![json!(QUERY), json!({"id": 3, "name": "n"})])
    );
}

#[test]
fn custom_verifier_receives_scoped_view() {
    let registry = chava::ObligationRegistry::new().with("positive", |v: &Value, scope: &str| {
        assert_eq!(scope, "/totals/net");
        match v.as_i64() {
            Some(n) if n > 0 => Verdict::pass(),
            _ => Verdict::fail("not positive"),
        }
    });
    let fixture = TestFixture::with_registry(registry);
    let object = fixture.create(&json!({"totals": {"net": 5}}), &[("positive", "/totals/net")]);

    let cleared = fixture
        .chava
        .discharge(&object, "positive", "/totals/net", "v1")
        .unwrap();
    assert!(cleared.is_unlocked());
}
