//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use chava_core::{Obligation, ObligationSet};

/// Generate an obligation kind.
pub fn kind() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,11}".prop_map(String::from)
}

/// Generate a single path component.
pub fn component() -> impl Strategy<Value = String> {
    "[a-z]{1,6}".prop_map(String::from)
}

/// Generate a dotted scope of up to three components, or `""`.
pub fn scope() -> impl Strategy<Value = String> {
    prop::collection::vec(component(), 0..=3).prop_map(|parts| parts.join("."))
}

/// Generate a verifier id.
pub fn verifier_id() -> impl Strategy<Value = String> {
    "[a-z]{1,8}_v[0-9]".prop_map(String::from)
}

/// Generate an obligation.
pub fn obligation() -> impl Strategy<Value = Obligation> {
    (kind(), scope()).prop_filter_map("invalid obligation", |(k, s)| Obligation::new(k, s).ok())
}

/// Generate an obligation set of at most `max_len` entries.
pub fn obligation_set(max_len: usize) -> impl Strategy<Value = ObligationSet> {
    prop::collection::vec(obligation(), 0..=max_len)
        .prop_map(|obligations| obligations.into_iter().collect())
}

/// Generate a JSON value, nested up to a few levels.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(component(), inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate a JSON object, so that dotted scopes can address into it.
pub fn json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(component(), json_value(), 0..5)
        .prop_map(|fields| Value::Object(fields.into_iter().collect()))
}
