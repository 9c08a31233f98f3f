//! Property tests over generated obligation sets and values.

use chava::engine;
use chava::{ObjectId, ObligationRegistry, Verdict};
use chava_testkit::generators::{json_object, obligation_set, verifier_id};
use chava_testkit::test_keys;
use proptest::prelude::*;
use serde_json::Value;

fn accept_all(kinds: impl IntoIterator<Item = String>) -> ObligationRegistry {
    kinds
        .into_iter()
        .fold(ObligationRegistry::new(), |registry, kind| {
            registry.with(kind, |_: &Value, _: &str| Verdict::pass())
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn discharging_everything_unlocks(
        value in json_object(),
        obligations in obligation_set(5),
        verifier in verifier_id(),
        reverse in any::<bool>(),
    ) {
        let keys = test_keys();
        let registry = accept_all(obligations.iter().map(|o| o.kind.clone()));
        let object = engine::create(&keys, ObjectId::random(), &value, obligations.clone()).unwrap();

        let mut order = obligations.to_vec();
        if reverse {
            order.reverse();
        }

        let mut current = object;
        for o in &order {
            prop_assert!(engine::unwrap(&keys, &current).is_err());
            current = engine::discharge(&keys, &registry, &current, &o.kind, &o.scope, &verifier).unwrap();
        }

        prop_assert_eq!(current.version(), order.len() as u64);
        prop_assert_eq!(current.evidence().len(), order.len());
        prop_assert!(current.evidence().verify_chain().is_ok());
        prop_assert_eq!(engine::unwrap(&keys, &current).unwrap(), value);
    }

    #[test]
    fn projection_at_root_keeps_every_obligation(
        value in json_object(),
        obligations in obligation_set(5),
    ) {
        let keys = test_keys();
        let object = engine::create(&keys, ObjectId::random(), &value, obligations.clone()).unwrap();

        let projected = engine::project(&keys, &object, "").unwrap();
        prop_assert_eq!(projected.obligations(), &obligations);
        prop_assert_ne!(projected.id(), object.id());
    }
}
