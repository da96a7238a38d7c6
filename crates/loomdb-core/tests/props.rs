//! Property suite: hash stability, matcher reorder invariance, and merge
//! idempotence.

use loomdb_core::{
    bindings::Bindings,
    pattern::{Pattern, PatternKey, match_pattern, optimize, var},
    store::Store,
    value::{Value, hash_value},
};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::Uint),
        "[a-z]{0,8}".prop_map(Value::Text),
    ]
}

fn value_tree() -> impl Strategy<Value = Value> {
    scalar_value().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn flat_entity() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-c]", scalar_value(), 1..4)
}

proptest! {
    #[test]
    fn hash_is_stable_and_structural(value in value_tree()) {
        let a = hash_value(&value).expect("hash");
        let b = hash_value(&value.clone()).expect("hash clone");
        prop_assert_eq!(a, b);
    }

    #[test]
    fn distinct_scalars_hash_apart(a in scalar_value(), b in scalar_value()) {
        let ha = hash_value(&a).expect("hash");
        let hb = hash_value(&b).expect("hash");
        prop_assert_eq!(a == b, ha == hb);
    }

    #[test]
    fn key_reordering_never_changes_bindings(entity in flat_entity()) {
        // For every key: a binding variable entry plus a constraining scalar
        // entry, authored in map order. The optimizer will re-sort them; the
        // produced bindings must not change.
        let mut entries: Vec<(PatternKey, Pattern)> = Vec::new();
        for (key, value) in &entity {
            entries.push((PatternKey::Literal(key.clone()), var(key)));
            entries.push((PatternKey::Literal(key.clone()), Pattern::Scalar(value.clone())));
        }
        entries.push((PatternKey::Literal("zz".to_string()), Pattern::Null));

        let pattern = Pattern::Object(entries);
        let value = Value::Map(entity);
        let unit = Bindings::unit().expect("unit");

        let plain = match_pattern(&pattern, Some(&value), &unit).expect("plain");
        let reordered = match_pattern(&optimize(pattern.clone()), Some(&value), &unit).expect("optimized");
        prop_assert_eq!(&plain, &reordered);
        prop_assert!(!plain.is_empty());
    }

    #[test]
    fn repeated_adds_are_idempotent(entity in flat_entity()) {
        let mut thing = entity;
        thing.insert("id".to_string(), Value::Text("e".to_string()));
        thing.insert("type".to_string(), Value::Text("T".to_string()));
        // Null attribute values are retractions, not data; drop them here.
        thing.retain(|_, v| !v.is_null());
        let thing = Value::Map(thing);

        let mut once = Store::new();
        once.add(std::slice::from_ref(&thing)).expect("add once");

        let mut twice = Store::new();
        twice.add(std::slice::from_ref(&thing)).expect("add");
        twice.add(std::slice::from_ref(&thing)).expect("add again");

        let a = once.snapshot();
        let b = twice.snapshot();
        prop_assert_eq!(a.entities, b.entities);
        prop_assert_eq!(a.versions, b.versions);
        prop_assert_eq!(a.type_by_id, b.type_by_id);
        prop_assert_eq!(a.basis_t, b.basis_t);
    }

    #[test]
    fn object_match_distributes_over_arrays(left in flat_entity(), right in flat_entity()) {
        let pattern = Pattern::Object(vec![(PatternKey::Variable("?k".to_string()), var("v"))]);
        let unit = Bindings::unit().expect("unit");

        let l = Value::Map(left);
        let r = Value::Map(right);
        let joint = match_pattern(
            &pattern,
            Some(&Value::List(vec![l.clone(), r.clone()])),
            &unit,
        )
        .expect("joint");
        let split = match_pattern(&pattern, Some(&l), &unit)
            .expect("left")
            .merge(&match_pattern(&pattern, Some(&r), &unit).expect("right"));
        prop_assert_eq!(joint, split);
    }
}
