//! Store integration suite: normalization, merge semantics, retraction, and
//! the transaction log.

use loomdb_core::{
    error::ErrorKind,
    obs::{ChangeSink, MemoryLogSink},
    refs::Reference,
    store::{Store, TxKind, TxReport},
    value::Value,
};
use std::{cell::RefCell, rc::Rc};

fn person(id: &str, name: &str) -> Value {
    Value::map_of([("id", id), ("type", "Person"), ("name", name)])
}

fn member_ids(store: &Store, group: &str) -> Vec<String> {
    let view = store.get(group, None).expect("group stored");
    let raw = view.attr_raw("members").expect("members present");
    raw.as_list()
        .expect("members is a list")
        .iter()
        .map(|v| v.as_entity_ref_id().expect("member is a ref").to_string())
        .collect()
}

#[test]
fn nested_entities_normalize_and_resolve() {
    let mut store = Store::new();
    store
        .add(&[Value::map_of([
            ("id", Value::Text("1".to_string())),
            ("type", Value::Text("Person".to_string())),
            ("name", Value::Text("A".to_string())),
            ("friend", person("2", "B")),
        ])])
        .expect("add");

    // Both entities stored, the nested one behind a reference.
    assert!(store.get("2", Some("Person")).is_some());
    let friend = store
        .get("1", None)
        .expect("stored")
        .attr("friend")
        .expect("resolved");
    let friend = friend.as_map().expect("resolved to a map");
    assert_eq!(friend.get("name"), Some(&Value::Text("B".to_string())));
}

#[test]
fn arrays_merge_as_sets_additively() {
    let mut store = Store::new();
    store
        .add(&[Value::map_of([
            ("id", Value::Text("g1".to_string())),
            ("type", Value::Text("G".to_string())),
            (
                "members",
                Value::List(vec![Value::map_of([
                    ("id", "p1"),
                    ("type", "P"),
                    ("name", "Alpha"),
                ])]),
            ),
        ])])
        .expect("first add");
    store
        .add(&[Value::map_of([
            ("id", Value::Text("g1".to_string())),
            ("type", Value::Text("G".to_string())),
            (
                "members",
                Value::List(vec![Value::map_of([
                    ("id", "p2"),
                    ("type", "P"),
                    ("name", "Beta"),
                ])]),
            ),
        ])])
        .expect("second add");

    assert_eq!(member_ids(&store, "g1"), vec!["p1", "p2"]);
}

#[test]
fn wildcard_tombstone_clears_prior_members() {
    let mut store = Store::new();
    store
        .add(&[Value::map_of([
            ("id", Value::Text("g1".to_string())),
            ("type", Value::Text("G".to_string())),
            (
                "members",
                Value::List(vec![
                    Value::map_of([("id", "p1"), ("type", "P"), ("name", "Alpha")]),
                    Value::map_of([("id", "p2"), ("type", "P"), ("name", "Beta")]),
                ]),
            ),
        ])])
        .expect("seed");

    store
        .add(&[Value::map_of([
            ("id", Value::Text("g1".to_string())),
            ("type", Value::Text("G".to_string())),
            (
                "members",
                Value::List(vec![
                    Value::Ref(Reference::tombstone("*")),
                    Value::map_of([("id", "pz"), ("type", "P"), ("name", "Z")]),
                ]),
            ),
        ])])
        .expect("clear and add");

    assert_eq!(member_ids(&store, "g1"), vec!["pz"]);
}

#[test]
fn retraction_cascades_through_references() {
    let mut store = Store::new();
    store
        .add(&[Value::map_of([
            ("id", Value::Text("g".to_string())),
            ("type", Value::Text("G".to_string())),
            (
                "members",
                Value::List(vec![person("p1", "A"), person("p2", "B")]),
            ),
            ("leader", Value::map_of([("id", "p1")])),
        ])])
        .expect("seed");

    let report = store
        .remove(&[Value::map_of([("id", "p1"), ("type", "Person")])])
        .expect("remove");
    assert_eq!(report.kind, std::collections::BTreeSet::from([TxKind::Retract]));

    assert!(store.get("p1", None).is_none());
    assert_eq!(member_ids(&store, "g"), vec!["p2"]);
    let group = store.get("g", None).expect("group");
    assert!(group.attr_raw("leader").is_none(), "leader must be absent");
}

#[test]
fn transact_mixes_retraction_and_upsert() {
    let mut store = Store::new();
    store.add(&[person("old", "Old")]).expect("seed");

    let report = store
        .transact(&[
            Value::Ref(Reference::retract("old")),
            person("new", "New"),
        ])
        .expect("transact");

    assert!(report.kind.contains(&TxKind::Retract));
    assert!(report.kind.contains(&TxKind::Upsert));
    assert!(store.get("old", None).is_none());
    assert!(store.get("new", None).is_some());
}

#[test]
fn transact_retract_is_idempotent() {
    let mut store = Store::new();
    store.add(&[person("x", "X")]).expect("seed");

    store
        .transact(&[Value::Ref(Reference::retract("x"))])
        .expect("first retract");
    let basis = store.basis_t();

    store
        .transact(&[Value::Ref(Reference::retract("x"))])
        .expect("second retract");
    assert_eq!(store.basis_t(), basis, "repeat retract must be a no-op");
}

#[test]
fn null_retracts_a_property_and_warns_on_missing_keys() {
    let mut store = Store::new();
    let log = Rc::new(MemoryLogSink::new());

    store
        .add(&[Value::map_of([
            ("id", Value::Text("1".to_string())),
            ("type", Value::Text("Person".to_string())),
            ("name", Value::Text("A".to_string())),
            ("nick", Value::Text("a".to_string())),
        ])])
        .expect("seed");

    store
        .add(&[Value::map_of([
            ("id", Value::Text("1".to_string())),
            ("type", Value::Text("Person".to_string())),
            ("nick", Value::Null),
        ])])
        .expect("retract nick");

    let view = store.get("1", None).expect("stored");
    assert!(view.attr_raw("nick").is_none());
    assert_eq!(
        view.attr_raw("name"),
        Some(&Value::Text("A".to_string())),
        "untouched properties must survive the merge"
    );

    // A second null on the now-missing key warns through the sink.
    struct SinkHandle(Rc<MemoryLogSink>);
    impl loomdb_core::obs::LogSink for SinkHandle {
        fn warn(&self, message: &str) {
            self.0.warn(message);
        }
    }
    store.set_log_sink(Box::new(SinkHandle(log.clone())));
    store
        .add(&[Value::map_of([
            ("id", Value::Text("1".to_string())),
            ("type", Value::Text("Person".to_string())),
            ("nick", Value::Null),
        ])])
        .expect("repeat retract");
    assert_eq!(log.messages().len(), 1);
}

#[test]
fn type_conflicts_abort_the_operation() {
    let mut store = Store::new();
    store.add(&[person("1", "A")]).expect("seed");
    let basis = store.basis_t();

    let err = store
        .add(&[Value::map_of([("id", "1"), ("type", "Group")])])
        .expect_err("must conflict");
    assert!(err.is(ErrorKind::TypeConflict));
    assert_eq!(store.basis_t(), basis, "failed adds must not advance the clock");
    assert_eq!(
        store.get("1", None).map(|v| v.ty().to_string()),
        Some("Person".to_string())
    );
}

#[test]
fn replaying_the_tx_log_rebuilds_an_equal_store() {
    let mut store = Store::new();
    store.add(&[person("1", "A")]).expect("add");
    store
        .add(&[Value::map_of([
            ("id", Value::Text("g".to_string())),
            ("type", Value::Text("G".to_string())),
            ("members", Value::List(vec![person("2", "B")])),
        ])])
        .expect("add group");
    store
        .remove(&[Value::map_of([("id", "2"), ("type", "Person")])])
        .expect("remove");

    let mut replayed = Store::new();
    replayed.replay_log(store.tx_log()).expect("replay");

    assert_eq!(replayed.snapshot(), store.snapshot());
}

#[test]
fn batched_notifications_coalesce() {
    #[derive(Default)]
    struct Collector {
        batches: RefCell<Vec<usize>>,
    }
    struct CollectorHandle(Rc<Collector>);
    impl ChangeSink for CollectorHandle {
        fn notify(&self, reports: &[TxReport]) {
            self.0.batches.borrow_mut().push(reports.len());
        }
    }

    let collector = Rc::new(Collector::default());
    let mut store = Store::new();
    store.set_change_sink(Box::new(CollectorHandle(collector.clone())));

    store.add(&[person("1", "A")]).expect("add");
    assert_eq!(*collector.batches.borrow(), vec![1]);

    let token = store.begin_batch(Some("bulk"));
    store.add(&[person("2", "B")]).expect("add");
    store.add(&[person("3", "C")]).expect("add");
    assert_eq!(*collector.batches.borrow(), vec![1], "batch defers delivery");

    store.end_batch(token);
    assert_eq!(*collector.batches.borrow(), vec![1, 2], "batch coalesces");
}

#[test]
fn get_reified_walks_reference_paths() {
    let mut store = Store::new();
    store
        .add(&[Value::map_of([
            ("id", Value::Text("1".to_string())),
            ("type", Value::Text("Person".to_string())),
            ("friend", person("2", "B")),
        ])])
        .expect("seed");

    assert_eq!(
        store.get_reified("1", &["friend", "name"]),
        Some(Value::Text("B".to_string()))
    );
    assert_eq!(store.get_reified("1", &["friend", "missing"]), None);
}

#[test]
fn index_invariants_hold_for_every_stored_entity() {
    let mut store = Store::new();
    store.add(&[person("1", "A"), person("2", "B")]).expect("add");
    store.add(&[person("1", "A2")]).expect("update");

    let snapshot = store.snapshot();
    for (ty, bucket) in &snapshot.entities {
        for (id, entity) in bucket {
            assert_eq!(snapshot.type_by_id.get(id), Some(ty));
            assert!(snapshot.versions[ty][id] >= 1);
            entity.assert_flat().expect("stored entities are flat");
        }
    }
    assert_eq!(snapshot.versions["Person"]["1"], 2);
}
