use crate::{
    entity::{Entity, EntityInput, ID_KEY, UNTYPED},
    error::Error,
    obs::LogSink,
    refs::Reference,
    store::{Index, TxOp},
    value::{HasherHandle, Value},
};
use std::collections::{BTreeMap, BTreeSet};

///
/// Normalizer
///
/// Flattens an input object tree into staged entity upserts: nested
/// identifiable entities become references, arrays merge as sets with
/// tombstone handling, and plain nested maps deep-merge. One normalizer
/// instance covers one mutation call; its visited set breaks cycles.
///

pub(crate) struct Normalizer<'a> {
    index: &'a Index,
    hasher: &'a HasherHandle,
    log: &'a dyn LogSink,
    visited: BTreeSet<String>,
    staged: BTreeMap<String, Entity>,
    order: Vec<String>,
}

impl<'a> Normalizer<'a> {
    pub fn new(index: &'a Index, hasher: &'a HasherHandle, log: &'a dyn LogSink) -> Self {
        Self {
            index,
            hasher,
            log,
            visited: BTreeSet::new(),
            staged: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Normalize one transaction root. Roots must carry an id and a concrete
    /// type.
    pub fn normalize_root(&mut self, thing: &Value) -> Result<(), Error> {
        let map = thing
            .as_map()
            .ok_or_else(|| Error::invalid_argument("transaction entries must be maps"))?;
        let input = EntityInput::parse(map)?;

        let Some(id) = input.id.clone() else {
            return Err(Error::missing_id());
        };
        if input.concrete_ty().is_none() {
            return Err(Error::missing_type(&id));
        }

        self.normalize_entity(input)?;
        Ok(())
    }

    /// Staged changes, skipping entities that merged to their stored state.
    pub fn into_changes(self) -> Vec<(TxOp, Entity)> {
        let mut changes = Vec::new();
        for id in &self.order {
            let Some(entity) = self.staged.get(id) else {
                continue;
            };
            let unchanged = self.index.ty_of(id) == Some(entity.ty())
                && self.index.entity(id) == Some(entity);
            if !unchanged {
                changes.push((TxOp::Upsert, entity.clone()));
            }
        }
        changes
    }

    fn normalize_entity(&mut self, input: EntityInput) -> Result<Reference, Error> {
        let Some(id) = input.id.clone() else {
            return Err(Error::internal("normalize_entity requires an id"));
        };

        // Pure references assert nothing.
        if input.is_identity_only() {
            return Ok(Reference::entity(id));
        }

        // Back-edges become references; the visited set breaks recursion.
        if self.visited.contains(&id) {
            return Ok(Reference::entity(id));
        }
        self.visited.insert(id.clone());

        let existing_ty = self
            .staged
            .get(&id)
            .map(|e| e.ty().to_string())
            .or_else(|| self.index.ty_of(&id).map(ToString::to_string));
        let incoming_ty = input.ty.clone().unwrap_or_else(|| UNTYPED.to_string());
        let resolved = resolve_ty(&id, existing_ty.as_deref(), &incoming_ty)?;

        let mut working = self
            .staged
            .remove(&id)
            .or_else(|| self.index.entity(&id).cloned())
            .unwrap_or_else(|| Entity::new(id.clone(), resolved.clone()));
        working.set_ty(resolved);

        for (key, value) in &input.attrs {
            match value {
                // Explicit retraction of the attribute.
                Value::Null => {
                    if !working.remove_attr(key) {
                        self.log.warn(&format!(
                            "retracted nonexistent key '{key}' on entity '{id}'"
                        ));
                    }
                }
                // A tombstone in scalar position clears the attribute.
                Value::Ref(r) if r.is_tombstone() => {
                    working.remove_attr(key);
                }
                incoming => {
                    let old = working.attr(key).cloned();
                    let merged = self.merge_value(old.as_ref(), incoming)?;
                    working.set_attr(key.clone(), merged);
                }
            }
        }

        working.assert_flat()?;

        if !self.order.contains(&id) {
            self.order.push(id.clone());
        }
        self.staged.insert(id.clone(), working);

        Ok(Reference::entity(id))
    }

    fn merge_value(&mut self, old: Option<&Value>, incoming: &Value) -> Result<Value, Error> {
        match incoming {
            Value::Map(map) => {
                let input = EntityInput::parse(map)?;
                if input.id.is_some() {
                    Ok(Value::Ref(self.normalize_entity(input)?))
                } else {
                    self.merge_map(old.and_then(Value::as_map), map)
                }
            }
            Value::List(items) => self.merge_list(old.and_then(Value::as_list), items),
            other => Ok(other.clone()),
        }
    }

    // Deep merge of a plain (non-entity) nested map; untouched keys survive.
    fn merge_map(
        &mut self,
        old: Option<&BTreeMap<String, Value>>,
        incoming: &BTreeMap<String, Value>,
    ) -> Result<Value, Error> {
        let mut merged = old.cloned().unwrap_or_default();
        for (key, value) in incoming {
            match value {
                Value::Null => {
                    merged.remove(key);
                }
                other => {
                    let prior = merged.get(key).cloned();
                    let next = self.merge_value(prior.as_ref(), other)?;
                    merged.insert(key.clone(), next);
                }
            }
        }
        Ok(Value::Map(merged))
    }

    // Arrays merge as sets: elements are keyed, tombstones apply before
    // values, and new elements override old ones with the same key.
    fn merge_list(&mut self, old: Option<&[Value]>, incoming: &[Value]) -> Result<Value, Error> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        if let Some(old) = old {
            for element in old {
                let key = self.element_key(element);
                if !entries.iter().any(|(k, _)| *k == key) {
                    entries.push((key, element.clone()));
                }
            }
        }

        let (tombstones, values): (Vec<&Value>, Vec<&Value>) = incoming
            .iter()
            .partition(|v| matches!(v, Value::Ref(r) if r.is_tombstone()));

        for tombstone in tombstones {
            let Value::Ref(r) = tombstone else {
                continue;
            };
            if r.is_wildcard() {
                entries.clear();
            } else {
                entries.retain(|(key, _)| key != r.id());
            }
        }

        for value in values {
            let normalized = match value {
                Value::Map(map) => {
                    let input = EntityInput::parse(map)?;
                    if input.id.is_some() {
                        Value::Ref(self.normalize_entity(input)?)
                    } else {
                        self.merge_map(None, map)?
                    }
                }
                Value::List(nested) => self.merge_list(None, nested)?,
                other => other.clone(),
            };

            let key = self.element_key(&normalized);
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, slot)) => *slot = normalized,
                None => entries.push((key, normalized)),
            }
        }

        Ok(Value::List(entries.into_iter().map(|(_, v)| v).collect()))
    }

    // Element identity: id, else reference id, else canonical hash, else the
    // debug string form when hashing is unavailable.
    fn element_key(&self, value: &Value) -> String {
        match value {
            Value::Map(map) => {
                if let Some(Value::Text(id)) = map.get(ID_KEY) {
                    return id.clone();
                }
            }
            Value::Ref(r) => return r.id().to_string(),
            _ => {}
        }

        self.hasher
            .digest(value)
            .map_or_else(|_| format!("{value:?}"), |digest| format!("{digest:032x}"))
    }
}

// UNTYPED on either side yields the other; two distinct concrete types are a
// hard conflict.
fn resolve_ty(id: &str, existing: Option<&str>, incoming: &str) -> Result<String, Error> {
    match existing {
        None => Ok(incoming.to_string()),
        Some(existing) if existing == incoming => Ok(existing.to_string()),
        Some(UNTYPED) => Ok(incoming.to_string()),
        Some(existing) if incoming == UNTYPED => Ok(existing.to_string()),
        Some(existing) => Err(Error::type_conflict(id, existing, incoming)),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{obs::NoopLogSink, value::default_hasher};

    fn normalize(things: &[Value]) -> Result<Vec<(TxOp, Entity)>, Error> {
        let index = Index::default();
        let hasher = default_hasher();
        let log = NoopLogSink;
        let mut normalizer = Normalizer::new(&index, &hasher, &log);
        for thing in things {
            normalizer.normalize_root(thing)?;
        }
        Ok(normalizer.into_changes())
    }

    fn person(id: &str, name: &str) -> Value {
        Value::map_of([("id", id), ("type", "Person"), ("name", name)])
    }

    #[test]
    fn nested_entities_become_references() {
        let input = Value::map_of([
            ("id", Value::Text("1".to_string())),
            ("type", Value::Text("Person".to_string())),
            ("friend", person("2", "B")),
        ]);

        let changes = normalize(&[input]).expect("normalize");
        assert_eq!(changes.len(), 2);

        let parent = changes
            .iter()
            .map(|(_, e)| e)
            .find(|e| e.id() == "1")
            .expect("parent staged");
        assert_eq!(
            parent.attr("friend"),
            Some(&Value::Ref(Reference::entity("2")))
        );
    }

    #[test]
    fn roots_require_id_and_concrete_type() {
        let no_id = Value::map_of([("type", "Person")]);
        assert!(normalize(&[no_id]).is_err());

        let untyped = Value::map_of([("id", "1")]);
        let err = normalize(&[untyped]).expect_err("must reject");
        assert!(err.is(crate::error::ErrorKind::MissingType));
    }

    #[test]
    fn identity_only_nested_objects_assert_nothing() {
        let input = Value::map_of([
            ("id", Value::Text("1".to_string())),
            ("type", Value::Text("Person".to_string())),
            ("friend", Value::map_of([("id", "2")])),
        ]);

        let changes = normalize(&[input]).expect("normalize");
        assert_eq!(changes.len(), 1, "the pure reference must not stage '2'");
    }

    #[test]
    fn cycles_break_into_back_edge_references() {
        let input = Value::map_of([
            ("id", Value::Text("1".to_string())),
            ("type", Value::Text("Person".to_string())),
            (
                "friend",
                Value::map_of([
                    ("id", Value::Text("2".to_string())),
                    ("type", Value::Text("Person".to_string())),
                    ("friend", Value::map_of([("id", "1"), ("type", "Person")])),
                ]),
            ),
        ]);

        let changes = normalize(&[input]).expect("normalize");
        assert_eq!(changes.len(), 2);
        let child = changes
            .iter()
            .map(|(_, e)| e)
            .find(|e| e.id() == "2")
            .expect("child staged");
        assert_eq!(
            child.attr("friend"),
            Some(&Value::Ref(Reference::entity("1")))
        );
    }

    #[test]
    fn conflicting_concrete_types_are_rejected() {
        assert!(resolve_ty("1", Some("Person"), "Person").is_ok());
        assert_eq!(resolve_ty("1", Some(UNTYPED), "Person").expect("promote"), "Person");
        assert_eq!(resolve_ty("1", Some("Person"), UNTYPED).expect("keep"), "Person");

        let err = resolve_ty("1", Some("Person"), "Group").expect_err("conflict");
        assert!(err.is(crate::error::ErrorKind::TypeConflict));
    }

    #[test]
    fn wildcard_tombstone_clears_before_values_apply() {
        let index = Index::default();
        let hasher = default_hasher();
        let log = NoopLogSink;
        let mut normalizer = Normalizer::new(&index, &hasher, &log);

        let old = vec![
            Value::Ref(Reference::entity("p1")),
            Value::Ref(Reference::entity("p2")),
        ];
        let incoming = vec![
            Value::Ref(Reference::tombstone("*")),
            Value::map_of([("id", "pz"), ("type", "P")]),
        ];
        let merged = normalizer
            .merge_list(Some(&old), &incoming)
            .expect("merge");
        assert_eq!(
            merged,
            Value::List(vec![Value::Ref(Reference::entity("pz"))])
        );
    }

    #[test]
    fn targeted_tombstone_removes_one_key() {
        let index = Index::default();
        let hasher = default_hasher();
        let log = NoopLogSink;
        let mut normalizer = Normalizer::new(&index, &hasher, &log);

        let old = vec![
            Value::Ref(Reference::entity("p1")),
            Value::Ref(Reference::entity("p2")),
        ];
        let incoming = vec![Value::Ref(Reference::tombstone("p1"))];
        let merged = normalizer
            .merge_list(Some(&old), &incoming)
            .expect("merge");
        assert_eq!(
            merged,
            Value::List(vec![Value::Ref(Reference::entity("p2"))])
        );
    }

    #[test]
    fn scalar_elements_key_by_canonical_hash() {
        let index = Index::default();
        let hasher = default_hasher();
        let log = NoopLogSink;
        let mut normalizer = Normalizer::new(&index, &hasher, &log);

        let old = vec![Value::Int(1), Value::Int(2)];
        let incoming = vec![Value::Int(2), Value::Int(3)];
        let merged = normalizer
            .merge_list(Some(&old), &incoming)
            .expect("merge");
        assert_eq!(
            merged,
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn plain_nested_maps_deep_merge() {
        let index = Index::default();
        let hasher = default_hasher();
        let log = NoopLogSink;
        let mut normalizer = Normalizer::new(&index, &hasher, &log);

        let old = Value::map_of([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let incoming = Value::map_of([("b", Value::Int(3)), ("c", Value::Int(4))]);
        let merged = normalizer
            .merge_value(Some(&old), &incoming)
            .expect("merge");

        assert_eq!(
            merged,
            Value::map_of([
                ("a", Value::Int(1)),
                ("b", Value::Int(3)),
                ("c", Value::Int(4)),
            ])
        );
    }
}
