use crate::{
    entity::{Entity, ID_KEY, TYPE_KEY},
    store::Store,
    value::Value,
};
use std::collections::BTreeMap;

///
/// EntityView
///
/// Immutable wrapped read over a stored entity. Attribute access resolves
/// entity references transparently, capped at the store's configured depth;
/// internal opaque values pass through untouched.
///

#[derive(Clone, Copy)]
pub struct EntityView<'a> {
    store: &'a Store,
    entity: &'a Entity,
}

impl<'a> EntityView<'a> {
    pub(crate) const fn new(store: &'a Store, entity: &'a Entity) -> Self {
        Self { store, entity }
    }

    #[must_use]
    pub fn id(&self) -> &'a str {
        self.entity.id()
    }

    #[must_use]
    pub fn ty(&self) -> &'a str {
        self.entity.ty()
    }

    /// The raw stored record, references unresolved.
    #[must_use]
    pub const fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// Resolved attribute value; entity references become nested maps.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<Value> {
        let depth = self.store.config().max_resolve_depth;
        self.entity
            .attr(key)
            .map(|value| resolve_value(self.store, value, depth))
    }

    /// Raw stored attribute value, references left in place.
    #[must_use]
    pub fn attr_raw(&self, key: &str) -> Option<&'a Value> {
        self.entity.attr(key)
    }

    /// Materialize the whole entity with references resolved, including the
    /// reserved id/type keys.
    #[must_use]
    pub fn reify(&self) -> Value {
        reify_entity(self.store, self.entity, self.store.config().max_resolve_depth)
    }
}

impl std::fmt::Debug for EntityView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityView")
            .field("id", &self.entity.id())
            .field("ty", &self.entity.ty())
            .finish_non_exhaustive()
    }
}

/// Resolve entity references inside a value tree. `depth` counts entity
/// hops; at the cap a reference degrades to an identity-only map.
pub(crate) fn resolve_value(store: &Store, value: &Value, depth: usize) -> Value {
    match value {
        Value::Ref(r) if r.is_entity() => {
            if depth == 0 {
                return identity_map(r.id());
            }
            store
                .index()
                .entity(r.id())
                .map_or_else(|| identity_map(r.id()), |target| {
                    reify_entity(store, target, depth - 1)
                })
        }
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| resolve_value(store, item, depth))
                .collect(),
        ),
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), resolve_value(store, v, depth)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Materialize an entity as a value map with resolved references.
pub(crate) fn reify_entity(store: &Store, entity: &Entity, depth: usize) -> Value {
    let mut map: BTreeMap<String, Value> = entity
        .attrs()
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(store, v, depth)))
        .collect();
    map.insert(ID_KEY.to_string(), Value::Text(entity.id().to_string()));
    map.insert(TYPE_KEY.to_string(), Value::Text(entity.ty().to_string()));
    Value::Map(map)
}

fn identity_map(id: &str) -> Value {
    Value::map_of([(ID_KEY, id)])
}
