use crate::{
    error::Error,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel type tag for entities whose concrete type is not yet known.
pub const UNTYPED: &str = "$untyped";

/// Reserved attribute key carrying the entity id in map form.
pub const ID_KEY: &str = "id";

/// Reserved attribute key carrying the entity type in map form.
pub const TYPE_KEY: &str = "type";

///
/// Entity
///
/// A stored record: string id, type tag, and a flat attribute map. "Flat"
/// means no attribute value is itself an identifiable entity; nested entities
/// appear only as references.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: String,
    ty: String,
    attrs: BTreeMap<String, Value>,
}

impl Entity {
    #[must_use]
    pub fn new(id: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ty: ty.into(),
            attrs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn ty(&self) -> &str {
        &self.ty
    }

    #[must_use]
    pub fn is_untyped(&self) -> bool {
        self.ty == UNTYPED
    }

    /// Move this record under a (more specific) type tag.
    pub(crate) fn set_ty(&mut self, ty: impl Into<String>) {
        self.ty = ty.into();
    }

    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: Value) {
        self.attrs.insert(key.into(), value);
    }

    /// Remove an attribute, returning whether it existed.
    pub fn remove_attr(&mut self, key: &str) -> bool {
        self.attrs.remove(key).is_some()
    }

    #[must_use]
    pub const fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    pub(crate) const fn attrs_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.attrs
    }

    /// Render this entity as a value map including the reserved id/type keys.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = self.attrs.clone();
        map.insert(ID_KEY.to_string(), Value::Text(self.id.clone()));
        map.insert(TYPE_KEY.to_string(), Value::Text(self.ty.clone()));
        Value::Map(map)
    }

    /// Assert the flatness invariant: no attribute value may be an
    /// identifiable entity map. Nested entities must be references.
    pub fn assert_flat(&self) -> Result<(), Error> {
        fn check(id: &str, key: &str, value: &Value) -> Result<(), Error> {
            match value {
                Value::Map(entries) => {
                    if entries.contains_key(ID_KEY) {
                        return Err(Error::nested_entity(id, key));
                    }
                    for nested in entries.values() {
                        check(id, key, nested)?;
                    }
                    Ok(())
                }
                Value::List(items) => {
                    for item in items {
                        check(id, key, item)?;
                    }
                    Ok(())
                }
                _ => Ok(()),
            }
        }

        for (key, value) in &self.attrs {
            check(&self.id, key, value)?;
        }

        Ok(())
    }
}

///
/// EntityInput
///
/// A parsed input map: optional identity, optional type, and the remaining
/// attribute entries. This is the normalizer's working view of raw input.
///

#[derive(Clone, Debug)]
pub(crate) struct EntityInput {
    pub id: Option<String>,
    pub ty: Option<String>,
    pub attrs: BTreeMap<String, Value>,
}

impl EntityInput {
    /// Split a value map into identity, type, and attribute entries.
    ///
    /// Non-text id/type entries are a shape violation.
    pub fn parse(map: &BTreeMap<String, Value>) -> Result<Self, Error> {
        let id = match map.get(ID_KEY) {
            None => None,
            Some(Value::Text(id)) => Some(id.clone()),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "entity id must be text, got {}",
                    other.canonical_tag().label()
                )));
            }
        };
        let ty = match map.get(TYPE_KEY) {
            None => None,
            Some(Value::Text(ty)) => Some(ty.clone()),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "entity type must be text, got {}",
                    other.canonical_tag().label()
                )));
            }
        };

        let attrs = map
            .iter()
            .filter(|(k, _)| k.as_str() != ID_KEY && k.as_str() != TYPE_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self { id, ty, attrs })
    }

    /// True when this input asserts nothing beyond its identity: only an id,
    /// or an id plus the untyped sentinel.
    #[must_use]
    pub fn is_identity_only(&self) -> bool {
        self.attrs.is_empty() && self.ty.as_deref().is_none_or(|ty| ty == UNTYPED)
    }

    /// Concrete (non-sentinel) type assertion carried by this input, if any.
    #[must_use]
    pub fn concrete_ty(&self) -> Option<&str> {
        self.ty.as_deref().filter(|ty| *ty != UNTYPED)
    }
}

///
/// TESTS
///
