mod compare;
mod float;
mod hash;
mod tag;

use crate::refs::Reference;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap};

// re-exports
pub use compare::canonical_cmp;
pub use float::{Float64, Float64Error};
pub use hash::{Digest, HasherHandle, ValueHasher, Xxh3ValueHasher, default_hasher, hash_value, stable_hash};
pub(crate) use tag::ValueTag;

///
/// Opaque
///
/// Internal value that passes through storage and matching without
/// introspection. Identified by a caller-chosen tag plus raw payload bytes.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Opaque {
    pub tag: String,
    pub data: Vec<u8>,
}

impl Opaque {
    #[must_use]
    pub fn new(tag: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            tag: tag.into(),
            data,
        }
    }
}

///
/// Value
///
/// The dynamic value universe of the store and the pattern engine.
///
/// Null → the attribute is explicitly empty; absence of a key is distinct
/// and means "leave the stored value untouched" during merges.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Float(Float64),
    Int(i64),
    Internal(Opaque),
    /// Ordered list of values. Attribute lists carry set semantics during
    /// merges; their order is preserved for display but is not semantic.
    List(Vec<Self>),
    /// String-keyed mapping; key order is canonical (sorted).
    Map(BTreeMap<String, Self>),
    Null,
    Ref(Reference),
    Text(String),
    Uint(u64),
}

impl Value {
    ///
    /// CONSTRUCTION
    ///

    /// Build a `Value::List` from owned items.
    pub fn from_list<T>(items: Vec<T>) -> Self
    where
        T: Into<Self>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a `Value::Map` from key/value entries.
    pub fn map_of<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Convert a JSON document into a value tree.
    ///
    /// JSON numbers map to `Int` when integral (then `Uint`, then `Float`);
    /// JSON never carries non-finite floats so the conversion is total.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Uint(u)
                } else {
                    n.as_f64()
                        .and_then(Float64::try_new)
                        .map_or(Self::Null, Self::Float)
                }
            }
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    ///
    /// TYPES
    ///

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Map(_))
    }

    /// Stable canonical variant tag used by hash/fingerprint encodings.
    #[must_use]
    pub(crate) const fn canonical_tag(&self) -> ValueTag {
        tag::canonical_tag(self)
    }

    /// Stable canonical rank used by all cross-variant ordering surfaces.
    #[must_use]
    pub(crate) const fn canonical_rank(&self) -> u8 {
        tag::canonical_rank(self)
    }

    ///
    /// CONVERSION
    ///

    #[must_use]
    pub const fn as_text(&self) -> Option<&str> {
        if let Self::Text(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&[Self]> {
        if let Self::List(xs) = self {
            Some(xs.as_slice())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        if let Self::Map(entries) = self {
            Some(entries)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_ref_value(&self) -> Option<&Reference> {
        if let Self::Ref(r) = self {
            Some(r)
        } else {
            None
        }
    }

    /// Reference target id when this value is an entity reference.
    #[must_use]
    pub fn as_entity_ref_id(&self) -> Option<&str> {
        match self {
            Self::Ref(r) if r.is_entity() => Some(r.id()),
            _ => None,
        }
    }

    /// Lossless numeric coercion used by the aggregate surfaces.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(f.get()),
            Self::Int(i) => Some(*i as f64),
            Self::Uint(u) => Some(*u as f64),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

// NOTE:
// Ord is the canonical total ordering (rank, then payload). It backs
// deterministic result ordering and map-key normalization; it is not a
// numeric ordering across variants.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        canonical_cmp(self, other)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[macro_export]
macro_rules! impl_value_from_for {
    ( $( $type:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_value_from_for! {
    bool       => Bool,
    i8         => Int,
    i16        => Int,
    i32        => Int,
    i64        => Int,
    u8         => Uint,
    u16        => Uint,
    u32        => Uint,
    u64        => Uint,
    &str       => Text,
    String     => Text,
    Float64    => Float,
    Opaque     => Internal,
    Reference  => Ref,
}

impl From<Vec<Self>> for Value {
    fn from(vec: Vec<Self>) -> Self {
        Self::List(vec)
    }
}

impl From<BTreeMap<String, Self>> for Value {
    fn from(map: BTreeMap<String, Self>) -> Self {
        Self::Map(map)
    }
}

impl TryFrom<f64> for Value {
    type Error = float::Float64Error;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        Float64::try_from(v).map(Self::Float)
    }
}

///
/// TESTS
///
