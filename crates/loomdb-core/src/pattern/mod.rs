mod matcher;
mod optimize;
mod wire;

use crate::{
    bindings::{Binding, is_variable_name},
    value::Value,
};
use std::{fmt, sync::Arc};

// re-exports
pub use matcher::match_pattern;
pub use optimize::optimize;
pub use wire::{parse_pattern, pattern_to_value};

/// Wire tag opening an OR modifier group.
pub const OR_TAG: &str = "::or";
/// Wire tag opening a NOT modifier group.
pub const NOT_TAG: &str = "::not";
/// Wire tag opening a MAYBE modifier group.
pub const MAYBE_TAG: &str = "::maybe";
/// Wire tag opening a TUPLE modifier group.
pub const TUPLE_TAG: &str = "::tuple";
/// Key prefix marking a splice entry in an object pattern.
pub const SPLICE_PREFIX: &str = "~@";

///
/// Pattern
///
/// The pattern language: variables, scalars, object patterns with literal /
/// variable / splice keys, array patterns, modifier groups, test predicates,
/// and the null pattern (matches only absent or null values).
///

#[derive(Clone, Debug)]
pub enum Pattern {
    /// Plain array pattern: iterates array values, filters scalars.
    Each(Vec<Pattern>),
    Maybe(Box<Pattern>),
    Not(Box<Pattern>),
    Null,
    Object(Vec<(PatternKey, Pattern)>),
    Or(Vec<Pattern>),
    Scalar(Value),
    Test(TestPredicate),
    Tuple(Vec<Pattern>),
    Variable(String),
}

///
/// PatternKey
///
/// Key position of an object-pattern entry.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PatternKey {
    /// Must be present in the value map (modulo optional sub-patterns).
    Literal(String),
    /// Matches any key, binding the variable to the key name.
    Variable(String),
    /// Sub-pattern applies to the containing value itself.
    Splice(String),
}

impl PatternKey {
    /// Classify a raw key string by its sigil.
    #[must_use]
    pub fn classify(key: &str) -> Self {
        if let Some(tag) = key.strip_prefix(SPLICE_PREFIX) {
            Self::Splice(tag.to_string())
        } else if is_variable_name(key) {
            Self::Variable(key.to_string())
        } else {
            Self::Literal(key.to_string())
        }
    }

    /// Raw wire form of this key.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Literal(k) | Self::Variable(k) => k.clone(),
            Self::Splice(tag) => format!("{SPLICE_PREFIX}{tag}"),
        }
    }
}

///
/// TestPredicate
///
/// A named filter over a binding record. The record's keys are the variable
/// names without the leading `?`; tests filter bindings and never extend
/// them. Predicates do not serialize.
///

#[derive(Clone)]
pub struct TestPredicate {
    name: String,
    func: Arc<dyn Fn(&Binding) -> bool + Send + Sync>,
}

impl TestPredicate {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&Binding) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the predicate to a sigil-stripped record.
    #[must_use]
    pub fn check(&self, record: &Binding) -> bool {
        (self.func)(&record.stripped())
    }
}

impl fmt::Debug for TestPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

///
/// BUILDERS
///

/// Variable token; the `?` sigil is added when absent.
#[must_use]
pub fn var(name: &str) -> Pattern {
    Pattern::Variable(variable(name))
}

/// Variable name string with the `?` sigil ensured.
#[must_use]
pub fn variable(name: &str) -> String {
    if is_variable_name(name) {
        name.to_string()
    } else {
        format!("?{name}")
    }
}

/// Scalar pattern from any value.
#[must_use]
pub fn val(value: impl Into<Value>) -> Pattern {
    Pattern::Scalar(value.into())
}

/// Union of alternatives; empty when every alternative fails.
#[must_use]
pub fn or<I: IntoIterator<Item = Pattern>>(alternatives: I) -> Pattern {
    Pattern::Or(alternatives.into_iter().collect())
}

/// Succeeds only when the inner pattern produces no bindings.
#[must_use]
pub fn not(inner: Pattern) -> Pattern {
    Pattern::Not(Box::new(inner))
}

/// Inner pattern or pass-through; never reduces bindings.
#[must_use]
pub fn maybe(inner: Pattern) -> Pattern {
    Pattern::Maybe(Box::new(inner))
}

/// Positional match over an array prefix.
#[must_use]
pub fn tuple<I: IntoIterator<Item = Pattern>>(elements: I) -> Pattern {
    Pattern::Tuple(elements.into_iter().collect())
}

/// Object-pattern entry whose children apply to the containing value.
#[must_use]
pub fn splice<I: IntoIterator<Item = Pattern>>(
    children: I,
    tag: Option<&str>,
) -> (PatternKey, Pattern) {
    (
        PatternKey::Splice(tag.unwrap_or("_").to_string()),
        Pattern::Each(children.into_iter().collect()),
    )
}

/// Named test predicate over the sigil-stripped binding record.
#[must_use]
pub fn test(
    name: &str,
    func: impl Fn(&Binding) -> bool + Send + Sync + 'static,
) -> Pattern {
    Pattern::Test(TestPredicate::new(name, func))
}

/// Object pattern from raw-keyed entries; keys classify by sigil.
#[must_use]
pub fn obj<K, I>(entries: I) -> Pattern
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, Pattern)>,
{
    Pattern::Object(
        entries
            .into_iter()
            .map(|(k, p)| (PatternKey::classify(k.as_ref()), p))
            .collect(),
    )
}

/// Object pattern from pre-classified entries (for splices).
#[must_use]
pub fn obj_entries<I>(entries: I) -> Pattern
where
    I: IntoIterator<Item = (PatternKey, Pattern)>,
{
    Pattern::Object(entries.into_iter().collect())
}

// Strings build variables when they carry the sigil, scalars otherwise.
impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        if is_variable_name(s) {
            Self::Variable(s.to_string())
        } else {
            Self::Scalar(Value::Text(s.to_string()))
        }
    }
}

impl From<Value> for Pattern {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<i64> for Pattern {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::Int(value))
    }
}

impl From<bool> for Pattern {
    fn from(value: bool) -> Self {
        Self::Scalar(Value::Bool(value))
    }
}

///
/// TESTS
///
