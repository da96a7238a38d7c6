use crate::{
    error::Error,
    value::{Digest, HasherHandle, Value, default_hasher},
};
use derive_more::{Deref, DerefMut};
use std::collections::BTreeMap;

/// Leading sigil of variable names.
pub const VARIABLE_SIGIL: char = '?';

/// Returns true when the name carries the variable sigil.
#[must_use]
pub fn is_variable_name(name: &str) -> bool {
    name.starts_with(VARIABLE_SIGIL)
}

///
/// Binding
///
/// One variable→value record. Keys keep their `?` sigil; `stripped` produces
/// the sigil-free view handed to test predicates.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, Eq, PartialEq)]
pub struct Binding(BTreeMap<String, Value>);

impl Binding {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn bind(mut self, var: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(var.into(), value.into());
        self
    }

    pub fn insert_var(&mut self, var: impl Into<String>, value: Value) {
        self.0.insert(var.into(), value);
    }

    /// Render this record as a value map for canonical hashing.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Map(self.0.clone())
    }

    /// Copy with the leading `?` removed from every key, for test predicates.
    #[must_use]
    pub fn stripped(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(k, v)| {
                    let key = k.strip_prefix(VARIABLE_SIGIL).unwrap_or(k);
                    (key.to_string(), v.clone())
                })
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Binding {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

///
/// Bindings
///
/// A multiset of binding records keyed by the canonical hash of the record.
/// Equal records merge by summing counts. Iteration order is the digest
/// order, which is stable within one query.
///

#[derive(Clone)]
pub struct Bindings {
    entries: BTreeMap<Digest, (Binding, u64)>,
    hasher: HasherHandle,
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Bindings {
    ///
    /// CONSTRUCTION
    ///

    /// An empty set: the matcher's "no match" signal.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(default_hasher())
    }

    /// An empty set using an injected canonical hasher.
    #[must_use]
    pub fn with_hasher(hasher: HasherHandle) -> Self {
        Self {
            entries: BTreeMap::new(),
            hasher,
        }
    }

    /// The unit set: a single empty record, the identity for conjunction.
    pub fn unit() -> Result<Self, Error> {
        Self::from_record(Binding::new())
    }

    pub fn from_record(record: Binding) -> Result<Self, Error> {
        let mut out = Self::new();
        out.add(record)?;
        Ok(out)
    }

    pub fn from_records<I>(records: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Binding>,
    {
        let mut out = Self::new();
        for record in records {
            out.add(record)?;
        }
        Ok(out)
    }

    /// Empty set sharing this set's hasher.
    #[must_use]
    pub fn like(&self) -> Self {
        Self::with_hasher(self.hasher.clone())
    }

    #[must_use]
    pub const fn hasher(&self) -> &HasherHandle {
        &self.hasher
    }

    ///
    /// MUTATION
    ///

    /// Insert a record or increment the count of its canonical hash.
    pub fn add(&mut self, record: Binding) -> Result<(), Error> {
        self.add_counted(record, 1)
    }

    /// Insert a record with an explicit replication count.
    pub fn add_counted(&mut self, record: Binding, count: u64) -> Result<(), Error> {
        if count == 0 {
            return Ok(());
        }
        let digest = self.hasher.digest(&record.to_value())?;
        self.entries
            .entry(digest)
            .and_modify(|(_, n)| *n += count)
            .or_insert((record, count));
        Ok(())
    }

    /// Functional insert returning a new set.
    pub fn with(&self, record: Binding) -> Result<Self, Error> {
        let mut out = self.clone();
        out.add(record)?;
        Ok(out)
    }

    /// Functional removal of all copies of a record.
    pub fn without(&self, record: &Binding) -> Result<Self, Error> {
        let digest = self.hasher.digest(&record.to_value())?;
        let mut out = self.clone();
        out.entries.remove(&digest);
        Ok(out)
    }

    /// Sum counts per canonical hash.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (digest, (record, count)) in &other.entries {
            out.entries
                .entry(*digest)
                .and_modify(|(_, n)| *n += count)
                .or_insert((record.clone(), *count));
        }
        out
    }

    /// Keep only records satisfying the predicate; digests are preserved.
    #[must_use]
    pub fn filter(&self, mut keep: impl FnMut(&Binding, u64) -> bool) -> Self {
        let mut out = self.like();
        for (digest, (record, count)) in &self.entries {
            if keep(record, *count) {
                out.entries.insert(*digest, (record.clone(), *count));
            }
        }
        out
    }

    ///
    /// TRAVERSAL
    ///

    /// Fold over unique records; `count` is the record's multiplicity.
    pub fn reduce<A>(&self, init: A, mut f: impl FnMut(A, &Binding, u64) -> A) -> A {
        let mut acc = init;
        for (record, count) in self.iter() {
            acc = f(acc, record, count);
        }
        acc
    }

    /// Rewrite each unique record; multiplicities carry over.
    pub fn map(&self, mut f: impl FnMut(&Binding, u64) -> Binding) -> Result<Self, Error> {
        let mut out = self.like();
        for (record, count) in self.iter() {
            out.add_counted(f(record, count), count)?;
        }
        Ok(out)
    }

    /// Rewrite each unique record into any number of records; each emitted
    /// record inherits the source multiplicity.
    pub fn flat_map(
        &self,
        mut f: impl FnMut(&Binding, u64) -> Vec<Binding>,
    ) -> Result<Self, Error> {
        let mut out = self.like();
        for (record, count) in self.iter() {
            for emitted in f(record, count) {
                out.add_counted(emitted, count)?;
            }
        }
        Ok(out)
    }

    /// Partition into groups whose records agree on the named variables.
    ///
    /// The group key is the canonical hash of the projected value tuple;
    /// unbound variables project as null.
    pub fn group_by<S: AsRef<str>>(&self, vars: &[S]) -> Result<Vec<Self>, Error> {
        let mut groups: BTreeMap<Digest, Self> = BTreeMap::new();
        for (record, count) in self.iter() {
            let projected = Value::List(
                vars.iter()
                    .map(|var| record.get(var.as_ref()).cloned().unwrap_or(Value::Null))
                    .collect(),
            );
            let key = self.hasher.digest(&projected)?;
            groups
                .entry(key)
                .or_insert_with(|| self.like())
                .add_counted(record.clone(), count)?;
        }
        Ok(groups.into_values().collect())
    }

    ///
    /// ACCESS
    ///

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of unique records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total multiplicity across records.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.values().map(|(_, n)| *n).sum()
    }

    /// Iterate unique records with their multiplicities.
    pub fn iter(&self) -> impl Iterator<Item = (&Binding, u64)> {
        self.entries.values().map(|(record, count)| (record, *count))
    }

    /// Materialize the multiset: each record replicated by its count.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn to_vec(&self) -> Vec<Binding> {
        let mut out = Vec::new();
        for (record, count) in self.iter() {
            for _ in 0..count as usize {
                out.push(record.clone());
            }
        }
        out
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Bindings {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Bindings {}

///
/// TESTS
///
