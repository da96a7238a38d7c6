//! LoomDB — a normalized in-memory entity store with a declarative
//! pattern/query engine.
//!
//! This facade re-exports the core surface and the builder vocabulary:
//! reference factories, pattern modifiers, and aggregation terms.

pub use loomdb_core::{bindings, entity, error, obs, pattern, query, refs, store, value};

// reference factories
pub use loomdb_core::refs::{RefKind, Reference, WILDCARD_ID};

/// Build a reference to a stored entity.
#[must_use]
pub fn entity_ref(id: impl Into<String>) -> Reference {
    Reference::entity(id)
}

/// Build a collection-merge removal marker.
#[must_use]
pub fn tombstone_ref(id: impl Into<String>) -> Reference {
    Reference::tombstone(id)
}

/// Build a transaction-level removal sentinel.
#[must_use]
pub fn retract_ref(id: impl Into<String>) -> Reference {
    Reference::retract(id)
}

///
/// Prelude
///
/// One-import vocabulary for applications: the store, values, patterns,
/// queries, and every builder.
///

pub mod prelude {
    pub use crate::{entity_ref, retract_ref, tombstone_ref};
    pub use loomdb_core::{
        bindings::{Binding, Bindings},
        entity::{Entity, UNTYPED},
        error::{Error, ErrorKind},
        pattern::{
            Pattern, PatternKey, match_pattern, maybe, not, obj, obj_entries, or, splice, test,
            tuple, val, var,
        },
        query::{
            AggregateKind, CompiledQuery, InClause, Query, QueryOptions, ResultSet, avg, count,
            count_distinct, create_query, distinct, max, median, min, mode, ret, run_query,
            stddev, sum, variance,
        },
        refs::Reference,
        store::{
            SearchIndex, SearchParams, Snapshot, SortSpec, Store, StoreConfig, TxKind, TxReport,
        },
        value::Value,
    };
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn facade_builders_construct_tagged_references() {
        assert!(entity_ref("a").is_entity());
        assert!(tombstone_ref("*").is_wildcard());
        assert!(retract_ref("a").is_retract());
    }

    #[test]
    fn end_to_end_store_and_query() {
        let mut store = Store::new();
        store
            .add(&[Value::map_of([
                ("id", "1"),
                ("type", "Task"),
                ("status", "done"),
            ])])
            .expect("add");

        let result = store
            .query(
                Query::find_one(ret("?id"), obj([("id", var("id")), ("status", val("done"))])),
                &[],
            )
            .expect("query");
        assert_eq!(result.count, 1);
    }
}
