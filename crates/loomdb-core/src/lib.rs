//! Core runtime for LoomDB: the dynamic value universe, the normalized
//! entity store, and the unification-based pattern/query engine.
#![warn(unreachable_pub)]

pub mod bindings;
pub mod entity;
pub mod error;
pub mod obs;
pub mod pattern;
pub mod query;
pub mod refs;
pub mod store;
pub mod value;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No sinks, adaptors, or internal helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        bindings::{Binding, Bindings},
        entity::{Entity, UNTYPED},
        error::{Error, ErrorKind},
        pattern::Pattern,
        query::{Query, ResultSet},
        refs::Reference,
        store::{Store, TxReport},
        value::Value,
    };
}
