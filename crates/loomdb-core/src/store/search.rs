use crate::entity::Entity;

///
/// SortSpec
///
/// Attribute sort order for search results.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortSpec {
    pub key: String,
    pub descending: bool,
}

///
/// SearchParams
///
/// Routing parameters handed to the search-index adaptor.
///

#[derive(Clone, Debug, Default)]
pub struct SearchParams {
    pub ty: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub sort: Option<SortSpec>,
}

///
/// SearchIndex
///
/// External full-text/search adaptor. The store mutates the index on every
/// upsert and retract so readers never observe an index line desynchronized
/// from the entity map.
///

pub trait SearchIndex {
    /// Index (or re-index) one entity snapshot.
    fn upsert(&mut self, entity: &Entity);

    /// Drop one entity from the index.
    fn remove(&mut self, ty: &str, id: &str);

    /// Drop everything.
    fn clear(&mut self);

    /// Resolve a query to `(type, id)` hits, pre-shaped by the adaptor.
    fn search(&self, query: &str, params: &SearchParams) -> Vec<(String, String)>;
}

///
/// NoopSearchIndex
///
/// Default adaptor: indexes nothing and finds nothing.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSearchIndex;

impl SearchIndex for NoopSearchIndex {
    fn upsert(&mut self, _: &Entity) {}

    fn remove(&mut self, _: &str, _: &str) {}

    fn clear(&mut self) {}

    fn search(&self, _: &str, _: &SearchParams) -> Vec<(String, String)> {
        Vec::new()
    }
}
