mod normalize;
mod search;
mod snapshot;
mod tx;
mod view;

use crate::{
    entity::{Entity, EntityInput},
    error::Error,
    obs::{ChangeSink, LogSink, NoopLogSink, StoreReport},
    query::{CompiledQuery, Query, QueryOptions, ResultSet, create_query, run_query},
    refs::Reference,
    value::{HasherHandle, Value, default_hasher},
};
use normalize::Normalizer;
use std::collections::{BTreeMap, BTreeSet};

// re-exports
pub use search::{NoopSearchIndex, SearchIndex, SearchParams, SortSpec};
pub use snapshot::Snapshot;
pub use tx::{TxKind, TxMetadata, TxOp, TxReport};
pub use view::EntityView;

/// Default cap on reference-resolution depth for wrapped reads.
pub const DEFAULT_MAX_RESOLVE_DEPTH: usize = 8;

///
/// StoreConfig
///
/// Store policy knobs. Values are fixed at construction.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreConfig {
    pub max_resolve_depth: usize,
}

impl StoreConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_resolve_depth: DEFAULT_MAX_RESOLVE_DEPTH,
        }
    }

    #[must_use]
    pub const fn with_max_resolve_depth(mut self, depth: usize) -> Self {
        self.max_resolve_depth = depth;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

///
/// Index
///
/// The normalized entity indexes: type→id→entity, per-entity versions, and
/// the id→type map. `type_by_id` names an id iff the entity map stores it.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Index {
    pub entities: BTreeMap<String, BTreeMap<String, Entity>>,
    pub versions: BTreeMap<String, BTreeMap<String, u64>>,
    pub type_by_id: BTreeMap<String, String>,
}

impl Index {
    pub fn ty_of(&self, id: &str) -> Option<&str> {
        self.type_by_id.get(id).map(String::as_str)
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        let ty = self.type_by_id.get(id)?;
        self.entities.get(ty)?.get(id)
    }

    pub fn entity_of(&self, ty: &str, id: &str) -> Option<&Entity> {
        self.entities.get(ty)?.get(id)
    }

    pub fn version(&self, ty: &str, id: &str) -> Option<u64> {
        self.versions.get(ty)?.get(id).copied()
    }

    pub fn iter_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().flat_map(BTreeMap::values)
    }

    /// Insert or merge one entity snapshot, relocating it when its resolved
    /// type moved and bumping its version.
    pub fn upsert(&mut self, entity: Entity) {
        let id = entity.id().to_string();
        let ty = entity.ty().to_string();

        let mut version = 0;
        if let Some(old_ty) = self.type_by_id.get(&id).cloned() {
            version = self
                .versions
                .get_mut(&old_ty)
                .and_then(|bucket| bucket.remove(&id))
                .unwrap_or(0);
            if old_ty != ty {
                self.drop_from_bucket(&old_ty, &id);
            }
        }

        self.entities
            .entry(ty.clone())
            .or_default()
            .insert(id.clone(), entity);
        self.versions
            .entry(ty.clone())
            .or_default()
            .insert(id.clone(), version + 1);
        self.type_by_id.insert(id, ty);
    }

    /// Remove one entity by id, returning its last stored snapshot.
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        let ty = self.type_by_id.remove(id)?;
        if let Some(bucket) = self.versions.get_mut(&ty) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.versions.remove(&ty);
            }
        }
        let removed = self
            .entities
            .get_mut(&ty)
            .and_then(|bucket| bucket.remove(id));
        if self.entities.get(&ty).is_some_and(BTreeMap::is_empty) {
            self.entities.remove(&ty);
        }
        removed
    }

    fn drop_from_bucket(&mut self, ty: &str, id: &str) {
        if let Some(bucket) = self.entities.get_mut(ty) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.entities.remove(ty);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.versions.clear();
        self.type_by_id.clear();
    }
}

///
/// BatchToken
///
/// Handle closing one level of batch nesting. Tokens must be returned to
/// `end_batch`; dropping one leaves the batch open.
///

#[derive(Debug)]
#[must_use = "a batch stays open until the token is passed to end_batch"]
pub struct BatchToken {
    _private: (),
}

///
/// Store
///
/// The entity store: normalized indexes, a monotonic logical clock, a TX
/// log, batched change notification, and wrapped reads. Single-threaded;
/// every mutation happens in the calling thread.
///

pub struct Store {
    index: Index,
    basis_t: u64,
    observable_basis_t: u64,
    tx_log: Vec<TxReport>,
    batch_depth: usize,
    batch_poisoned: bool,
    batch_label: Option<String>,
    pending: Vec<TxReport>,
    hasher: HasherHandle,
    config: StoreConfig,
    search: Box<dyn SearchIndex>,
    change_sink: Option<Box<dyn ChangeSink>>,
    log: Box<dyn LogSink>,
    ready: bool,
}

impl Store {
    ///
    /// CONSTRUCTION
    ///

    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::new())
    }

    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            index: Index::default(),
            basis_t: 0,
            observable_basis_t: 0,
            tx_log: Vec::new(),
            batch_depth: 0,
            batch_poisoned: false,
            batch_label: None,
            pending: Vec::new(),
            hasher: default_hasher(),
            config,
            search: Box::new(NoopSearchIndex),
            change_sink: None,
            log: Box::new(NoopLogSink),
            ready: true,
        }
    }

    /// Inject the canonical hasher.
    pub fn set_hasher(&mut self, hasher: HasherHandle) {
        self.hasher = hasher;
    }

    /// Attach the search-index adaptor.
    pub fn set_search_index(&mut self, search: Box<dyn SearchIndex>) {
        self.search = search;
    }

    /// Attach the change-notification sink.
    pub fn set_change_sink(&mut self, sink: Box<dyn ChangeSink>) {
        self.change_sink = Some(sink);
    }

    /// Attach the warning sink.
    pub fn set_log_sink(&mut self, log: Box<dyn LogSink>) {
        self.log = log;
    }

    ///
    /// CLOCK & READINESS
    ///

    /// The logical clock: the store version after the latest mutation batch.
    #[must_use]
    pub const fn basis_t(&self) -> u64 {
        self.basis_t
    }

    /// The basis visible to external observers (batches coalesce).
    #[must_use]
    pub const fn observable_basis_t(&self) -> u64 {
        self.observable_basis_t
    }

    /// Readiness probe: has the observable basis reached the target? The
    /// core is single-threaded, so this answers immediately; consumers that
    /// need to wait compose on top of the change sink.
    #[must_use]
    pub const fn after(&self, basis_t: u64) -> bool {
        self.observable_basis_t >= basis_t
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Readiness probe counterpart of `after` for initial load.
    #[must_use]
    pub const fn until_ready(&self) -> bool {
        self.is_ready()
    }

    #[must_use]
    pub fn tx_log(&self) -> &[TxReport] {
        &self.tx_log
    }

    #[must_use]
    pub fn version(&self, ty: &str, id: &str) -> Option<u64> {
        self.index.version(ty, id)
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) const fn index(&self) -> &Index {
        &self.index
    }

    /// Point-in-time diagnostics.
    #[must_use]
    pub fn report(&self) -> StoreReport {
        StoreReport {
            basis_t: self.basis_t,
            entity_counts: self
                .index
                .entities
                .iter()
                .map(|(ty, bucket)| (ty.clone(), bucket.len()))
                .collect(),
            tx_count: self.tx_log.len(),
        }
    }

    ///
    /// MUTATION
    ///

    /// Upsert a batch of root entities. Roots must carry an id and a
    /// concrete type; nested identifiable entities are normalized into
    /// references.
    pub fn add(&mut self, things: &[Value]) -> Result<TxReport, Error> {
        self.guard_writable()?;

        let prepared: Result<Vec<(TxOp, Entity)>, Error> = {
            let mut normalizer = Normalizer::new(&self.index, &self.hasher, self.log.as_ref());
            let mut failure = None;
            for thing in things {
                if let Err(err) = normalizer.normalize_root(thing) {
                    failure = Some(err);
                    break;
                }
            }
            match failure {
                Some(err) => Err(err),
                None => Ok(normalizer.into_changes()),
            }
        };

        let changes = match prepared {
            Ok(changes) => changes,
            Err(err) => {
                self.poison();
                return Err(err);
            }
        };

        Ok(self.commit(BTreeSet::from([TxKind::Upsert]), changes))
    }

    /// Retract a batch of root entities and clean every reference to them.
    pub fn remove(&mut self, things: &[Value]) -> Result<TxReport, Error> {
        self.guard_writable()?;

        let ids = match Self::removal_roots(things) {
            Ok(ids) => ids,
            Err(err) => {
                self.poison();
                return Err(err);
            }
        };

        self.remove_ids(&ids)
    }

    /// Mixed transaction: retract references anywhere in the tree mark
    /// entities for removal and rewrite to tombstones, then the remaining
    /// roots are upserted. Returns the merged report.
    pub fn transact(&mut self, ops: &[Value]) -> Result<TxReport, Error> {
        self.guard_writable()?;

        let mut retract_ids = BTreeSet::new();
        let mut rewritten = Vec::with_capacity(ops.len());
        for op in ops {
            match rewrite_retracts(op, &mut retract_ids) {
                Ok(value) => rewritten.push(value),
                Err(err) => {
                    self.poison();
                    return Err(err);
                }
            }
        }
        let roots: Vec<Value> = rewritten
            .into_iter()
            .filter(|value| value.as_map().is_some())
            .collect();

        let token = self.begin_batch(None);
        let outcome = self
            .remove_ids(&retract_ids)
            .and_then(|removed| Ok(removed.merge(self.add(&roots)?)));
        self.end_batch(token);
        outcome
    }

    /// Clear every index, the log, and the clock.
    pub fn reset(&mut self) {
        self.index.clear();
        self.basis_t = 0;
        self.observable_basis_t = 0;
        self.tx_log.clear();
        self.batch_depth = 0;
        self.batch_poisoned = false;
        self.batch_label = None;
        self.pending.clear();
        self.search.clear();
        self.ready = true;
    }

    ///
    /// BATCHING
    ///

    /// Open one level of batch nesting. While a batch is open, observer
    /// notification is deferred; reads still observe in-progress state.
    pub fn begin_batch(&mut self, label: Option<&str>) -> BatchToken {
        if self.batch_depth == 0 {
            self.batch_label = label.map(ToString::to_string);
        }
        self.batch_depth += 1;
        BatchToken { _private: () }
    }

    /// Close one level of batch nesting; at depth zero the accumulated
    /// reports become observable and are delivered in one notification.
    pub fn end_batch(&mut self, token: BatchToken) {
        drop(token);
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 {
            self.flush_pending();
        }
    }

    /// Run a closure inside a batch; the batch closes on both success and
    /// error.
    pub fn batched<T>(
        &mut self,
        label: Option<&str>,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let token = self.begin_batch(label);
        let outcome = f(self);
        self.end_batch(token);
        outcome
    }

    ///
    /// READS
    ///

    /// Wrapped view of one stored entity. A type hint narrows the lookup.
    #[must_use]
    pub fn get(&self, id: &str, ty: Option<&str>) -> Option<EntityView<'_>> {
        let entity = match ty {
            Some(ty) => self.index.entity_of(ty, id)?,
            None => self.index.entity(id)?,
        };
        Some(EntityView::new(self, entity))
    }

    #[must_use]
    pub fn get_many<'a, I>(&self, ids: I, ty: Option<&str>) -> Vec<EntityView<'_>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .filter_map(|id| self.get(id, ty))
            .collect()
    }

    /// Walk a property path across references, resolving the final value.
    #[must_use]
    pub fn get_reified(&self, id: &str, path: &[&str]) -> Option<Value> {
        let mut current = Value::Ref(Reference::entity(id));
        for segment in path {
            current = match current {
                Value::Ref(r) if r.is_entity() => {
                    self.index.entity(r.id())?.attr(segment)?.clone()
                }
                Value::Map(map) => map.get(*segment)?.clone(),
                _ => return None,
            };
        }
        Some(view::resolve_value(
            self,
            &current,
            self.config.max_resolve_depth,
        ))
    }

    /// Linear scan over stored entities, optionally narrowed to one type.
    #[must_use]
    pub fn filter(
        &self,
        ty: Option<&str>,
        mut predicate: impl FnMut(&EntityView<'_>) -> bool,
    ) -> Vec<EntityView<'_>> {
        let mut out = Vec::new();
        match ty {
            Some(ty) => {
                if let Some(bucket) = self.index.entities.get(ty) {
                    out.extend(bucket.values().map(|e| EntityView::new(self, e)));
                }
            }
            None => out.extend(self.index.iter_entities().map(|e| EntityView::new(self, e))),
        }
        out.retain(|view| predicate(view));
        out
    }

    /// Route a search through the adaptor, then wrap and post-filter hits.
    #[must_use]
    pub fn search(
        &self,
        query: &str,
        params: &SearchParams,
        filter: Option<&dyn Fn(&EntityView<'_>) -> bool>,
    ) -> Vec<EntityView<'_>> {
        let hits = self.search.search(query, params);
        let mut out = Vec::with_capacity(hits.len());
        for (ty, id) in hits {
            let Some(view) = self.get(&id, Some(&ty)) else {
                continue;
            };
            if filter.is_none_or(|keep| keep(&view)) {
                out.push(view);
            }
        }
        out
    }

    /// Compile a query against a materialized snapshot of the store.
    pub fn get_query(&self, query: Query) -> Result<StoreQuery, Error> {
        let compiled = create_query(query)?;
        let entities: Vec<Value> = self
            .index
            .iter_entities()
            .map(|entity| view::reify_entity(self, entity, self.config.max_resolve_depth))
            .collect();
        Ok(StoreQuery {
            compiled,
            entities,
            hasher: self.hasher.clone(),
        })
    }

    /// Compile and immediately run a query.
    pub fn query(&self, query: Query, args: &[Value]) -> Result<ResultSet, Error> {
        self.get_query(query)?.run(args)
    }

    ///
    /// REPLAY
    ///

    /// Rebuild this store by replaying a TX log onto empty state. Replaying
    /// a store's own log yields an equal store.
    pub fn replay_log(&mut self, reports: &[TxReport]) -> Result<(), Error> {
        self.reset();
        for report in reports {
            for (op, entity) in &report.tx_data {
                match op {
                    TxOp::Retract => {
                        self.index.remove(entity.id());
                        self.search.remove(entity.ty(), entity.id());
                    }
                    TxOp::Upsert => {
                        entity.assert_flat()?;
                        self.index.upsert(entity.clone());
                        self.search.upsert(entity);
                    }
                }
            }
            self.basis_t = self.basis_t.max(report.basis_t);
        }
        self.observable_basis_t = self.basis_t;
        self.tx_log = reports.to_vec();
        Ok(())
    }

    // Swap in restored state (used by snapshot restore).
    pub(crate) fn install(&mut self, index: Index, basis_t: u64, tx_log: Vec<TxReport>) {
        self.index = index;
        self.basis_t = basis_t;
        self.observable_basis_t = basis_t;
        self.tx_log = tx_log;
        self.pending.clear();
        self.batch_depth = 0;
        self.batch_poisoned = false;

        self.search.clear();
        let index = &self.index;
        let search = &mut self.search;
        for entity in index.iter_entities() {
            search.upsert(entity);
        }
        self.ready = true;
    }

    ///
    /// INTERNALS
    ///

    fn guard_writable(&self) -> Result<(), Error> {
        if self.batch_poisoned {
            return Err(Error::invalid_argument(
                "batch aborted by an earlier error; close the batch before writing",
            ));
        }
        Ok(())
    }

    fn poison(&mut self) {
        if self.batch_depth > 0 {
            self.batch_poisoned = true;
        }
    }

    // Recognized removal roots carry both an id and a type key.
    fn removal_roots(things: &[Value]) -> Result<BTreeSet<String>, Error> {
        let mut ids = BTreeSet::new();
        for thing in things {
            let map = thing
                .as_map()
                .ok_or_else(|| Error::invalid_argument("retraction entries must be maps"))?;
            let input = EntityInput::parse(map)?;
            let Some(id) = input.id else {
                return Err(Error::missing_id());
            };
            if input.ty.is_none() {
                return Err(Error::missing_type(&id));
            }
            ids.insert(id);
        }
        Ok(ids)
    }

    fn remove_ids(&mut self, ids: &BTreeSet<String>) -> Result<TxReport, Error> {
        self.guard_writable()?;

        let present: BTreeSet<String> = ids
            .iter()
            .filter(|id| self.index.entity(id).is_some())
            .cloned()
            .collect();

        let mut changes: Vec<(TxOp, Entity)> = present
            .iter()
            .filter_map(|id| self.index.entity(id).cloned())
            .map(|entity| (TxOp::Retract, entity))
            .collect();

        // Cascading cleanup: drop every remaining reference to removed ids.
        for entity in self.index.iter_entities() {
            if present.contains(entity.id()) {
                continue;
            }
            if let Some(cleaned) = clean_entity(entity, &present) {
                changes.push((TxOp::Upsert, cleaned));
            }
        }

        Ok(self.commit(BTreeSet::from([TxKind::Retract]), changes))
    }

    fn commit(&mut self, kind: BTreeSet<TxKind>, changes: Vec<(TxOp, Entity)>) -> TxReport {
        if !changes.is_empty() {
            self.basis_t += 1;
        }

        for (op, entity) in &changes {
            match op {
                TxOp::Retract => {
                    self.index.remove(entity.id());
                    self.search.remove(entity.ty(), entity.id());
                }
                TxOp::Upsert => {
                    self.index.upsert(entity.clone());
                    self.search.upsert(entity);
                }
            }
        }

        let report = TxReport::new(
            self.basis_t,
            kind,
            changes,
            TxMetadata::now(self.batch_label.clone()),
        );
        self.tx_log.push(report.clone());

        if self.batch_depth == 0 {
            self.observable_basis_t = self.basis_t;
            if let Some(sink) = &self.change_sink {
                sink.notify(std::slice::from_ref(&report));
            }
        } else {
            self.pending.push(report.clone());
        }

        report
    }

    fn flush_pending(&mut self) {
        self.observable_basis_t = self.basis_t;
        self.batch_poisoned = false;
        self.batch_label = None;
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        if let Some(sink) = &self.change_sink {
            sink.notify(&pending);
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

///
/// StoreQuery
///
/// A compiled query bound to a materialized snapshot of store entities.
///

pub struct StoreQuery {
    compiled: CompiledQuery,
    entities: Vec<Value>,
    hasher: HasherHandle,
}

impl StoreQuery {
    #[must_use]
    pub const fn compiled(&self) -> &CompiledQuery {
        &self.compiled
    }

    /// Execute against the captured snapshot.
    pub fn run(&self, args: &[Value]) -> Result<ResultSet, Error> {
        self.run_with(args, &QueryOptions::default())
    }

    /// Execute with per-run option overrides.
    pub fn run_with(&self, args: &[Value], options: &QueryOptions) -> Result<ResultSet, Error> {
        let mut options = options.clone();
        if options.hasher.is_none() {
            options.hasher = Some(self.hasher.clone());
        }
        run_query(&self.compiled, &self.entities, args, &options)
    }
}

// Rewrite retract references to tombstones, collecting the retracted ids.
// A wildcard retract is invalid anywhere in the tree.
fn rewrite_retracts(value: &Value, ids: &mut BTreeSet<String>) -> Result<Value, Error> {
    match value {
        Value::Ref(r) if r.is_retract() => {
            if r.is_wildcard() {
                return Err(Error::invalid_argument(
                    "wildcard retract reference is not allowed",
                ));
            }
            ids.insert(r.id().to_string());
            Ok(Value::Ref(Reference::tombstone(r.id())))
        }
        Value::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| rewrite_retracts(item, ids))
                .collect::<Result<_, _>>()?,
        )),
        Value::Map(entries) => Ok(Value::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), rewrite_retracts(v, ids)?)))
                .collect::<Result<_, _>>()?,
        )),
        other => Ok(other.clone()),
    }
}

// Drop references to removed ids from one entity: array elements compact,
// scalar reference attributes clear. None when nothing changed.
fn clean_entity(entity: &Entity, removed: &BTreeSet<String>) -> Option<Entity> {
    let mut cleaned = entity.clone();
    let keys: Vec<String> = cleaned.attrs().keys().cloned().collect();
    for key in keys {
        let Some(value) = cleaned.attr(&key).cloned() else {
            continue;
        };
        match clean_value(&value, removed) {
            Some(next) => {
                cleaned.set_attr(key, next);
            }
            None => {
                cleaned.remove_attr(&key);
            }
        }
    }

    (cleaned != *entity).then_some(cleaned)
}

fn clean_value(value: &Value, removed: &BTreeSet<String>) -> Option<Value> {
    match value {
        Value::Ref(r) if removed.contains(r.id()) => None,
        Value::List(items) => Some(Value::List(
            items
                .iter()
                .filter_map(|item| clean_value(item, removed))
                .collect(),
        )),
        Value::Map(entries) => Some(Value::Map(
            entries
                .iter()
                .filter_map(|(k, v)| clean_value(v, removed).map(|v| (k.clone(), v)))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

///
/// TESTS
///
