//! Store façade tying source, identity map and models together.

use crate::cache::Cache;
use crate::changes::{changes_for_event, compute_changes};
use crate::error::{CacheError, Result};
use crate::identity_map::{IdentityMap, IdentityMapFactory, SharedIdentityMap};
use crate::live_query::LiveQuery;
use crate::normalize::normalize_record_properties;
use crate::operation::Operation;
use crate::query::{QueryExpression, QueryResult};
use crate::record::Model;
use crate::schema::Schema;
use crate::scope::StoreScope;
use crate::source::{ListenerId, Source, SourceEvent};
use crate::subscriptions::{ChangeStream, Subscription};
use crate::types::{Attributes, RecordIdentity};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Evict a model from the identity map when a removal of its record is
    /// observed on the source. `remove_record` and `Model::delete_record`
    /// always evict.
    pub evict_on_remove: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            evict_on_remove: true,
        }
    }
}

/// Materialized query result.
#[derive(Clone, Debug)]
pub enum ModelResult {
    Record(Option<Arc<Model>>),
    Records(Vec<Arc<Model>>),
}

impl ModelResult {
    /// The single model (the first one for collection results).
    pub fn into_record(self) -> Option<Arc<Model>> {
        match self {
            ModelResult::Record(model) => model,
            ModelResult::Records(models) => models.into_iter().next(),
        }
    }

    pub fn into_records(self) -> Vec<Arc<Model>> {
        match self {
            ModelResult::Record(model) => model.into_iter().collect(),
            ModelResult::Records(models) => models,
        }
    }
}

/// Increments a busy counter for as long as it lives.
struct BusyGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> BusyGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// State shared by the store handle, its cache surface, live queries and
/// (weakly) its models.
pub(crate) struct StoreInner {
    pub(crate) source: Arc<dyn Source>,
    pub(crate) schema: Arc<Schema>,
    config: StoreConfig,
    identity_map: SharedIdentityMap<Arc<Model>>,
    factory: Option<Arc<IdentityMapFactory<Arc<Model>>>>,
    loading: AtomicUsize,
    saving: AtomicUsize,
    listener: Mutex<Option<ListenerId>>,
}

impl StoreInner {
    fn open(
        source: Arc<dyn Source>,
        config: StoreConfig,
        factory: Option<Arc<IdentityMapFactory<Arc<Model>>>>,
    ) -> Arc<Self> {
        let identity_map = match &factory {
            Some(factory) => factory.get(&source),
            None => Arc::new(Mutex::new(IdentityMap::new())),
        };

        let inner = Arc::new(Self {
            schema: source.schema(),
            source,
            config,
            identity_map,
            factory,
            loading: AtomicUsize::new(0),
            saving: AtomicUsize::new(0),
            listener: Mutex::new(None),
        });

        // The listener holds the store weakly; the store unregisters it on drop.
        let weak = Arc::downgrade(&inner);
        let id = inner.source.subscribe(Arc::new(move |event: &SourceEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        }));
        *inner.listener.lock() = Some(id);

        inner
    }

    /// The model for `identity`, materialized on first request.
    pub(crate) fn lookup(self: &Arc<Self>, identity: &RecordIdentity) -> Result<Arc<Model>> {
        let definition = self.schema.require_model(&identity.record_type)?;

        let mut map = self.identity_map.lock();
        if let Some(model) = map.get(identity) {
            // The map may be shared with stores that have since been dropped.
            model.attach(self);
            return Ok(model);
        }

        let model = Arc::new(Model::new(identity.clone(), definition, self));
        map.set(identity, Arc::clone(&model));
        Ok(model)
    }

    pub(crate) fn materialize(self: &Arc<Self>, result: QueryResult) -> Result<ModelResult> {
        Ok(match result {
            QueryResult::Record(identity) => {
                ModelResult::Record(identity.map(|identity| self.lookup(&identity)).transpose()?)
            }
            QueryResult::Records(identities) => ModelResult::Records(
                identities
                    .iter()
                    .map(|identity| self.lookup(identity))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Synchronous query against the source's current state.
    pub(crate) fn query_cache(self: &Arc<Self>, expression: &QueryExpression) -> Result<ModelResult> {
        let result = self.source.query_sync(expression)?;
        self.materialize(result)
    }

    /// Durable query, counted as loading until it settles.
    pub(crate) async fn query(self: &Arc<Self>, expression: QueryExpression) -> Result<ModelResult> {
        let result = {
            let _loading = BusyGuard::enter(&self.loading);
            self.source.query(expression).await?
        };
        self.materialize(result)
    }

    /// Submit operations, counted as saving until they settle.
    pub(crate) async fn update(&self, operations: Vec<Operation>) -> Result<Vec<Operation>> {
        let _saving = BusyGuard::enter(&self.saving);
        self.source.update(operations).await
    }

    pub(crate) fn evict(&self, identity: &RecordIdentity) -> bool {
        let evicted = self.identity_map.lock().delete(identity);
        if evicted {
            tracing::trace!(record = %identity, "model evicted");
        }
        evicted
    }

    /// Check that a query names known models and relationships of the right
    /// arity, without running it.
    pub(crate) fn validate_query(&self, expression: &QueryExpression) -> Result<()> {
        use crate::schema::RelationshipKind;

        match expression {
            QueryExpression::FindRecord { record } => {
                self.schema.require_model(&record.record_type)?;
            }
            QueryExpression::FindRecords { record_type, .. } => {
                self.schema.require_model(record_type)?;
            }
            QueryExpression::FindRelatedRecord {
                record,
                relationship,
            } => {
                self.schema
                    .relationship_of_kind(&record.record_type, relationship, RelationshipKind::HasOne)?;
            }
            QueryExpression::FindRelatedRecords {
                record,
                relationship,
            } => {
                self.schema
                    .relationship_of_kind(&record.record_type, relationship, RelationshipKind::HasMany)?;
            }
        }
        Ok(())
    }

    fn handle_event(&self, event: &SourceEvent) {
        match event {
            SourceEvent::Reset => {
                let models: Vec<Arc<Model>> = self.identity_map.lock().values().cloned().collect();
                tracing::debug!(models = models.len(), "source reset, invalidating every model");
                for model in models {
                    model.invalidate_all();
                }
            }
            SourceEvent::Patch(operation) => {
                let subject = operation.identity();
                for model in self.affected_models(operation) {
                    // A record that reappears has nothing valid cached.
                    if let Operation::AddRecord { record } = operation {
                        if &record.identity == model.identity() {
                            model.invalidate_all();
                            continue;
                        }
                    }

                    // Related reads only report records that exist, so a
                    // hasOne link can resolve or dangle without being written.
                    if operation.is_membership_change() && model.identity() != subject {
                        if let Some(definition) = self.schema.model(model.record_type()) {
                            for name in definition.has_one_targeting(&subject.record_type) {
                                model.invalidate(name);
                            }
                        }
                    }

                    let Some(change) = compute_changes(Some(model.identity()), operation, &self.schema) else {
                        continue;
                    };

                    if change.is_removal() {
                        model.invalidate_all();
                        if self.config.evict_on_remove {
                            self.evict(model.identity());
                        }
                    } else {
                        model.notify_property_changes(change.properties());
                    }
                }
            }
        }
    }

    /// Tracked models an operation may affect: its own record, plus for
    /// additions and removals every model related to records of that type.
    fn affected_models(&self, operation: &Operation) -> Vec<Arc<Model>> {
        let map = self.identity_map.lock();
        let subject = operation.identity();
        let mut models: Vec<Arc<Model>> = map.get(subject).into_iter().collect();

        if operation.is_membership_change() {
            models.extend(
                map.values()
                    .filter(|model| model.identity() != subject)
                    .filter(|model| {
                        self.schema
                            .model(&model.identity().record_type)
                            .map_or(false, |definition| {
                                definition
                                    .has_many_targeting(&subject.record_type)
                                    .chain(definition.has_one_targeting(&subject.record_type))
                                    .next()
                                    .is_some()
                            })
                    })
                    .cloned(),
            );
        }

        models
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(id) = self.listener.lock().take() {
            self.source.unsubscribe(id);
        }
    }
}

/// The store façade.
///
/// Provides:
/// - Durable (async) queries that materialize identity-mapped models
/// - A synchronous [`Cache`] surface over the source's current state
/// - Record creation, update and removal
/// - Forking and merging
/// - Busy-state tracking and change streams
///
/// Cloning a `Store` yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Open a store over `source` with the default configuration.
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self::with_config(source, StoreConfig::default())
    }

    pub fn with_config(source: Arc<dyn Source>, config: StoreConfig) -> Self {
        Self {
            inner: StoreInner::open(source, config, None),
        }
    }

    /// Open a store whose identity maps come from `factory`: stores over the
    /// same source share one map, and forks get their own.
    pub fn with_identity_maps(
        source: Arc<dyn Source>,
        config: StoreConfig,
        factory: Arc<IdentityMapFactory<Arc<Model>>>,
    ) -> Self {
        Self {
            inner: StoreInner::open(source, config, Some(factory)),
        }
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.inner.source
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Synchronous read surface.
    pub fn cache(&self) -> Cache {
        Cache::new(Arc::clone(&self.inner))
    }

    /// Query builder for one record type.
    pub fn scope(&self, record_type: impl Into<String>) -> StoreScope {
        StoreScope::new(self.clone(), record_type.into())
    }

    // --- Queries ---

    pub async fn query(&self, expression: QueryExpression) -> Result<ModelResult> {
        self.inner.query(expression).await
    }

    pub async fn find_record(&self, identity: &RecordIdentity) -> Result<Option<Arc<Model>>> {
        Ok(self
            .query(QueryExpression::find_record(identity.clone()))
            .await?
            .into_record())
    }

    pub async fn find_records(&self, record_type: &str) -> Result<Vec<Arc<Model>>> {
        Ok(self
            .query(QueryExpression::find_records(record_type))
            .await?
            .into_records())
    }

    pub async fn find_related_record(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Option<Arc<Model>>> {
        Ok(self
            .query(QueryExpression::find_related_record(identity.clone(), relationship))
            .await?
            .into_record())
    }

    pub async fn find_related_records(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Vec<Arc<Model>>> {
        Ok(self
            .query(QueryExpression::find_related_records(identity.clone(), relationship))
            .await?
            .into_records())
    }

    /// Run the durable query, then return a live view over the cache.
    pub async fn live_query(&self, expression: QueryExpression) -> Result<LiveQuery> {
        self.inner.query(expression.clone()).await?;
        self.cache().live_query(expression)
    }

    // --- Mutations ---

    /// Create a record from a flat property map (`type`, optional `id`,
    /// attribute, key and relationship values).
    pub async fn add_record(&self, properties: Attributes) -> Result<Arc<Model>> {
        let record_type = properties
            .get("type")
            .and_then(|value| value.as_str())
            .ok_or_else(|| CacheError::InvalidOperation("record properties need a `type`".into()))?
            .to_string();

        let record = normalize_record_properties(&self.inner.schema, &record_type, &properties)?;
        let identity = record.identity.clone();
        tracing::debug!(record = %identity, "adding record");

        self.inner.update(vec![Operation::add_record(record)]).await?;
        self.inner.lookup(&identity)
    }

    /// Replace the given attributes of a record.
    pub async fn update_record(
        &self,
        identity: &RecordIdentity,
        attributes: Attributes,
    ) -> Result<Arc<Model>> {
        let operations = attributes
            .into_iter()
            .map(|(name, value)| Operation::replace_attribute(identity.clone(), name, value))
            .collect::<Vec<_>>();
        tracing::debug!(record = %identity, attributes = operations.len(), "updating record");

        self.inner.update(operations).await?;
        self.inner.lookup(identity)
    }

    /// Remove a record and evict its model.
    pub async fn remove_record(&self, identity: &RecordIdentity) -> Result<()> {
        tracing::debug!(record = %identity, "removing record");
        self.inner
            .update(vec![Operation::remove_record(identity.clone())])
            .await?;
        self.inner.evict(identity);
        Ok(())
    }

    /// Submit raw operations.
    pub async fn update(&self, operations: Vec<Operation>) -> Result<Vec<Operation>> {
        self.inner.update(operations).await
    }

    // --- Branching ---

    /// Fork into an independent store with its own source branch and its
    /// own identity map.
    pub fn fork(&self) -> Store {
        let source = self.inner.source.fork();
        tracing::debug!("store forked");
        Self {
            inner: StoreInner::open(source, self.inner.config.clone(), self.inner.factory.clone()),
        }
    }

    /// Apply every operation `other` accumulated since it was forked.
    pub async fn merge(&self, other: &Store) -> Result<Vec<Operation>> {
        let _saving = BusyGuard::enter(&self.inner.saving);
        let applied = self.inner.source.merge(other.inner.source.as_ref()).await?;
        tracing::debug!(operations = applied.len(), "store merged");
        Ok(applied)
    }

    // --- Change streams ---

    /// Stream of change sets for `identity`, or for every record when `None`.
    ///
    /// A stream for one identity completes after delivering the removal of
    /// that record.
    pub fn changes(&self, identity: Option<&RecordIdentity>) -> ChangeStream {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let sender = Mutex::new(Some(sender));
        let target = identity.cloned();
        let schema = Arc::clone(&self.inner.schema);

        let id = self.inner.source.subscribe(Arc::new(move |event: &SourceEvent| {
            let Some(change) = changes_for_event(target.as_ref(), event, &schema) else {
                return;
            };
            let terminal = target.is_some() && change.is_removal();

            let mut slot = sender.lock();
            if let Some(sender) = slot.as_ref() {
                let _ = sender.send(change);
            }
            if terminal {
                slot.take();
            }
        }));

        ChangeStream::new(receiver, Subscription::new(id, Arc::clone(&self.inner.source)))
    }

    // --- Busy state ---

    pub fn loading_count(&self) -> usize {
        self.inner.loading.load(Ordering::SeqCst)
    }

    pub fn saving_count(&self) -> usize {
        self.inner.saving.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.loading_count() > 0
    }

    pub fn is_saving(&self) -> bool {
        self.saving_count() > 0
    }

    pub fn is_idle(&self) -> bool {
        !self.is_loading() && !self.is_saving()
    }

    /// Number of models currently held by the identity map.
    pub fn tracked_models(&self) -> usize {
        self.inner.identity_map.lock().len()
    }

    /// Drop a model from the identity map. The next lookup materializes a
    /// fresh instance.
    pub fn evict(&self, identity: &RecordIdentity) -> bool {
        self.inner.evict(identity)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("tracked_models", &self.tracked_models())
            .field("loading", &self.loading_count())
            .field("saving", &self.saving_count())
            .finish()
    }
}
