//! Model instances and their lazily filled field cache.

use super::relationships::{HasMany, HasOne};
use crate::error::{CacheError, Result};
use crate::operation::Operation;
use crate::query::QueryExpression;
use crate::schema::{ModelDefinition, RelationshipKind};
use crate::store::{ModelResult, StoreInner};
use crate::types::{Attributes, RecordIdentity};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Kind of a field in a model's field table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Attribute,
    Key,
    HasOne,
    HasMany,
}

/// A computed field value.
#[derive(Clone)]
pub enum FieldValue {
    Attribute(Option<Value>),
    Key(Option<String>),
    HasOne(Option<Arc<Model>>),
    HasMany(Vec<Arc<Model>>),
}

impl FieldValue {
    pub fn as_attribute(&self) -> Option<&Value> {
        match self {
            FieldValue::Attribute(value) => value.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Attribute(value) => f.debug_tuple("Attribute").field(value).finish(),
            FieldValue::Key(value) => f.debug_tuple("Key").field(value).finish(),
            FieldValue::HasOne(model) => f
                .debug_tuple("HasOne")
                .field(&model.as_ref().map(|m| m.identity()))
                .finish(),
            FieldValue::HasMany(models) => f
                .debug_tuple("HasMany")
                .field(&models.iter().map(|m| m.identity()).collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Field cache. `epoch` moves on every invalidation so a value computed
/// before an invalidation is never stored after it.
#[derive(Default)]
struct FieldCache {
    values: HashMap<String, FieldValue>,
    epoch: u64,
}

/// Materialized record.
///
/// One instance exists per identity per identity map. Field values are read
/// through from the source on first access and cached until a change
/// notification invalidates them. Reads never fail: a missing record,
/// field or store reads as empty.
///
/// Stores that share an identity map share its models; a model stays
/// connected while any of them is alive.
pub struct Model {
    identity: RecordIdentity,
    fields: HashMap<String, FieldKind>,
    cache: Mutex<FieldCache>,
    stores: Mutex<Vec<Weak<StoreInner>>>,
}

impl Model {
    pub(crate) fn new(identity: RecordIdentity, definition: &ModelDefinition, store: &Arc<StoreInner>) -> Self {
        let mut fields = HashMap::new();
        for name in definition.attributes.keys() {
            fields.insert(name.clone(), FieldKind::Attribute);
        }
        for name in definition.keys.keys() {
            fields.insert(name.clone(), FieldKind::Key);
        }
        for (name, relationship) in &definition.relationships {
            let kind = match relationship.kind {
                RelationshipKind::HasOne => FieldKind::HasOne,
                RelationshipKind::HasMany => FieldKind::HasMany,
            };
            fields.insert(name.clone(), kind);
        }

        Self {
            identity,
            fields,
            cache: Mutex::new(FieldCache::default()),
            stores: Mutex::new(vec![Arc::downgrade(store)]),
        }
    }

    pub fn identity(&self) -> &RecordIdentity {
        &self.identity
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn record_type(&self) -> &str {
        &self.identity.record_type
    }

    /// Kind of a declared field.
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).copied()
    }

    /// Declared field names, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether any store behind this model is still alive.
    pub fn is_connected(&self) -> bool {
        self.stores.lock().iter().any(|store| store.strong_count() > 0)
    }

    /// Record `store` as another owner of this model, forgetting dropped ones.
    pub(crate) fn attach(&self, store: &Arc<StoreInner>) {
        let mut stores = self.stores.lock();
        stores.retain(|owner| owner.strong_count() > 0);
        if !stores.iter().any(|owner| std::ptr::eq(owner.as_ptr(), Arc::as_ptr(store))) {
            stores.push(Arc::downgrade(store));
        }
    }

    fn live_store(&self) -> Option<Arc<StoreInner>> {
        self.stores.lock().iter().find_map(Weak::upgrade)
    }

    fn store(&self) -> Result<Arc<StoreInner>> {
        self.live_store().ok_or(CacheError::StoreDropped)
    }

    // --- Reads ---

    /// Read any declared field through the field table.
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        Some(match self.field_kind(name)? {
            FieldKind::Attribute => FieldValue::Attribute(self.attribute(name)),
            FieldKind::Key => FieldValue::Key(self.key(name)),
            FieldKind::HasOne => FieldValue::HasOne(self.related_record(name)),
            FieldKind::HasMany => FieldValue::HasMany(self.related_records(name)),
        })
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        match self.cached_or(name, |store| {
            let value = store
                .source
                .record_snapshot(&self.identity)
                .and_then(|mut record| record.attributes.remove(name));
            Some(FieldValue::Attribute(value))
        }) {
            Some(FieldValue::Attribute(value)) => value,
            _ => None,
        }
    }

    pub fn key(&self, name: &str) -> Option<String> {
        match self.cached_or(name, |store| {
            let value = store
                .source
                .record_snapshot(&self.identity)
                .and_then(|mut record| record.keys.remove(name));
            Some(FieldValue::Key(value))
        }) {
            Some(FieldValue::Key(value)) => value,
            _ => None,
        }
    }

    /// Related model of a `hasOne` relationship, from the cache.
    pub fn related_record(&self, name: &str) -> Option<Arc<Model>> {
        let expression = QueryExpression::find_related_record(self.identity.clone(), name);
        match self.cached_or(name, |store| {
            self.read_related(store, &expression)
                .map(|result| FieldValue::HasOne(result.into_record()))
        }) {
            Some(FieldValue::HasOne(model)) => model,
            _ => None,
        }
    }

    /// Related models of a `hasMany` relationship, from the cache.
    pub fn related_records(&self, name: &str) -> Vec<Arc<Model>> {
        let expression = QueryExpression::find_related_records(self.identity.clone(), name);
        match self.cached_or(name, |store| {
            self.read_related(store, &expression)
                .map(|result| FieldValue::HasMany(result.into_records()))
        }) {
            Some(FieldValue::HasMany(models)) => models,
            _ => Vec::new(),
        }
    }

    fn read_related(
        &self,
        store: &Arc<StoreInner>,
        expression: &QueryExpression,
    ) -> Option<ModelResult> {
        match store.query_cache(expression) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::warn!(record = %self.identity, error = %err, "relationship read failed");
                None
            }
        }
    }

    /// Cached value of `name`, or compute it with `read` and cache it.
    ///
    /// The cache lock is not held while `read` runs. `read` returning `None`
    /// leaves the cache untouched.
    fn cached_or<F>(&self, name: &str, read: F) -> Option<FieldValue>
    where
        F: FnOnce(&Arc<StoreInner>) -> Option<FieldValue>,
    {
        let epoch = {
            let cache = self.cache.lock();
            if let Some(value) = cache.values.get(name) {
                return Some(value.clone());
            }
            cache.epoch
        };

        let store = self.live_store()?;
        let value = read(&store)?;

        let mut cache = self.cache.lock();
        if cache.epoch == epoch {
            cache.values.insert(name.to_string(), value.clone());
        }
        Some(value)
    }

    fn write_field(&self, name: &str, value: FieldValue) {
        self.cache.lock().values.insert(name.to_string(), value);
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.lock().values.contains_key(name)
    }

    // --- Invalidation ---

    pub fn invalidate(&self, name: &str) {
        let mut cache = self.cache.lock();
        cache.values.remove(name);
        cache.epoch += 1;
    }

    pub fn invalidate_all(&self) {
        let mut cache = self.cache.lock();
        cache.values.clear();
        cache.epoch += 1;
    }

    /// Invalidate the named fields; an empty list invalidates every field.
    pub fn notify_property_changes(&self, properties: &[String]) {
        if properties.is_empty() {
            self.invalidate_all();
            return;
        }

        let mut cache = self.cache.lock();
        for name in properties {
            cache.values.remove(name);
        }
        cache.epoch += 1;
        tracing::trace!(record = %self.identity, ?properties, "fields invalidated");
    }

    // --- Relationship wrappers ---

    /// Wrapper for a `hasOne` relationship. Fails if `name` is not one.
    pub fn has_one(self: &Arc<Self>, name: &str) -> Result<HasOne> {
        self.check_relationship(name, RelationshipKind::HasOne)?;
        Ok(HasOne::new(Arc::clone(self), name.to_string()))
    }

    /// Wrapper for a `hasMany` relationship. Fails if `name` is not one.
    pub fn has_many(self: &Arc<Self>, name: &str) -> Result<HasMany> {
        self.check_relationship(name, RelationshipKind::HasMany)?;
        Ok(HasMany::new(Arc::clone(self), name.to_string()))
    }

    fn check_relationship(&self, name: &str, expected: RelationshipKind) -> Result<()> {
        let expected_field = match expected {
            RelationshipKind::HasOne => FieldKind::HasOne,
            RelationshipKind::HasMany => FieldKind::HasMany,
        };

        match self.field_kind(name) {
            Some(kind) if kind == expected_field => Ok(()),
            Some(FieldKind::HasOne | FieldKind::HasMany) => Err(CacheError::InvalidRelationship {
                model: self.identity.record_type.clone(),
                relationship: name.to_string(),
                expected,
            }),
            _ => Err(CacheError::UnknownRelationship {
                model: self.identity.record_type.clone(),
                relationship: name.to_string(),
            }),
        }
    }

    // --- Mutations ---

    /// Write the field cache now, then replace the attribute on the source.
    pub fn set_attribute(&self, name: &str, value: Value) -> BoxFuture<'static, Result<()>> {
        self.write_field(name, FieldValue::Attribute(Some(value.clone())));

        let operation = Operation::replace_attribute(self.identity.clone(), name, value);
        let store = self.store();
        Box::pin(async move {
            store?.update(vec![operation]).await?;
            Ok(())
        })
    }

    /// `set_attribute` for every entry; resolves once all have settled.
    pub fn update(&self, properties: Attributes) -> BoxFuture<'static, Result<()>> {
        let pending: Vec<_> = properties
            .into_iter()
            .map(|(name, value)| self.set_attribute(&name, value))
            .collect();

        Box::pin(async move {
            futures::future::try_join_all(pending).await?;
            Ok(())
        })
    }

    /// Replace the cached `hasOne` value with a fresh durable read.
    pub async fn load_has_one(&self, name: &str) -> Result<Option<Arc<Model>>> {
        self.check_relationship(name, RelationshipKind::HasOne)?;
        let store = self.store()?;
        let related = store
            .query(QueryExpression::find_related_record(self.identity.clone(), name))
            .await?
            .into_record();

        self.write_field(name, FieldValue::HasOne(related.clone()));
        Ok(related)
    }

    /// Replace the cached `hasMany` value with a fresh durable read.
    pub async fn load_has_many(&self, name: &str) -> Result<Vec<Arc<Model>>> {
        self.check_relationship(name, RelationshipKind::HasMany)?;
        let store = self.store()?;
        let related = store
            .query(QueryExpression::find_related_records(self.identity.clone(), name))
            .await?
            .into_records();

        self.write_field(name, FieldValue::HasMany(related.clone()));
        Ok(related)
    }

    pub async fn add_to_has_many(&self, name: &str, related: &RecordIdentity) -> Result<()> {
        self.check_relationship(name, RelationshipKind::HasMany)?;
        self.submit(Operation::add_to_related_records(
            self.identity.clone(),
            name,
            related.clone(),
        ))
        .await
    }

    pub async fn remove_from_has_many(&self, name: &str, related: &RecordIdentity) -> Result<()> {
        self.check_relationship(name, RelationshipKind::HasMany)?;
        self.submit(Operation::remove_from_related_records(
            self.identity.clone(),
            name,
            related.clone(),
        ))
        .await
    }

    pub async fn set_has_many(&self, name: &str, related: Vec<RecordIdentity>) -> Result<()> {
        self.check_relationship(name, RelationshipKind::HasMany)?;
        self.submit(Operation::replace_related_records(self.identity.clone(), name, related))
            .await
    }

    pub async fn set_has_one(&self, name: &str, related: Option<RecordIdentity>) -> Result<()> {
        self.check_relationship(name, RelationshipKind::HasOne)?;
        self.submit(Operation::replace_related_record(self.identity.clone(), name, related))
            .await
    }

    /// Remove the record from the source, then evict this model.
    pub async fn delete_record(&self) -> Result<()> {
        let store = self.store()?;
        store
            .update(vec![Operation::remove_record(self.identity.clone())])
            .await?;
        store.evict(&self.identity);
        Ok(())
    }

    async fn submit(&self, operation: Operation) -> Result<()> {
        self.store()?.update(vec![operation]).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut cached: Vec<String> = self.cache.lock().values.keys().cloned().collect();
        cached.sort_unstable();
        f.debug_struct("Model")
            .field("identity", &self.identity)
            .field("cached", &cached)
            .finish()
    }
}
