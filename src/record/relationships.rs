//! Relationship wrappers handed out by [`Model::has_one`] and
//! [`Model::has_many`]. Arity is checked when the wrapper is created.

use super::model::Model;
use crate::error::Result;
use crate::types::RecordIdentity;
use std::sync::Arc;

/// A `hasOne` relationship of one model.
#[derive(Clone, Debug)]
pub struct HasOne {
    model: Arc<Model>,
    name: String,
}

impl HasOne {
    pub(crate) fn new(model: Arc<Model>, name: String) -> Self {
        Self { model, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current related model, from the cache.
    pub fn value(&self) -> Option<Arc<Model>> {
        self.model.related_record(&self.name)
    }

    pub fn id(&self) -> Option<RecordIdentity> {
        self.value().map(|related| related.identity().clone())
    }

    /// Durable read; overwrites the cached value.
    pub async fn load(&self) -> Result<Option<Arc<Model>>> {
        self.model.load_has_one(&self.name).await
    }

    pub async fn set(&self, related: Option<&Model>) -> Result<()> {
        let related = related.map(|model| model.identity().clone());
        self.model.set_has_one(&self.name, related).await
    }
}

/// A `hasMany` relationship of one model.
#[derive(Clone, Debug)]
pub struct HasMany {
    model: Arc<Model>,
    name: String,
}

impl HasMany {
    pub(crate) fn new(model: Arc<Model>, name: String) -> Self {
        Self { model, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current related models, from the cache.
    pub fn value(&self) -> Vec<Arc<Model>> {
        self.model.related_records(&self.name)
    }

    pub fn ids(&self) -> Vec<RecordIdentity> {
        self.value()
            .iter()
            .map(|related| related.identity().clone())
            .collect()
    }

    /// Durable read; overwrites the cached value.
    pub async fn load(&self) -> Result<Vec<Arc<Model>>> {
        self.model.load_has_many(&self.name).await
    }

    pub async fn add(&self, related: &Model) -> Result<()> {
        self.model.add_to_has_many(&self.name, related.identity()).await
    }

    pub async fn remove(&self, related: &Model) -> Result<()> {
        self.model
            .remove_from_has_many(&self.name, related.identity())
            .await
    }

    pub async fn replace(&self, related: &[Arc<Model>]) -> Result<()> {
        let related = related.iter().map(|model| model.identity().clone()).collect();
        self.model.set_has_many(&self.name, related).await
    }
}
