//! Typed query builders.
//!
//! `store.scope("person")` and `cache.scope("person")` build a collection
//! query for one record type. The store form runs durable (async) queries;
//! the cache form runs synchronous ones and is the only one that can produce
//! a live view.

use crate::cache::Cache;
use crate::error::Result;
use crate::live_query::LiveQuery;
use crate::query::{AttributeFilter, FilterOp, QueryExpression, SortSpecifier};
use crate::record::Model;
use crate::store::Store;
use crate::types::RecordIdentity;
use serde_json::Value;
use std::sync::Arc;

/// Query builder over a read surface `S`.
#[derive(Clone, Debug)]
pub struct Scope<S> {
    surface: S,
    record_type: String,
    filter: Vec<AttributeFilter>,
    sort: Vec<SortSpecifier>,
}

pub type StoreScope = Scope<Store>;
pub type CacheScope = Scope<Cache>;

impl<S> Scope<S> {
    pub(crate) fn new(surface: S, record_type: String) -> Self {
        Self {
            surface,
            record_type,
            filter: Vec::new(),
            sort: Vec::new(),
        }
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn filter(mut self, term: AttributeFilter) -> Self {
        self.filter.push(term);
        self
    }

    /// Shorthand for an equality filter.
    pub fn where_eq(self, attribute: impl Into<String>, value: Value) -> Self {
        self.filter(AttributeFilter::new(attribute, FilterOp::Equal, value))
    }

    pub fn sort(mut self, term: SortSpecifier) -> Self {
        self.sort.push(term);
        self
    }

    /// The collection query this scope describes.
    pub fn expression(&self) -> QueryExpression {
        QueryExpression::FindRecords {
            record_type: self.record_type.clone(),
            filter: self.filter.clone(),
            sort: self.sort.clone(),
        }
    }

    fn identity(&self, id: &str) -> RecordIdentity {
        RecordIdentity::new(self.record_type.as_str(), id)
    }
}

impl Scope<Store> {
    pub async fn all(&self) -> Result<Vec<Arc<Model>>> {
        Ok(self.surface.query(self.expression()).await?.into_records())
    }

    pub async fn find(&self, id: &str) -> Result<Option<Arc<Model>>> {
        self.surface.find_record(&self.identity(id)).await
    }
}

impl Scope<Cache> {
    pub fn all(&self) -> Result<Vec<Arc<Model>>> {
        Ok(self.surface.query(&self.expression())?.into_records())
    }

    pub fn find(&self, id: &str) -> Result<Option<Arc<Model>>> {
        self.surface.find_record(&self.identity(id))
    }

    pub fn live(&self) -> Result<LiveQuery> {
        self.surface.live_query(self.expression())
    }
}
