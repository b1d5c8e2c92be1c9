//! Synchronous read surface of a store.
//!
//! Every call here reads the source's current in-memory state and returns
//! immediately. Results are materialized through the store's identity map,
//! so they are the same model instances the async surface returns.

use crate::error::Result;
use crate::live_query::LiveQuery;
use crate::query::QueryExpression;
use crate::record::Model;
use crate::scope::CacheScope;
use crate::store::{ModelResult, StoreInner};
use crate::types::{Record, RecordIdentity};
use std::sync::Arc;

/// Synchronous view of a store. Cheap to clone.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<StoreInner>,
}

impl Cache {
    pub(crate) fn new(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    pub fn query(&self, expression: &QueryExpression) -> Result<ModelResult> {
        self.inner.query_cache(expression)
    }

    pub fn find_record(&self, identity: &RecordIdentity) -> Result<Option<Arc<Model>>> {
        Ok(self
            .query(&QueryExpression::find_record(identity.clone()))?
            .into_record())
    }

    pub fn find_records(&self, record_type: &str) -> Result<Vec<Arc<Model>>> {
        Ok(self
            .query(&QueryExpression::find_records(record_type))?
            .into_records())
    }

    pub fn find_related_record(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Option<Arc<Model>>> {
        Ok(self
            .query(&QueryExpression::find_related_record(identity.clone(), relationship))?
            .into_record())
    }

    pub fn find_related_records(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Vec<Arc<Model>>> {
        Ok(self
            .query(&QueryExpression::find_related_records(identity.clone(), relationship))?
            .into_records())
    }

    /// Raw record as the source currently holds it.
    pub fn peek_record(&self, identity: &RecordIdentity) -> Option<Record> {
        self.inner.source.record_snapshot(identity)
    }

    /// Live view bound to `expression`. The query is checked against the
    /// schema now and evaluated on first access.
    pub fn live_query(&self, expression: QueryExpression) -> Result<LiveQuery> {
        self.inner.validate_query(&expression)?;
        Ok(LiveQuery::new(Arc::clone(&self.inner), expression))
    }

    /// Query builder for one record type.
    pub fn scope(&self, record_type: impl Into<String>) -> CacheScope {
        CacheScope::new(self.clone(), record_type.into())
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}
