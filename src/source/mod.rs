//! The store contract consumed by the cache, plus an in-memory implementation.
//!
//! A [`Source`] holds the records, executes queries and updates, and emits a
//! [`SourceEvent`] for every operation it applies. Synchronous reads
//! (`record_snapshot`, `query_sync`) never suspend; `query`, `update` and
//! `merge` are asynchronous so that backed sources may suspend on I/O.

mod apply;
mod memory;

pub use apply::{apply_operation, RecordTable};
pub use memory::{MemorySource, SourceConfig, SourceStats};

use crate::error::Result;
use crate::operation::Operation;
use crate::query::{QueryExpression, QueryResult};
use crate::schema::Schema;
use crate::subscriptions::{Listener, SubscriptionId};
use crate::types::{Record, RecordIdentity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event emitted by a source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SourceEvent {
    /// One operation was applied.
    Patch(Operation),
    /// The whole dataset was replaced.
    Reset,
}

/// Identifier of a listener registered on a source.
pub type ListenerId = SubscriptionId;

#[async_trait]
pub trait Source: Send + Sync {
    /// Schema describing every record type this source holds.
    fn schema(&self) -> Arc<Schema>;

    /// Current state of one record, if present.
    fn record_snapshot(&self, identity: &RecordIdentity) -> Option<Record>;

    /// Run a query against the current in-memory state.
    fn query_sync(&self, expression: &QueryExpression) -> Result<QueryResult>;

    /// Register a listener for patch and reset events.
    fn subscribe(&self, listener: Listener<SourceEvent>) -> ListenerId;

    /// Unregister a listener. Returns false if it was not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Run a query through the source's full query pipeline.
    async fn query(&self, expression: QueryExpression) -> Result<QueryResult>;

    /// Apply operations in order. Returns the operations that were applied.
    async fn update(&self, operations: Vec<Operation>) -> Result<Vec<Operation>>;

    /// Create an independent branch seeded with this source's current state.
    fn fork(&self) -> Arc<dyn Source>;

    /// Operations applied to this source since it was created or forked.
    fn transform_log(&self) -> Vec<Operation>;

    /// Apply another source's transform log to this one.
    async fn merge(&self, other: &dyn Source) -> Result<Vec<Operation>> {
        let operations = other.transform_log();
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        self.update(operations).await
    }
}
