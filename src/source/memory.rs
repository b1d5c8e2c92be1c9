//! In-memory source.

use super::apply::{apply_operation, RecordTable};
use super::{ListenerId, Source, SourceEvent};
use crate::error::{CacheError, Result};
use crate::operation::Operation;
use crate::query::{sort_records, QueryExpression, QueryResult};
use crate::schema::{RelationshipKind, Schema};
use crate::subscriptions::{Listener, SubscriptionManager};
use crate::types::{Record, RecordIdentity, RelationshipData};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Memory source configuration.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Name used in log output. Forks append `-fork`.
    pub name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
        }
    }
}

/// Read and write counters for a memory source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Number of `record_snapshot` calls.
    pub snapshot_reads: u64,
    /// Number of `query_sync` calls.
    pub sync_queries: u64,
    /// Number of async `query` calls.
    pub queries: u64,
    /// Number of operations applied.
    pub operations: u64,
    /// Number of records currently held.
    pub record_count: u64,
}

#[derive(Default)]
struct Counters {
    snapshot_reads: AtomicU64,
    sync_queries: AtomicU64,
    queries: AtomicU64,
    operations: AtomicU64,
}

/// A source holding every record in memory.
///
/// Records of each type are kept in creation order. Every applied operation
/// is appended to the transform log and broadcast as a patch before the next
/// operation of the batch is applied.
pub struct MemorySource {
    config: SourceConfig,
    schema: Arc<Schema>,
    records: RwLock<RecordTable>,
    log: Mutex<Vec<Operation>>,
    listeners: SubscriptionManager<SourceEvent>,
    counters: Counters,
}

impl MemorySource {
    /// Create an empty source for `schema`.
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, SourceConfig::default())
    }

    pub fn with_config(schema: Schema, config: SourceConfig) -> Self {
        Self::from_parts(config, Arc::new(schema), RecordTable::new())
    }

    fn from_parts(config: SourceConfig, schema: Arc<Schema>, records: RecordTable) -> Self {
        Self {
            config,
            schema,
            records: RwLock::new(records),
            log: Mutex::new(Vec::new()),
            listeners: SubscriptionManager::new(),
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Replace the whole dataset and emit a reset.
    ///
    /// The transform log is left untouched: a reset is not an operation.
    pub fn reset(&self, records: Vec<Record>) -> Result<()> {
        let mut table = RecordTable::new();
        for record in records {
            apply_operation(&mut table, &self.schema, &Operation::add_record(record))?;
        }

        let count = table.len();
        *self.records.write() = table;
        tracing::debug!(source = %self.config.name, records = count, "source reset");

        self.listeners.broadcast(&SourceEvent::Reset);
        Ok(())
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            snapshot_reads: self.counters.snapshot_reads.load(Ordering::Relaxed),
            sync_queries: self.counters.sync_queries.load(Ordering::Relaxed),
            queries: self.counters.queries.load(Ordering::Relaxed),
            operations: self.counters.operations.load(Ordering::Relaxed),
            record_count: self.records.read().len() as u64,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.subscription_count()
    }

    /// Fork into a concrete memory source (see [`Source::fork`]).
    pub fn branch(&self) -> MemorySource {
        let config = SourceConfig {
            name: format!("{}-fork", self.config.name),
        };
        let records = self.records.read().clone();
        tracing::debug!(source = %self.config.name, fork = %config.name, records = records.len(), "source forked");
        Self::from_parts(config, Arc::clone(&self.schema), records)
    }

    fn execute(&self, expression: &QueryExpression) -> Result<QueryResult> {
        let table = self.records.read();

        match expression {
            QueryExpression::FindRecord { record } => Ok(QueryResult::Record(
                table.get(record).map(|found| found.identity.clone()),
            )),

            QueryExpression::FindRecords {
                record_type,
                filter,
                sort,
            } => {
                self.schema.require_model(record_type)?;
                let mut matched: Vec<&Record> = table
                    .of_type(record_type)
                    .filter(|record| filter.iter().all(|term| term.matches(record)))
                    .collect();
                sort_records(&mut matched, sort);
                Ok(QueryResult::Records(
                    matched.into_iter().map(|r| r.identity.clone()).collect(),
                ))
            }

            QueryExpression::FindRelatedRecord {
                record,
                relationship,
            } => {
                self.schema
                    .relationship_of_kind(&record.record_type, relationship, RelationshipKind::HasOne)?;
                let related = match table.get(record).and_then(|r| r.relationships.get(relationship)) {
                    Some(RelationshipData::One(Some(related))) if table.contains(related) => {
                        Some(related.clone())
                    }
                    Some(RelationshipData::Many(_)) => {
                        return Err(CacheError::InvalidRelationship {
                            model: record.record_type.clone(),
                            relationship: relationship.clone(),
                            expected: RelationshipKind::HasOne,
                        })
                    }
                    _ => None,
                };
                Ok(QueryResult::Record(related))
            }

            QueryExpression::FindRelatedRecords {
                record,
                relationship,
            } => {
                self.schema
                    .relationship_of_kind(&record.record_type, relationship, RelationshipKind::HasMany)?;
                let related = match table.get(record).and_then(|r| r.relationships.get(relationship)) {
                    Some(RelationshipData::Many(ids)) => ids
                        .iter()
                        .filter(|id| table.contains(id))
                        .cloned()
                        .collect(),
                    Some(RelationshipData::One(_)) => {
                        return Err(CacheError::InvalidRelationship {
                            model: record.record_type.clone(),
                            relationship: relationship.clone(),
                            expected: RelationshipKind::HasMany,
                        })
                    }
                    None => Vec::new(),
                };
                Ok(QueryResult::Records(related))
            }
        }
    }

    /// Apply one operation and publish it. The table lock is released before
    /// listeners run so they can read the new state.
    fn apply_and_emit(&self, operation: Operation) -> Result<()> {
        apply_operation(&mut self.records.write(), &self.schema, &operation)?;
        self.log.lock().push(operation.clone());
        self.counters.operations.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(source = %self.config.name, op = operation.name(), record = %operation.identity(), "operation applied");
        self.listeners.broadcast(&SourceEvent::Patch(operation));
        Ok(())
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("name", &self.config.name)
            .field("records", &self.records.read().len())
            .field("log_len", &self.log.lock().len())
            .field("listeners", &self.listeners.subscription_count())
            .finish()
    }
}

#[async_trait]
impl Source for MemorySource {
    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn record_snapshot(&self, identity: &RecordIdentity) -> Option<Record> {
        self.counters.snapshot_reads.fetch_add(1, Ordering::Relaxed);
        self.records.read().get(identity).cloned()
    }

    fn query_sync(&self, expression: &QueryExpression) -> Result<QueryResult> {
        self.counters.sync_queries.fetch_add(1, Ordering::Relaxed);
        self.execute(expression)
    }

    fn subscribe(&self, listener: Listener<SourceEvent>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    async fn query(&self, expression: QueryExpression) -> Result<QueryResult> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.execute(&expression)
    }

    async fn update(&self, operations: Vec<Operation>) -> Result<Vec<Operation>> {
        tracing::debug!(source = %self.config.name, count = operations.len(), "applying operations");

        let mut applied = Vec::with_capacity(operations.len());
        for operation in operations {
            if let Err(err) = self.apply_and_emit(operation.clone()) {
                tracing::debug!(source = %self.config.name, applied = applied.len(), error = %err, "update aborted");
                return Err(err);
            }
            applied.push(operation);
        }
        Ok(applied)
    }

    fn fork(&self) -> Arc<dyn Source> {
        Arc::new(self.branch())
    }

    fn transform_log(&self) -> Vec<Operation> {
        self.log.lock().clone()
    }
}
