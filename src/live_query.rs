//! Live query views.
//!
//! A [`LiveQuery`] binds a query to the cache. Its ordered member list is
//! computed on first access and kept until the source reports an operation
//! that can change the result; the next access then recomputes it. The
//! view object itself never changes, only its contents.

use crate::changes::compute_changes;
use crate::error::Result;
use crate::operation::Operation;
use crate::query::QueryExpression;
use crate::record::Model;
use crate::schema::Schema;
use crate::source::SourceEvent;
use crate::store::StoreInner;
use crate::subscriptions::Subscription;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Members {
    records: Option<Vec<Arc<Model>>>,
    /// Bumped on every staleness notice.
    generation: u64,
}

/// Whether `operation` can change the result of `query`.
fn affects(query: &QueryExpression, operation: &Operation, schema: &Schema) -> bool {
    let subject = operation.identity();
    match query {
        QueryExpression::FindRecords { record_type, .. } => &subject.record_type == record_type,
        QueryExpression::FindRecord { record } => subject == record,
        QueryExpression::FindRelatedRecord {
            record,
            relationship,
        }
        | QueryExpression::FindRelatedRecords {
            record,
            relationship,
        } => {
            // Only existing records are reported as related, so adding or
            // removing a record of the target type can change the result
            // while the owner's linkage is untouched.
            let target_model = schema
                .model(&record.record_type)
                .and_then(|model| model.relationship(relationship))
                .map(|definition| definition.model.as_str());
            let membership = operation.is_membership_change()
                && target_model == Some(subject.record_type.as_str());

            membership
                || compute_changes(Some(record), operation, schema)
                    .map_or(false, |change| {
                        change.is_removal() || change.properties().iter().any(|p| p == relationship)
                    })
        }
    }
}

/// Query-bound, order-preserving view of models.
pub struct LiveQuery {
    query: QueryExpression,
    members: Arc<Mutex<Members>>,
    store: Arc<StoreInner>,
    subscription: Subscription,
}

impl LiveQuery {
    pub(crate) fn new(store: Arc<StoreInner>, query: QueryExpression) -> Self {
        let members = Arc::new(Mutex::new(Members::default()));

        let listener_members = Arc::clone(&members);
        let listener_query = query.clone();
        let schema = Arc::clone(&store.schema);
        let id = store.source.subscribe(Arc::new(move |event: &SourceEvent| {
            let stale = match event {
                SourceEvent::Reset => true,
                SourceEvent::Patch(operation) => affects(&listener_query, operation, &schema),
            };
            if stale {
                let mut members = listener_members.lock();
                members.records = None;
                members.generation += 1;
            }
        }));

        let subscription = Subscription::new(id, Arc::clone(&store.source));
        Self {
            query,
            members,
            store,
            subscription,
        }
    }

    pub fn query(&self) -> &QueryExpression {
        &self.query
    }

    /// Current members, computed on first access after a change.
    ///
    /// A failing query reads as empty (and is logged). After `dispose` the
    /// view is always empty.
    pub fn records(&self) -> Vec<Arc<Model>> {
        if self.subscription.is_closed() {
            return Vec::new();
        }

        let generation = {
            let members = self.members.lock();
            if let Some(records) = &members.records {
                return records.clone();
            }
            members.generation
        };

        let records = match self.store.query_cache(&self.query) {
            Ok(result) => result.into_records(),
            Err(err) => {
                tracing::warn!(query = ?self.query, error = %err, "live query evaluation failed");
                return Vec::new();
            }
        };

        let mut members = self.members.lock();
        if members.generation == generation {
            members.records = Some(records.clone());
        }
        records
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Arc<Model>> {
        self.records().into_iter()
    }

    /// Whether the next access recomputes the members.
    pub fn is_stale(&self) -> bool {
        self.members.lock().records.is_none()
    }

    /// Discard the computed members.
    pub fn notify_array_change(&self) {
        let mut members = self.members.lock();
        members.records = None;
        members.generation += 1;
    }

    /// Recompute now, surfacing query errors.
    pub fn refresh(&self) -> Result<Vec<Arc<Model>>> {
        self.notify_array_change();
        let records = self.store.query_cache(&self.query)?.into_records();
        self.members.lock().records = Some(records.clone());
        Ok(records)
    }

    /// Stop tracking changes and release the members.
    pub fn dispose(&self) {
        self.subscription.cancel();
        self.members.lock().records = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.subscription.is_closed()
    }
}

impl<'a> IntoIterator for &'a LiveQuery {
    type Item = Arc<Model>;
    type IntoIter = std::vec::IntoIter<Arc<Model>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("query", &self.query)
            .field("stale", &self.is_stale())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
