//! # Record Cache
//!
//! A reactive, identity-mapped cache over a schema-described record source.
//!
//! ## Core Concepts
//!
//! - **Models**: One instance per record identity, with lazily computed,
//!   selectively invalidated fields
//! - **Changes**: Source operations classified into per-record, per-field
//!   change sets using the schema
//! - **Live queries**: Query-bound views that recompute after relevant changes
//! - **Stores**: Async durable queries and mutations, a sync cache surface,
//!   fork/merge and busy-state tracking
//!
//! ## Example
//!
//! ```ignore
//! use record_cache::{MemorySource, ModelDefinition, QueryExpression, Schema, Store};
//!
//! let schema = Schema::new()
//!     .with_model("person", ModelDefinition::new().attribute("name").has_many("pets", "animal"))
//!     .with_model("animal", ModelDefinition::new().attribute("name"));
//! let store = Store::new(Arc::new(MemorySource::new(schema)));
//!
//! let people = store.cache().live_query(QueryExpression::find_records("person"))?;
//! assert!(people.is_empty());
//!
//! let paul = store
//!     .add_record(json!({"type": "person", "name": "Paul"}).as_object().cloned().unwrap())
//!     .await?;
//!
//! assert_eq!(paul.attribute("name"), Some(json!("Paul")));
//! assert_eq!(people.len(), 1);
//! ```

pub mod cache;
pub mod changes;
pub mod error;
pub mod identity_map;
pub mod live_query;
pub mod normalize;
pub mod operation;
pub mod query;
pub mod record;
pub mod schema;
pub mod scope;
pub mod source;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use cache::Cache;
pub use changes::{change_set_for_operation, changes_for_event, compute_changes, ChangeSet};
pub use error::{CacheError, Result};
pub use identity_map::{IdentityMap, IdentityMapFactory};
pub use live_query::LiveQuery;
pub use normalize::normalize_record_properties;
pub use operation::Operation;
pub use query::{AttributeFilter, FilterOp, QueryExpression, QueryResult, SortOrder, SortSpecifier};
pub use record::{FieldKind, FieldValue, HasMany, HasOne, Model};
pub use schema::{ModelDefinition, RelationshipDefinition, RelationshipKind, Schema};
pub use scope::{CacheScope, Scope, StoreScope};
pub use source::{ListenerId, MemorySource, Source, SourceConfig, SourceEvent, SourceStats};
pub use store::{ModelResult, Store, StoreConfig};
pub use subscriptions::{ChangeStream, Listener, Subscription, SubscriptionId};
pub use types::*;
