//! Subscription system for source events and change streams.
//!
//! A source owns a [`SubscriptionManager`] and broadcasts each applied
//! operation (and each reset) to its listeners, synchronously and in
//! registration order. Consumers hold a [`Subscription`] capability that
//! unregisters its listener when cancelled or dropped.
//!
//! [`ChangeStream`] is the consumer-facing form: change sets computed for
//! one identity (or for all records) are queued on a channel.
//!
//! # Example
//!
//! ```ignore
//! let stream = store.changes(Some(&RecordIdentity::new("person", "1")));
//!
//! while let Ok(change) = stream.recv() {
//!     match change {
//!         ChangeSet::Patch { removed: true, .. } => break,
//!         ChangeSet::Patch { properties, .. } => println!("changed: {properties:?}"),
//!         ChangeSet::Reset => println!("everything changed"),
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{ChangeStream, Listener, Subscription, SubscriptionId};
