//! Materialized records.
//!
//! A [`Model`] exposes one record's fields through a field table built from
//! its schema definition. Values are computed on first access and cached
//! until the store reports a change to that field.

mod model;
mod relationships;

pub use model::{FieldKind, FieldValue, Model};
pub use relationships::{HasMany, HasOne};
