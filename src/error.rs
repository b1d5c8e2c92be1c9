//! Error types for the record cache.

use crate::schema::RelationshipKind;
use crate::types::RecordIdentity;
use thiserror::Error;

/// Main error type for cache and source operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Record not found: {0}")]
    RecordNotFound(RecordIdentity),

    #[error("Record already exists: {0}")]
    RecordExists(RecordIdentity),

    #[error("Model not defined in schema: {0}")]
    UnknownModel(String),

    #[error("Relationship not defined: {model}.{relationship}")]
    UnknownRelationship { model: String, relationship: String },

    #[error("Relationship {model}.{relationship} is not a {expected} relationship")]
    InvalidRelationship {
        model: String,
        relationship: String,
        expected: RelationshipKind,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Store has been dropped")]
    StoreDropped,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            CacheError::Deserialization(e.to_string())
        } else {
            CacheError::Serialization(e.to_string())
        }
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
