//! Record operations: one atomic mutation applied to a source.

use crate::types::{Record, RecordIdentity};
use serde::{Deserialize, Serialize};

/// A single mutation, already applied (or about to be applied) to a source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    AddRecord {
        record: Record,
    },
    UpdateRecord {
        record: Record,
    },
    RemoveRecord {
        record: RecordIdentity,
    },
    ReplaceKey {
        record: RecordIdentity,
        key: String,
        value: String,
    },
    ReplaceAttribute {
        record: RecordIdentity,
        attribute: String,
        value: serde_json::Value,
    },
    AddToRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related: RecordIdentity,
    },
    RemoveFromRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related: RecordIdentity,
    },
    ReplaceRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related: Vec<RecordIdentity>,
    },
    ReplaceRelatedRecord {
        record: RecordIdentity,
        relationship: String,
        related: Option<RecordIdentity>,
    },
}

impl Operation {
    pub fn add_record(record: Record) -> Self {
        Operation::AddRecord { record }
    }

    pub fn update_record(record: Record) -> Self {
        Operation::UpdateRecord { record }
    }

    pub fn remove_record(record: RecordIdentity) -> Self {
        Operation::RemoveRecord { record }
    }

    pub fn replace_key(record: RecordIdentity, key: impl Into<String>, value: impl Into<String>) -> Self {
        Operation::ReplaceKey {
            record,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn replace_attribute(
        record: RecordIdentity,
        attribute: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Operation::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value,
        }
    }

    pub fn add_to_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related: RecordIdentity,
    ) -> Self {
        Operation::AddToRelatedRecords {
            record,
            relationship: relationship.into(),
            related,
        }
    }

    pub fn remove_from_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related: RecordIdentity,
    ) -> Self {
        Operation::RemoveFromRelatedRecords {
            record,
            relationship: relationship.into(),
            related,
        }
    }

    pub fn replace_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related: Vec<RecordIdentity>,
    ) -> Self {
        Operation::ReplaceRelatedRecords {
            record,
            relationship: relationship.into(),
            related,
        }
    }

    pub fn replace_related_record(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related: Option<RecordIdentity>,
    ) -> Self {
        Operation::ReplaceRelatedRecord {
            record,
            relationship: relationship.into(),
            related,
        }
    }

    /// Identity of the record this operation targets.
    pub fn identity(&self) -> &RecordIdentity {
        match self {
            Operation::AddRecord { record } | Operation::UpdateRecord { record } => &record.identity,
            Operation::RemoveRecord { record }
            | Operation::ReplaceKey { record, .. }
            | Operation::ReplaceAttribute { record, .. }
            | Operation::AddToRelatedRecords { record, .. }
            | Operation::RemoveFromRelatedRecords { record, .. }
            | Operation::ReplaceRelatedRecords { record, .. }
            | Operation::ReplaceRelatedRecord { record, .. } => record,
        }
    }

    /// Operation name as it appears in the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddRecord { .. } => "addRecord",
            Operation::UpdateRecord { .. } => "updateRecord",
            Operation::RemoveRecord { .. } => "removeRecord",
            Operation::ReplaceKey { .. } => "replaceKey",
            Operation::ReplaceAttribute { .. } => "replaceAttribute",
            Operation::AddToRelatedRecords { .. } => "addToRelatedRecords",
            Operation::RemoveFromRelatedRecords { .. } => "removeFromRelatedRecords",
            Operation::ReplaceRelatedRecords { .. } => "replaceRelatedRecords",
            Operation::ReplaceRelatedRecord { .. } => "replaceRelatedRecord",
        }
    }

    /// True for operations that create or destroy a whole record.
    pub fn is_membership_change(&self) -> bool {
        matches!(self, Operation::AddRecord { .. } | Operation::RemoveRecord { .. })
    }
}
