//! Core types for the record cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute values keyed by attribute name.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Identity of a record: its model type plus its id.
///
/// Equality is structural. The canonical string form `"{type}:{id}"` is what
/// the identity map keys on; it is unambiguous because model type names
/// never contain `:` (ids may).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordIdentity {
    #[serde(rename = "type")]
    pub record_type: String,
    pub id: String,
}

impl RecordIdentity {
    pub fn new(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
        }
    }

    /// Canonical string form of this identity.
    pub fn serialize(&self) -> String {
        format!("{}:{}", self.record_type, self.id)
    }

    /// Parse the canonical string form. The type ends at the first `:`.
    pub fn deserialize(identifier: &str) -> Option<Self> {
        let (record_type, id) = identifier.split_once(':')?;
        Some(Self::new(record_type, id))
    }
}

impl fmt::Debug for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordIdentity({}:{})", self.record_type, self.id)
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type, self.id)
    }
}

/// Insertion position inside a source (per source, monotonic).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

/// Linkage data stored for one relationship of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    Many(Vec<RecordIdentity>),
    One(Option<RecordIdentity>),
}

impl RelationshipData {
    /// All identities referenced by this relationship.
    pub fn identities(&self) -> Vec<RecordIdentity> {
        match self {
            RelationshipData::Many(ids) => ids.clone(),
            RelationshipData::One(Some(id)) => vec![id.clone()],
            RelationshipData::One(None) => Vec::new(),
        }
    }
}

/// A record in the source's native shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub identity: RecordIdentity,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: Attributes,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipData>,
}

impl Record {
    pub fn new(identity: RecordIdentity) -> Self {
        Self {
            identity,
            keys: BTreeMap::new(),
            attributes: Attributes::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_has_one(mut self, name: impl Into<String>, related: Option<RecordIdentity>) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::One(related));
        self
    }

    pub fn with_has_many(mut self, name: impl Into<String>, related: Vec<RecordIdentity>) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::Many(related));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// Names present on this record: attributes, then keys, then relationships.
    pub fn property_names(&self) -> Vec<String> {
        self.attributes
            .keys()
            .chain(self.keys.keys())
            .chain(self.relationships.keys())
            .cloned()
            .collect()
    }
}
