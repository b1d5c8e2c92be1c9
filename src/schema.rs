//! Model definitions describing record types.
//!
//! The schema is read-only once handed to a source. It answers which
//! attributes, keys and relationships a type declares, and which `hasMany`
//! collections elsewhere in the schema point at a given type.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Arity of a relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    HasOne,
    HasMany,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipKind::HasOne => write!(f, "hasOne"),
            RelationshipKind::HasMany => write!(f, "hasMany"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub attribute_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    /// Target model type.
    pub model: String,
}

/// Fields declared by one model type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub keys: BTreeMap<String, KeyDefinition>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDefinition>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDefinition>,
}

impl ModelDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into(), KeyDefinition {});
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into(), AttributeDefinition::default());
        self
    }

    pub fn has_one(mut self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDefinition {
                kind: RelationshipKind::HasOne,
                model: model.into(),
            },
        );
        self
    }

    pub fn has_many(mut self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDefinition {
                kind: RelationshipKind::HasMany,
                model: model.into(),
            },
        );
        self
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDefinition> {
        self.relationships.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.keys.contains_key(name)
    }

    /// Names of `hasMany` relationships whose target is `model`.
    pub fn has_many_targeting<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.relationships
            .iter()
            .filter(move |(_, def)| def.kind == RelationshipKind::HasMany && def.model == model)
            .map(|(name, _)| name.as_str())
    }

    /// Names of `hasOne` relationships whose target is `model`.
    pub fn has_one_targeting<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.relationships
            .iter()
            .filter(move |(_, def)| def.kind == RelationshipKind::HasOne && def.model == model)
            .map(|(name, _)| name.as_str())
    }
}

/// Schema: model type name to its definition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    models: HashMap<String, ModelDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a model definition.
    ///
    /// Model names must not contain `:`, the separator of a record
    /// identity's canonical form.
    pub fn with_model(mut self, name: impl Into<String>, definition: ModelDefinition) -> Self {
        self.models.insert(name.into(), definition);
        self
    }

    /// Build a schema from its JSON form: `{"models": {"person": {...}}}`.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let schema: Self = serde_json::from_value(value)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check that every model name can appear in a canonical identity.
    pub fn validate(&self) -> Result<()> {
        match self.models.keys().find(|name| name.contains(':')) {
            Some(name) => Err(CacheError::InvalidSchema(format!(
                "model name {:?} contains ':'",
                name
            ))),
            None => Ok(()),
        }
    }

    pub fn model(&self, record_type: &str) -> Option<&ModelDefinition> {
        self.models.get(record_type)
    }

    pub fn require_model(&self, record_type: &str) -> Result<&ModelDefinition> {
        self.model(record_type)
            .ok_or_else(|| CacheError::UnknownModel(record_type.to_string()))
    }

    pub fn has_model(&self, record_type: &str) -> bool {
        self.models.contains_key(record_type)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Look up a relationship and check its arity.
    pub fn relationship_of_kind(
        &self,
        record_type: &str,
        name: &str,
        expected: RelationshipKind,
    ) -> Result<&RelationshipDefinition> {
        let definition = self
            .require_model(record_type)?
            .relationship(name)
            .ok_or_else(|| CacheError::UnknownRelationship {
                model: record_type.to_string(),
                relationship: name.to_string(),
            })?;

        if definition.kind != expected {
            return Err(CacheError::InvalidRelationship {
                model: record_type.to_string(),
                relationship: name.to_string(),
                expected,
            });
        }

        Ok(definition)
    }

    /// Generate a fresh record id.
    pub fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
