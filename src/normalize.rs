//! Normalization of flat property maps into records.
//!
//! `{"type": "person", "name": "Paul", "pets": ["a", {"id": "b"}]}` becomes
//! a person record with a `name` attribute and a `pets` collection of two
//! animal identities. Only names declared by the model are copied.

use crate::error::{CacheError, Result};
use crate::schema::{ModelDefinition, RelationshipKind, Schema};
use crate::types::{Attributes, Record, RecordIdentity, RelationshipData};
use serde_json::Value;

/// Build a record of `record_type` from `properties`.
///
/// The id comes from the `id` property, or is generated by the schema.
pub fn normalize_record_properties(
    schema: &Schema,
    record_type: &str,
    properties: &Attributes,
) -> Result<Record> {
    let definition = schema.require_model(record_type)?;

    let id = match properties.get("id") {
        Some(Value::String(id)) => id.clone(),
        None | Some(Value::Null) => schema.generate_id(),
        Some(other) => {
            return Err(CacheError::InvalidOperation(format!(
                "record id must be a string, got {other}"
            )))
        }
    };

    let mut record = Record::new(RecordIdentity::new(record_type, id));
    assign_keys(definition, &mut record, properties)?;
    assign_attributes(definition, &mut record, properties);
    assign_relationships(definition, &mut record, properties)?;
    Ok(record)
}

fn assign_keys(definition: &ModelDefinition, record: &mut Record, properties: &Attributes) -> Result<()> {
    for name in definition.keys.keys() {
        match properties.get(name) {
            None => {}
            Some(Value::String(value)) => {
                record.keys.insert(name.clone(), value.clone());
            }
            Some(other) => {
                return Err(CacheError::InvalidOperation(format!(
                    "key {name} must be a string, got {other}"
                )))
            }
        }
    }
    Ok(())
}

fn assign_attributes(definition: &ModelDefinition, record: &mut Record, properties: &Attributes) {
    for name in definition.attributes.keys() {
        if let Some(value) = properties.get(name) {
            record.attributes.insert(name.clone(), value.clone());
        }
    }
}

fn assign_relationships(
    definition: &ModelDefinition,
    record: &mut Record,
    properties: &Attributes,
) -> Result<()> {
    for (name, relationship) in &definition.relationships {
        let Some(value) = properties.get(name) else {
            continue;
        };

        let data = match (relationship.kind, value) {
            (RelationshipKind::HasMany, Value::Array(items)) => RelationshipData::Many(
                items
                    .iter()
                    .map(|item| related_identity(&relationship.model, item))
                    .collect::<Result<_>>()?,
            ),
            (RelationshipKind::HasMany, Value::Null) => RelationshipData::Many(Vec::new()),
            (RelationshipKind::HasOne, Value::Null) => RelationshipData::One(None),
            (RelationshipKind::HasOne, Value::Array(_)) | (RelationshipKind::HasMany, _) => {
                return Err(CacheError::InvalidRelationship {
                    model: record.identity.record_type.clone(),
                    relationship: name.clone(),
                    expected: match relationship.kind {
                        RelationshipKind::HasOne => RelationshipKind::HasMany,
                        RelationshipKind::HasMany => RelationshipKind::HasOne,
                    },
                })
            }
            (RelationshipKind::HasOne, item) => {
                RelationshipData::One(Some(related_identity(&relationship.model, item)?))
            }
        };

        record.relationships.insert(name.clone(), data);
    }
    Ok(())
}

/// An id string, or an object carrying an `id` string.
fn related_identity(model: &str, value: &Value) -> Result<RecordIdentity> {
    let id = match value {
        Value::String(id) => Some(id),
        Value::Object(object) => match object.get("id") {
            Some(Value::String(id)) => Some(id),
            _ => None,
        },
        _ => None,
    };

    id.map(|id| RecordIdentity::new(model, id.as_str()))
        .ok_or_else(|| CacheError::InvalidOperation(format!("cannot read a {model} reference from {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new().with_model(
            "person",
            ModelDefinition::new()
                .attribute("name")
                .attribute("age")
                .key("remoteId")
                .has_many("pets", "animal")
                .has_one("mother", "person"),
        )
    }

    fn props(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_full() {
        let record = normalize_record_properties(
            &schema(),
            "person",
            &props(json!({
                "type": "person",
                "id": "1",
                "name": "Paul",
                "remoteId": "r1",
                "pets": ["a", {"type": "animal", "id": "b"}],
                "mother": "2",
                "unknown": true
            })),
        )
        .unwrap();

        assert_eq!(record.identity, RecordIdentity::new("person", "1"));
        assert_eq!(record.attribute("name"), Some(&json!("Paul")));
        assert_eq!(record.key("remoteId"), Some("r1"));
        assert_eq!(
            record.relationships["pets"],
            RelationshipData::Many(vec![
                RecordIdentity::new("animal", "a"),
                RecordIdentity::new("animal", "b"),
            ])
        );
        assert_eq!(
            record.relationships["mother"],
            RelationshipData::One(Some(RecordIdentity::new("person", "2")))
        );
        assert!(record.attribute("unknown").is_none());
        assert!(record.attribute("age").is_none());
    }

    #[test]
    fn test_generates_id() {
        let record = normalize_record_properties(&schema(), "person", &props(json!({"name": "Eve"}))).unwrap();
        assert!(!record.identity.id.is_empty());
    }

    #[test]
    fn test_null_relationships() {
        let record = normalize_record_properties(
            &schema(),
            "person",
            &props(json!({"pets": null, "mother": null, "name": null})),
        )
        .unwrap();

        assert_eq!(record.relationships["pets"], RelationshipData::Many(Vec::new()));
        assert_eq!(record.relationships["mother"], RelationshipData::One(None));
        assert_eq!(record.attribute("name"), Some(&Value::Null));
    }

    #[test]
    fn test_arity_mismatch() {
        let result = normalize_record_properties(&schema(), "person", &props(json!({"mother": ["1"]})));
        assert!(matches!(result, Err(CacheError::InvalidRelationship { .. })));

        let result = normalize_record_properties(&schema(), "person", &props(json!({"pets": "a"})));
        assert!(matches!(result, Err(CacheError::InvalidRelationship { .. })));
    }

    #[test]
    fn test_unknown_model() {
        let result = normalize_record_properties(&schema(), "robot", &Attributes::new());
        assert!(matches!(result, Err(CacheError::UnknownModel(_))));
    }
}
