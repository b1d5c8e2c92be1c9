//! Record table and operation application.

use crate::error::{CacheError, Result};
use crate::operation::Operation;
use crate::schema::{RelationshipKind, Schema};
use crate::types::{Record, RecordIdentity, RelationshipData, Sequence};
use std::collections::{BTreeMap, HashMap};

/// Records held by a source, remembered in creation order per type.
#[derive(Clone, Debug, Default)]
pub struct RecordTable {
    records: HashMap<RecordIdentity, (Sequence, Record)>,
    by_type: HashMap<String, BTreeMap<Sequence, String>>,
    head: Sequence,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.records.get(identity).map(|(_, record)| record)
    }

    fn get_mut(&mut self, identity: &RecordIdentity) -> Result<&mut Record> {
        self.records
            .get_mut(identity)
            .map(|(_, record)| record)
            .ok_or_else(|| CacheError::RecordNotFound(identity.clone()))
    }

    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.records.contains_key(identity)
    }

    fn insert(&mut self, record: Record) {
        let sequence = self.head.next();
        self.head = sequence;
        self.by_type
            .entry(record.identity.record_type.clone())
            .or_default()
            .insert(sequence, record.identity.id.clone());
        self.records.insert(record.identity.clone(), (sequence, record));
    }

    fn remove(&mut self, identity: &RecordIdentity) -> Option<Record> {
        let (sequence, record) = self.records.remove(identity)?;
        if let Some(ids) = self.by_type.get_mut(&identity.record_type) {
            ids.remove(&sequence);
        }
        Some(record)
    }

    /// Records of one type, oldest first.
    pub fn of_type<'a>(&'a self, record_type: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.by_type
            .get(record_type)
            .into_iter()
            .flat_map(|ids| ids.values())
            .filter_map(move |id| {
                self.records
                    .get(&RecordIdentity::new(record_type, id.as_str()))
                    .map(|(_, record)| record)
            })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.by_type.clear();
    }
}

/// Check a relationship's arity when the schema declares it.
fn check_arity(
    schema: &Schema,
    record: &RecordIdentity,
    relationship: &str,
    expected: RelationshipKind,
) -> Result<()> {
    let declared = schema
        .model(&record.record_type)
        .and_then(|model| model.relationship(relationship));

    match declared {
        Some(definition) if definition.kind != expected => Err(CacheError::InvalidRelationship {
            model: record.record_type.clone(),
            relationship: relationship.to_string(),
            expected,
        }),
        _ => Ok(()),
    }
}

/// Collection data for `name`, created empty if absent.
fn many_mut<'a>(record: &'a mut Record, name: &str) -> Result<&'a mut Vec<RecordIdentity>> {
    let data = record
        .relationships
        .entry(name.to_string())
        .or_insert_with(|| RelationshipData::Many(Vec::new()));

    match data {
        RelationshipData::Many(ids) => Ok(ids),
        RelationshipData::One(_) => Err(CacheError::InvalidRelationship {
            model: record.identity.record_type.clone(),
            relationship: name.to_string(),
            expected: RelationshipKind::HasMany,
        }),
    }
}

/// Apply an operation to a record table.
///
/// Validation covers existence (no duplicate adds, no patches to missing
/// records) and relationship arity where the schema declares the
/// relationship. Attribute names are not checked.
pub fn apply_operation(table: &mut RecordTable, schema: &Schema, operation: &Operation) -> Result<()> {
    match operation {
        Operation::AddRecord { record } => {
            if table.contains(&record.identity) {
                return Err(CacheError::RecordExists(record.identity.clone()));
            }
            table.insert(record.clone());
            Ok(())
        }

        Operation::UpdateRecord { record } => {
            let existing = table.get_mut(&record.identity)?;
            for (name, value) in &record.attributes {
                existing.attributes.insert(name.clone(), value.clone());
            }
            for (name, value) in &record.keys {
                existing.keys.insert(name.clone(), value.clone());
            }
            for (name, data) in &record.relationships {
                existing.relationships.insert(name.clone(), data.clone());
            }
            Ok(())
        }

        Operation::RemoveRecord { record } => table
            .remove(record)
            .map(|_| ())
            .ok_or_else(|| CacheError::RecordNotFound(record.clone())),

        Operation::ReplaceKey { record, key, value } => {
            table.get_mut(record)?.keys.insert(key.clone(), value.clone());
            Ok(())
        }

        Operation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => {
            table
                .get_mut(record)?
                .attributes
                .insert(attribute.clone(), value.clone());
            Ok(())
        }

        Operation::AddToRelatedRecords {
            record,
            relationship,
            related,
        } => {
            check_arity(schema, record, relationship, RelationshipKind::HasMany)?;
            let ids = many_mut(table.get_mut(record)?, relationship)?;
            if !ids.contains(related) {
                ids.push(related.clone());
            }
            Ok(())
        }

        Operation::RemoveFromRelatedRecords {
            record,
            relationship,
            related,
        } => {
            check_arity(schema, record, relationship, RelationshipKind::HasMany)?;
            many_mut(table.get_mut(record)?, relationship)?.retain(|id| id != related);
            Ok(())
        }

        Operation::ReplaceRelatedRecords {
            record,
            relationship,
            related,
        } => {
            check_arity(schema, record, relationship, RelationshipKind::HasMany)?;
            table
                .get_mut(record)?
                .relationships
                .insert(relationship.clone(), RelationshipData::Many(related.clone()));
            Ok(())
        }

        Operation::ReplaceRelatedRecord {
            record,
            relationship,
            related,
        } => {
            check_arity(schema, record, relationship, RelationshipKind::HasOne)?;
            table
                .get_mut(record)?
                .relationships
                .insert(relationship.clone(), RelationshipData::One(related.clone()));
            Ok(())
        }
    }
}
