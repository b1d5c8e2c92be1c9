//! Change computation: turning applied operations into change sets.
//!
//! An operation is classified against a target identity (or none) using the
//! schema. The result names exactly the fields of the target that may have
//! changed, so callers invalidate those fields and nothing else.
//!
//! | Operation                   | Same identity           | Other identity                     |
//! |-----------------------------|-------------------------|------------------------------------|
//! | `UpdateRecord`              | payload field names     | none                               |
//! | `RemoveRecord`              | `removed = true`        | `hasMany` fields targeting its type |
//! | `AddRecord`                 | none                    | `hasMany` fields targeting its type |
//! | `ReplaceAttribute`/`ReplaceKey` | that name           | none                               |
//! | relationship operations     | the relationship name   | none                               |

use crate::operation::Operation;
use crate::schema::Schema;
use crate::source::SourceEvent;
use crate::types::RecordIdentity;
use serde::{Deserialize, Serialize};

/// Description of what changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeSet {
    /// Fields of one record changed, or the record was removed.
    Patch {
        identity: RecordIdentity,
        properties: Vec<String>,
        removed: bool,
    },
    /// The whole dataset was replaced; everything is stale.
    Reset,
}

impl ChangeSet {
    pub fn patch(identity: RecordIdentity, properties: Vec<String>) -> Self {
        ChangeSet::Patch {
            identity,
            properties,
            removed: false,
        }
    }

    pub fn removal(identity: RecordIdentity) -> Self {
        ChangeSet::Patch {
            identity,
            properties: Vec::new(),
            removed: true,
        }
    }

    pub fn identity(&self) -> Option<&RecordIdentity> {
        match self {
            ChangeSet::Patch { identity, .. } => Some(identity),
            ChangeSet::Reset => None,
        }
    }

    pub fn properties(&self) -> &[String] {
        match self {
            ChangeSet::Patch { properties, .. } => properties,
            ChangeSet::Reset => &[],
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, ChangeSet::Patch { removed: true, .. })
    }
}

/// Change set of an operation as seen by its own record.
pub fn change_set_for_operation(operation: &Operation) -> ChangeSet {
    let identity = operation.identity().clone();

    match operation {
        Operation::UpdateRecord { record } => ChangeSet::patch(identity, record.property_names()),
        Operation::RemoveRecord { .. } => ChangeSet::removal(identity),
        Operation::ReplaceAttribute { attribute, .. } => ChangeSet::patch(identity, vec![attribute.clone()]),
        Operation::ReplaceKey { key, .. } => ChangeSet::patch(identity, vec![key.clone()]),
        Operation::AddToRelatedRecords { relationship, .. }
        | Operation::RemoveFromRelatedRecords { relationship, .. }
        | Operation::ReplaceRelatedRecords { relationship, .. }
        | Operation::ReplaceRelatedRecord { relationship, .. } => {
            ChangeSet::patch(identity, vec![relationship.clone()])
        }
        Operation::AddRecord { .. } => ChangeSet::patch(identity, Vec::new()),
    }
}

/// Classify `operation` against `target`.
///
/// With no target every operation yields a patch for its own record with no
/// properties. With a target, `None` means nothing about the target changed.
pub fn compute_changes(
    target: Option<&RecordIdentity>,
    operation: &Operation,
    schema: &Schema,
) -> Option<ChangeSet> {
    let Some(target) = target else {
        let identity = operation.identity().clone();
        return Some(match operation {
            Operation::RemoveRecord { .. } => ChangeSet::removal(identity),
            _ => ChangeSet::patch(identity, Vec::new()),
        });
    };

    let subject = operation.identity();
    if subject == target {
        let change = change_set_for_operation(operation);
        if change.properties().is_empty() && !change.is_removal() {
            return None;
        }
        return Some(change);
    }

    if !operation.is_membership_change() {
        return None;
    }

    // Adding or removing a record can change any collection that holds
    // records of its type.
    let properties: Vec<String> = schema
        .model(&target.record_type)?
        .has_many_targeting(&subject.record_type)
        .map(str::to_string)
        .collect();

    if properties.is_empty() {
        None
    } else {
        Some(ChangeSet::patch(target.clone(), properties))
    }
}

/// Classify a source event against `target`. Resets always apply.
pub fn changes_for_event(
    target: Option<&RecordIdentity>,
    event: &SourceEvent,
    schema: &Schema,
) -> Option<ChangeSet> {
    match event {
        SourceEvent::Patch(operation) => compute_changes(target, operation, schema),
        SourceEvent::Reset => Some(ChangeSet::Reset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelDefinition;
    use crate::types::Record;
    use proptest::prelude::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with_model(
                "person",
                ModelDefinition::new()
                    .attribute("name")
                    .key("remoteId")
                    .has_many("pets", "animal")
                    .has_many("friends", "person")
                    .has_one("favorite", "animal"),
            )
            .with_model("animal", ModelDefinition::new().attribute("name").has_one("owner", "person"))
    }

    fn person(id: &str) -> RecordIdentity {
        RecordIdentity::new("person", id)
    }

    fn animal(id: &str) -> RecordIdentity {
        RecordIdentity::new("animal", id)
    }

    #[test]
    fn test_replace_attribute_direct() {
        let op = Operation::replace_attribute(person("1"), "name", json!("Paul"));
        assert_eq!(
            compute_changes(Some(&person("1")), &op, &schema()),
            Some(ChangeSet::patch(person("1"), vec!["name".into()]))
        );
        assert_eq!(compute_changes(Some(&person("2")), &op, &schema()), None);
    }

    #[test]
    fn test_update_record_lists_payload_fields() {
        let op = Operation::update_record(
            Record::new(person("1"))
                .with_attribute("name", json!("Paul"))
                .with_key("remoteId", "r1")
                .with_has_one("favorite", None),
        );
        let change = compute_changes(Some(&person("1")), &op, &schema()).unwrap();
        assert_eq!(change.properties(), ["name", "remoteId", "favorite"]);
    }

    #[test]
    fn test_remove_record_direct_is_removal() {
        let op = Operation::remove_record(person("1"));
        assert_eq!(
            compute_changes(Some(&person("1")), &op, &schema()),
            Some(ChangeSet::removal(person("1")))
        );
    }

    #[test]
    fn test_add_record_infers_has_many() {
        let op = Operation::add_record(Record::new(animal("7")));
        assert_eq!(
            compute_changes(Some(&person("1")), &op, &schema()),
            Some(ChangeSet::patch(person("1"), vec!["pets".into()]))
        );

        // no hasMany on animal targets animal
        assert_eq!(compute_changes(Some(&animal("1")), &op, &schema()), None);
    }

    #[test]
    fn test_self_typed_collection() {
        let op = Operation::remove_record(person("2"));
        assert_eq!(
            compute_changes(Some(&person("1")), &op, &schema()),
            Some(ChangeSet::patch(person("1"), vec!["friends".into()]))
        );
    }

    #[test]
    fn test_add_record_direct_is_none() {
        let op = Operation::add_record(Record::new(person("1")).with_attribute("name", json!("x")));
        assert_eq!(compute_changes(Some(&person("1")), &op, &schema()), None);
    }

    #[test]
    fn test_untargeted() {
        let op = Operation::replace_key(person("1"), "remoteId", "r9");
        assert_eq!(
            compute_changes(None, &op, &schema()),
            Some(ChangeSet::patch(person("1"), Vec::new()))
        );
        assert_eq!(
            compute_changes(None, &Operation::remove_record(animal("3")), &schema()),
            Some(ChangeSet::removal(animal("3")))
        );
    }

    #[test]
    fn test_reset_always_applies() {
        assert_eq!(
            changes_for_event(Some(&person("1")), &SourceEvent::Reset, &schema()),
            Some(ChangeSet::Reset)
        );
    }

    #[test]
    fn test_unknown_names_pass_through() {
        let op = Operation::replace_attribute(person("1"), "nickname", json!("P"));
        let change = compute_changes(Some(&person("1")), &op, &schema()).unwrap();
        assert_eq!(change.properties(), ["nickname"]);
    }

    #[test]
    fn test_change_set_json_shape() {
        let value = serde_json::to_value(ChangeSet::removal(person("1"))).unwrap();
        assert_eq!(
            value,
            json!({"event": "patch", "identity": {"type": "person", "id": "1"}, "properties": [], "removed": true})
        );
        assert_eq!(serde_json::to_value(ChangeSet::Reset).unwrap(), json!({"event": "reset"}));
    }

    fn arb_identity() -> impl Strategy<Value = RecordIdentity> {
        (prop_oneof![Just("person"), Just("animal")], "[a-c]")
            .prop_map(|(record_type, id)| RecordIdentity::new(record_type, id))
    }

    fn arb_operation() -> impl Strategy<Value = Operation> {
        (arb_identity(), arb_identity(), 0..6u8).prop_map(|(record, related, kind)| match kind {
            0 => Operation::add_record(Record::new(record)),
            1 => Operation::remove_record(record),
            2 => Operation::replace_attribute(record, "name", json!("x")),
            3 => Operation::replace_key(record, "remoteId", "r"),
            4 => Operation::add_to_related_records(record, "pets", related),
            _ => Operation::replace_related_record(record, "favorite", Some(related)),
        })
    }

    proptest! {
        #[test]
        fn prop_targeted_change_names_target(target in arb_identity(), op in arb_operation()) {
            if let Some(change) = compute_changes(Some(&target), &op, &schema()) {
                prop_assert_eq!(change.identity(), Some(&target));
                prop_assert!(change.is_removal() || !change.properties().is_empty());
            }
        }

        #[test]
        fn prop_untargeted_never_filters(op in arb_operation()) {
            let change = compute_changes(None, &op, &schema());
            prop_assert!(change.is_some());
            let change = change.unwrap();
            prop_assert_eq!(change.identity(), Some(op.identity()));
            prop_assert!(change.properties().is_empty());
        }

        #[test]
        fn prop_only_membership_changes_cross_records(target in arb_identity(), op in arb_operation()) {
            if op.identity() != &target && !op.is_membership_change() {
                prop_assert_eq!(compute_changes(Some(&target), &op, &schema()), None);
            }
        }
    }
}
