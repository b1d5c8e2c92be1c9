//! Integration tests for the record cache.

use record_cache::{
    Attributes, ChangeSet, FieldValue, MemorySource, ModelDefinition, Operation, QueryExpression,
    Record, RecordIdentity, Schema, SortSpecifier, Source, Store,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn schema() -> Schema {
    Schema::new()
        .with_model(
            "person",
            ModelDefinition::new()
                .attribute("name")
                .attribute("age")
                .key("remoteId")
                .has_many("pets", "animal")
                .has_one("mother", "person"),
        )
        .with_model(
            "animal",
            ModelDefinition::new().attribute("name").has_one("owner", "person"),
        )
}

fn test_store() -> (Arc<MemorySource>, Store) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let source = Arc::new(MemorySource::new(schema()));
    let store = Store::new(source.clone());
    (source, store)
}

fn props(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

fn person(id: &str) -> RecordIdentity {
    RecordIdentity::new("person", id)
}

// --- Identity & materialization ---

#[tokio::test]
async fn test_identity_stability() {
    let (_source, store) = test_store();
    let created = store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul"})))
        .await
        .unwrap();

    let durable = store.find_record(&person("1")).await.unwrap().unwrap();
    let cached = store.cache().find_record(&person("1")).unwrap().unwrap();
    let listed = store.find_records("person").await.unwrap();

    assert!(Arc::ptr_eq(&created, &durable));
    assert!(Arc::ptr_eq(&created, &cached));
    assert!(Arc::ptr_eq(&created, &listed[0]));
}

#[tokio::test]
async fn test_add_record_generates_id() {
    let (source, store) = test_store();
    let model = store
        .add_record(props(json!({"type": "person", "name": "Eve"})))
        .await
        .unwrap();

    assert!(!model.id().is_empty());
    assert!(source.record_snapshot(model.identity()).is_some());
    assert_eq!(model.attribute("name"), Some(json!("Eve")));
}

#[tokio::test]
async fn test_lazy_field_reads_once_per_invalidation() {
    let (source, store) = test_store();
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul", "age": 40})))
        .await
        .unwrap();

    let reads = || source.stats().snapshot_reads;
    let start = reads();

    for _ in 0..5 {
        assert_eq!(paul.attribute("name"), Some(json!("Paul")));
    }
    assert_eq!(reads(), start + 1);

    // A change to another field leaves `name` cached.
    store
        .update_record(&person("1"), props(json!({"age": 41})))
        .await
        .unwrap();
    assert_eq!(paul.attribute("name"), Some(json!("Paul")));
    assert_eq!(reads(), start + 1);

    // A change to `name` costs exactly one more read.
    store
        .update_record(&person("1"), props(json!({"name": "Paulo"})))
        .await
        .unwrap();
    for _ in 0..3 {
        assert_eq!(paul.attribute("name"), Some(json!("Paulo")));
    }
    assert_eq!(reads(), start + 2);
}

#[tokio::test]
async fn test_field_table_dispatch() {
    let (_source, store) = test_store();
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul", "remoteId": "r1"})))
        .await
        .unwrap();

    assert!(matches!(paul.get("name"), Some(FieldValue::Attribute(Some(_)))));
    assert!(matches!(paul.get("remoteId"), Some(FieldValue::Key(Some(ref k))) if k == "r1"));
    assert!(matches!(paul.get("mother"), Some(FieldValue::HasOne(None))));
    assert!(matches!(paul.get("pets"), Some(FieldValue::HasMany(ref pets)) if pets.is_empty()));
    assert!(paul.get("shoeSize").is_none());
}

// --- Relationships ---

#[tokio::test]
async fn test_has_many_tracks_membership() {
    let (_source, store) = test_store();
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul"})))
        .await
        .unwrap();
    let pets = paul.has_many("pets").unwrap();
    assert!(pets.value().is_empty());

    let rex = store
        .add_record(props(json!({"type": "animal", "id": "rex", "name": "Rex"})))
        .await
        .unwrap();
    pets.add(&rex).await.unwrap();

    let value = pets.value();
    assert_eq!(value.len(), 1);
    assert!(Arc::ptr_eq(&value[0], &rex));
    assert_eq!(pets.ids(), vec![RecordIdentity::new("animal", "rex")]);

    pets.remove(&rex).await.unwrap();
    assert!(pets.value().is_empty());
}

#[tokio::test]
async fn test_adding_related_type_invalidates_collection() {
    let (source, store) = test_store();
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1", "pets": []})))
        .await
        .unwrap();

    assert!(paul.related_records("pets").is_empty());
    assert!(paul.is_cached("pets"));

    // The new animal is not linked to Paul, but `pets` holds animals.
    source
        .update(vec![Operation::add_record(Record::new(RecordIdentity::new(
            "animal", "stray",
        )))])
        .await
        .unwrap();

    assert!(!paul.is_cached("pets"));
}

#[tokio::test]
async fn test_has_one_set_and_load() {
    let (_source, store) = test_store();
    let mom = store
        .add_record(props(json!({"type": "person", "id": "mom"})))
        .await
        .unwrap();
    let kid = store
        .add_record(props(json!({"type": "person", "id": "kid"})))
        .await
        .unwrap();

    let mother = kid.has_one("mother").unwrap();
    assert!(mother.value().is_none());

    mother.set(Some(&*mom)).await.unwrap();
    assert!(Arc::ptr_eq(&mother.value().unwrap(), &mom));

    let loaded = mother.load().await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&loaded, &mom));

    mother.set(None).await.unwrap();
    assert!(mother.value().is_none());
}

#[tokio::test]
async fn test_has_one_resolves_when_target_is_added_later() {
    let (_source, store) = test_store();
    let kid = store
        .add_record(props(json!({"type": "person", "id": "1", "mother": "2"})))
        .await
        .unwrap();
    let mother = store
        .cache()
        .live_query(QueryExpression::find_related_record(person("1"), "mother"))
        .unwrap();
    assert!(mother.is_empty());
    assert!(kid.related_record("mother").is_none());

    let mom = store
        .add_record(props(json!({"type": "person", "id": "2"})))
        .await
        .unwrap();

    assert_eq!(mother.len(), 1);
    assert!(Arc::ptr_eq(&mother.records()[0], &mom));
    assert!(Arc::ptr_eq(&kid.related_record("mother").unwrap(), &mom));

    store.remove_record(&person("2")).await.unwrap();
    assert!(mother.is_empty());
    assert!(kid.related_record("mother").is_none());
}

#[tokio::test]
async fn test_model_update_sets_every_attribute() {
    let (source, store) = test_store();
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul", "age": 40})))
        .await
        .unwrap();

    paul.update(props(json!({"name": "Paulo", "age": 41})))
        .await
        .unwrap();

    let record = source.record_snapshot(&person("1")).unwrap();
    assert_eq!(record.attribute("name"), Some(&json!("Paulo")));
    assert_eq!(record.attribute("age"), Some(&json!(41)));
    assert_eq!(paul.attribute("age"), Some(json!(41)));
}

#[tokio::test]
async fn test_delete_record_evicts() {
    let (_source, store) = test_store();
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul"})))
        .await
        .unwrap();

    paul.delete_record().await.unwrap();

    assert_eq!(store.tracked_models(), 0);
    assert!(store.find_record(&person("1")).await.unwrap().is_none());
    assert_eq!(paul.attribute("name"), None);
}

#[tokio::test]
async fn test_readding_record_materializes_new_instance() {
    let (_source, store) = test_store();
    let first = store
        .add_record(props(json!({"type": "person", "id": "1"})))
        .await
        .unwrap();
    store.remove_record(&person("1")).await.unwrap();

    let second = store
        .add_record(props(json!({"type": "person", "id": "1"})))
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
}

// --- Live queries ---

#[tokio::test]
async fn test_live_query_refreshes() {
    let (_source, store) = test_store();
    store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul"})))
        .await
        .unwrap();

    let people = store.cache().live_query(QueryExpression::find_records("person")).unwrap();
    assert_eq!(people.len(), 1);
    let paul = people.records()[0].clone();

    store
        .add_record(props(json!({"type": "person", "id": "2", "name": "Eve"})))
        .await
        .unwrap();
    assert!(people.is_stale());

    let members = people.records();
    assert_eq!(members.len(), 2);
    assert!(Arc::ptr_eq(&members[0], &paul));
    assert_eq!(members[1].id(), "2");
    assert_eq!(members.iter().filter(|m| m.id() == "2").count(), 1);
}

#[tokio::test]
async fn test_live_query_ignores_unrelated_types() {
    let (_source, store) = test_store();
    let people = store.cache().live_query(QueryExpression::find_records("person")).unwrap();
    assert!(people.is_empty());

    store
        .add_record(props(json!({"type": "animal", "id": "rex"})))
        .await
        .unwrap();

    assert!(!people.is_stale());
}

#[tokio::test]
async fn test_live_query_follows_sort() {
    let (_source, store) = test_store();
    for (id, age) in [("1", 40), ("2", 20), ("3", 30)] {
        store
            .add_record(props(json!({"type": "person", "id": id, "age": age})))
            .await
            .unwrap();
    }

    let by_age = store
        .cache()
        .scope("person")
        .sort(SortSpecifier::ascending("age"))
        .live()
        .unwrap();
    let ids: Vec<_> = by_age.iter().map(|m| m.id().to_string()).collect();
    assert_eq!(ids, vec!["2", "3", "1"]);

    store
        .update_record(&person("1"), props(json!({"age": 10})))
        .await
        .unwrap();
    let ids: Vec<_> = by_age.iter().map(|m| m.id().to_string()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_store_live_query_and_dispose() {
    let (source, store) = test_store();
    let listeners = source.listener_count();

    let people = store.live_query(QueryExpression::find_records("person")).await.unwrap();
    assert_eq!(source.listener_count(), listeners + 1);

    people.dispose();
    assert!(people.is_disposed());
    assert!(people.is_empty());
    assert_eq!(source.listener_count(), listeners);
}

#[tokio::test]
async fn test_scopes() {
    let (_source, store) = test_store();
    for (id, name) in [("1", "Paul"), ("2", "Eve"), ("3", "Paul")] {
        store
            .add_record(props(json!({"type": "person", "id": id, "name": name})))
            .await
            .unwrap();
    }

    let pauls = store.scope("person").where_eq("name", json!("Paul")).all().await.unwrap();
    assert_eq!(pauls.len(), 2);

    let eve = store.cache().scope("person").find("2").unwrap().unwrap();
    assert_eq!(eve.attribute("name"), Some(json!("Eve")));
    assert!(store.scope("person").find("404").await.unwrap().is_none());
}

// --- Source resets ---

#[tokio::test]
async fn test_reset_invalidates_everything() {
    let (source, store) = test_store();
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul"})))
        .await
        .unwrap();
    assert_eq!(paul.attribute("name"), Some(json!("Paul")));

    let stream = store.changes(None);
    source
        .reset(vec![Record::new(person("1")).with_attribute("name", json!("Replaced"))])
        .unwrap();

    assert_eq!(stream.try_recv().unwrap(), ChangeSet::Reset);
    assert_eq!(paul.attribute("name"), Some(json!("Replaced")));
}
