//! Change stream tests.

use record_cache::{
    Attributes, ChangeSet, MemorySource, ModelDefinition, RecordIdentity, Schema, Store,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn test_store() -> (Arc<MemorySource>, Store) {
    let schema = Schema::new()
        .with_model(
            "person",
            ModelDefinition::new()
                .attribute("name")
                .key("remoteId")
                .has_many("pets", "animal"),
        )
        .with_model("animal", ModelDefinition::new().attribute("name"));
    let source = Arc::new(MemorySource::new(schema));
    let store = Store::new(source.clone());
    (source, store)
}

fn props(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

fn person(id: &str) -> RecordIdentity {
    RecordIdentity::new("person", id)
}

#[tokio::test]
async fn test_targeted_stream_reports_fields() {
    let (_source, store) = test_store();
    store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul"})))
        .await
        .unwrap();
    let stream = store.changes(Some(&person("1")));

    store
        .update_record(&person("1"), props(json!({"name": "Paulo"})))
        .await
        .unwrap();
    // Another record's change is not reported.
    store
        .add_record(props(json!({"type": "person", "id": "2"})))
        .await
        .unwrap();

    assert_eq!(
        stream.drain(),
        vec![ChangeSet::patch(person("1"), vec!["name".to_string()])]
    );
}

#[tokio::test]
async fn test_targeted_stream_infers_collections() {
    let (_source, store) = test_store();
    store
        .add_record(props(json!({"type": "person", "id": "1"})))
        .await
        .unwrap();
    let stream = store.changes(Some(&person("1")));

    store
        .add_record(props(json!({"type": "animal", "id": "rex"})))
        .await
        .unwrap();

    assert_eq!(
        stream.try_recv().unwrap(),
        ChangeSet::patch(person("1"), vec!["pets".to_string()])
    );
}

#[tokio::test]
async fn test_removal_terminates_targeted_stream() {
    let (_source, store) = test_store();
    store
        .add_record(props(json!({"type": "person", "id": "1"})))
        .await
        .unwrap();
    let stream = store.changes(Some(&person("1")));

    store.remove_record(&person("1")).await.unwrap();

    assert_eq!(stream.recv().unwrap(), ChangeSet::removal(person("1")));
    assert!(stream.recv().is_err());
    assert!(stream.is_complete());

    // Nothing more is delivered, even if the identity comes back.
    store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Again"})))
        .await
        .unwrap();
    assert!(stream.recv_timeout(Duration::from_millis(10)).is_err());
}

#[tokio::test]
async fn test_untargeted_stream_sees_everything() {
    let (_source, store) = test_store();
    let stream = store.changes(None);

    store
        .add_record(props(json!({"type": "person", "id": "1"})))
        .await
        .unwrap();
    store
        .update_record(&person("1"), props(json!({"name": "Paul"})))
        .await
        .unwrap();
    store.remove_record(&person("1")).await.unwrap();

    assert_eq!(
        stream.drain(),
        vec![
            ChangeSet::patch(person("1"), Vec::new()),
            ChangeSet::patch(person("1"), Vec::new()),
            ChangeSet::removal(person("1")),
        ]
    );
    // Removals do not end an untargeted stream.
    assert!(!stream.is_complete());
}

#[tokio::test]
async fn test_cancelled_stream_stops_receiving() {
    let (source, store) = test_store();
    let listeners = source.listener_count();
    let stream = store.changes(None);
    assert_eq!(source.listener_count(), listeners + 1);

    stream.cancel();
    assert!(stream.is_cancelled());
    assert_eq!(source.listener_count(), listeners);

    store
        .add_record(props(json!({"type": "person", "id": "1"})))
        .await
        .unwrap();
    assert!(stream.drain().is_empty());
}

#[tokio::test]
async fn test_dropping_stream_unsubscribes() {
    let (source, store) = test_store();
    let listeners = source.listener_count();

    drop(store.changes(Some(&person("1"))));

    assert_eq!(source.listener_count(), listeners);
}

#[tokio::test]
async fn test_multiple_streams_see_same_changes() {
    let (_source, store) = test_store();
    store
        .add_record(props(json!({"type": "person", "id": "1"})))
        .await
        .unwrap();
    let first = store.changes(Some(&person("1")));
    let second = store.changes(Some(&person("1")));

    store
        .update_record(&person("1"), props(json!({"name": "Paul"})))
        .await
        .unwrap();

    assert_eq!(first.drain(), second.drain());
}
