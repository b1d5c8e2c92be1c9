//! Fork and merge tests.
//!
//! A fork gets its own source branch and its own identity map; merging
//! replays the fork's operations onto the parent.

use record_cache::{
    Attributes, IdentityMapFactory, MemorySource, ModelDefinition, QueryExpression, RecordIdentity,
    Schema, Store, StoreConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn schema() -> Schema {
    Schema::new()
        .with_model("person", ModelDefinition::new().attribute("name").has_many("pets", "animal"))
        .with_model("animal", ModelDefinition::new().attribute("name"))
}

fn props(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

fn person(id: &str) -> RecordIdentity {
    RecordIdentity::new("person", id)
}

async fn seeded_store() -> Store {
    let store = Store::new(Arc::new(MemorySource::new(schema())));
    store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul"})))
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_fork_isolation() {
    let store = seeded_store().await;
    let fork = store.fork();

    let original = store.find_record(&person("1")).await.unwrap().unwrap();
    let forked = fork.find_record(&person("1")).await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&original, &forked));

    fork.update_record(&person("1"), props(json!({"name": "Forked Paul"})))
        .await
        .unwrap();
    fork.add_record(props(json!({"type": "person", "id": "2", "name": "Eve"})))
        .await
        .unwrap();

    assert_eq!(original.attribute("name"), Some(json!("Paul")));
    assert_eq!(forked.attribute("name"), Some(json!("Forked Paul")));
    assert_eq!(store.find_records("person").await.unwrap().len(), 1);
    assert_eq!(fork.find_records("person").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_parent_changes_do_not_reach_fork() {
    let store = seeded_store().await;
    let fork = store.fork();
    let forked = fork.find_record(&person("1")).await.unwrap().unwrap();
    assert_eq!(forked.attribute("name"), Some(json!("Paul")));

    store.remove_record(&person("1")).await.unwrap();

    assert!(forked.is_cached("name"));
    assert!(fork.find_record(&person("1")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_merge_applies_fork_operations() {
    let store = seeded_store().await;
    let paul = store.find_record(&person("1")).await.unwrap().unwrap();
    let people = store.cache().live_query(QueryExpression::find_records("person")).unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(paul.attribute("name"), Some(json!("Paul")));

    let fork = store.fork();
    fork.update_record(&person("1"), props(json!({"name": "Paulo"})))
        .await
        .unwrap();
    fork.add_record(props(json!({"type": "person", "id": "2"})))
        .await
        .unwrap();

    let applied = store.merge(&fork).await.unwrap();

    assert_eq!(applied.len(), 2);
    assert_eq!(paul.attribute("name"), Some(json!("Paulo")));
    assert_eq!(people.len(), 2);
    assert!(store.is_idle());
}

#[tokio::test]
async fn test_merge_of_untouched_fork_is_empty() {
    let store = seeded_store().await;
    let fork = store.fork();
    assert!(store.merge(&fork).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_shared_factory_gives_fork_fresh_map() {
    let factory = Arc::new(IdentityMapFactory::new());
    let source = Arc::new(MemorySource::new(schema()));

    let store = Store::with_identity_maps(source.clone(), StoreConfig::default(), factory.clone());
    let sibling = Store::with_identity_maps(source, StoreConfig::default(), factory.clone());
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1"})))
        .await
        .unwrap();

    // Same source, same map.
    let seen_by_sibling = sibling.cache().find_record(&person("1")).unwrap().unwrap();
    assert!(Arc::ptr_eq(&paul, &seen_by_sibling));

    let fork = store.fork();
    let forked = fork.cache().find_record(&person("1")).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&paul, &forked));
    assert_eq!(factory.len(), 2);
}

#[tokio::test]
async fn test_shared_map_survives_dropping_first_store() {
    let factory = Arc::new(IdentityMapFactory::new());
    let source = Arc::new(MemorySource::new(schema()));

    let store = Store::with_identity_maps(source.clone(), StoreConfig::default(), factory.clone());
    let sibling = Store::with_identity_maps(source, StoreConfig::default(), factory);
    let paul = store
        .add_record(props(json!({"type": "person", "id": "1", "name": "Paul"})))
        .await
        .unwrap();
    drop(store);
    assert!(!paul.is_connected());

    let seen_by_sibling = sibling.cache().find_record(&person("1")).unwrap().unwrap();
    assert!(Arc::ptr_eq(&paul, &seen_by_sibling));
    assert!(seen_by_sibling.is_connected());
    assert_eq!(seen_by_sibling.attribute("name"), Some(json!("Paul")));

    seen_by_sibling
        .set_attribute("name", json!("Paulo"))
        .await
        .unwrap();
    assert_eq!(
        sibling.find_record(&person("1")).await.unwrap().unwrap().attribute("name"),
        Some(json!("Paulo"))
    );
}
