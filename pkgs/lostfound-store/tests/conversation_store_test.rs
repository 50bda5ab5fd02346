// Copyright 2024 Lostfound Team.
//
// Tests for ConversationStore

use chrono::{Duration, Utc};
use lostfound_store::{
    ConversationKind, ConversationStore, DatabaseConnection, GroupManager, StoreConfig, StoreError,
};
use tempfile::NamedTempFile;

async fn setup() -> (NamedTempFile, DatabaseConnection) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = StoreConfig::new(temp_file.path())
        .connect()
        .await
        .expect("Failed to open store");
    (temp_file, db)
}

#[tokio::test]
async fn test_get_or_create_is_idempotent() {
    let (_file, db) = setup().await;
    let store = ConversationStore::new(db);

    let first = store
        .get_or_create("post-1", "alice", "bob")
        .await
        .expect("Failed to create conversation");
    let second = store
        .get_or_create("post-1", "alice", "bob")
        .await
        .expect("Failed to get conversation");

    assert_eq!(first.id, second.id);
    assert_eq!(first.kind, ConversationKind::Direct);
    assert_eq!(first.post_id.as_deref(), Some("post-1"));
    assert!(first.last_message.is_none());
}

#[tokio::test]
async fn test_get_or_create_ignores_participant_order() {
    let (_file, db) = setup().await;
    let store = ConversationStore::new(db);

    let ab = store.get_or_create("post-1", "alice", "bob").await.unwrap();
    let ba = store.get_or_create("post-1", "bob", "alice").await.unwrap();
    assert_eq!(ab.id, ba.id);

    // Different post, different conversation
    let other = store.get_or_create("post-2", "alice", "bob").await.unwrap();
    assert_ne!(ab.id, other.id);
}

#[tokio::test]
async fn test_concurrent_get_or_create_yields_one_row() {
    let (_file, db) = setup().await;
    let store = ConversationStore::new(db);

    let s1 = store.clone();
    let s2 = store.clone();
    let (a, b) = tokio::join!(
        async move { s1.get_or_create("post-9", "alice", "bob").await },
        async move { s2.get_or_create("post-9", "bob", "alice").await },
    );

    assert_eq!(a.unwrap().id, b.unwrap().id);
    assert_eq!(store.list_for("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_or_create_rejects_self_conversation() {
    let (_file, db) = setup().await;
    let store = ConversationStore::new(db);

    let result = store.get_or_create("post-1", "alice", "alice").await;
    assert!(matches!(result, Err(StoreError::Validation(_))));

    let result = store.get_or_create("", "alice", "bob").await;
    assert!(matches!(result, Err(StoreError::Validation(_))));
}

#[tokio::test]
async fn test_list_for_orders_by_activity() {
    let (_file, db) = setup().await;
    let store = ConversationStore::new(db);

    let c1 = store.get_or_create("post-1", "alice", "bob").await.unwrap();
    let c2 = store.get_or_create("post-2", "alice", "carol").await.unwrap();
    let c3 = store.get_or_create("post-3", "dave", "alice").await.unwrap();
    store.get_or_create("post-4", "bob", "carol").await.unwrap();

    let now = Utc::now();
    store
        .update_last_message(&c1.id, "oldest", now - Duration::minutes(10))
        .await
        .unwrap();
    store
        .update_last_message(&c2.id, "newest", now)
        .await
        .unwrap();
    store
        .update_last_message(&c3.id, "middle", now - Duration::minutes(5))
        .await
        .unwrap();

    let convs = store.list_for("alice").await.unwrap();
    let ids: Vec<&str> = convs.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![c2.id.as_str(), c3.id.as_str(), c1.id.as_str()]);
    assert_eq!(convs[0].last_message.as_deref(), Some("newest"));
}

#[tokio::test]
async fn test_update_last_message_unknown_conversation() {
    let (_file, db) = setup().await;
    let store = ConversationStore::new(db);

    let result = store
        .update_last_message("missing", "hi", Utc::now())
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_group_conversation_is_listed_for_members() {
    let (_file, db) = setup().await;
    let store = ConversationStore::new(db.clone());
    let groups = GroupManager::new(db);

    let group = groups
        .create("Finders", None, "alice", &["bob".to_string()])
        .await
        .unwrap();
    let conv = store
        .find_by_group(&group.id)
        .await
        .unwrap()
        .expect("group conversation missing");
    assert_eq!(conv.kind, ConversationKind::Group);

    assert!(store.is_participant(&conv.id, "bob").await.unwrap());
    assert!(!store.is_participant(&conv.id, "mallory").await.unwrap());

    let bob_convs = store.list_for("bob").await.unwrap();
    assert_eq!(bob_convs.len(), 1);
    assert_eq!(bob_convs[0].id, conv.id);
}
