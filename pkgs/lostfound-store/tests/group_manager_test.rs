// Copyright 2024 Lostfound Team.
//
// Tests for GroupManager

use lostfound_store::{
    ConversationStore, DatabaseConnection, GroupManager, GroupRole, GroupUpdate, MessageStore,
    NewMessage, StoreConfig, StoreError,
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

fn ids(users: &[&str]) -> Vec<String> {
    users.iter().map(|u| u.to_string()).collect()
}

#[tokio::test]
async fn test_creator_is_first_admin() {
    let (_file, db) = setup().await;
    let groups = GroupManager::new(db);

    let group = groups
        .create("Campus finds", Some("Library lost & found"), "alice", &ids(&["bob", "carol", "alice", "bob"]))
        .await
        .expect("Failed to create group");
    assert_eq!(group.created_by, "alice");

    let members = groups.members(&group.id).await.unwrap();
    let users: Vec<&str> = members.iter().map(|m| m.user_id.as_str()).collect();
    assert_eq!(users, vec!["alice", "bob", "carol"]);
    assert_eq!(members[0].role, GroupRole::Admin);
    assert!(members[1..].iter().all(|m| m.role == GroupRole::Member));
}

#[tokio::test]
async fn test_create_rejects_empty_name() {
    let (_file, db) = setup().await;
    let groups = GroupManager::new(db);

    let result = groups.create("  ", None, "alice", &[]).await;
    assert!(matches!(result, Err(StoreError::Validation(_))));
}

#[tokio::test]
async fn test_only_admin_adds_members() {
    let (_file, db) = setup().await;
    let groups = GroupManager::new(db);
    let group = groups
        .create("Finders", None, "alice", &ids(&["bob"]))
        .await
        .unwrap();

    let result = groups
        .add_member("bob", &group.id, "carol", GroupRole::Member)
        .await;
    assert!(matches!(result, Err(StoreError::Forbidden(_))));

    let added = groups
        .add_member("alice", &group.id, "carol", GroupRole::Member)
        .await
        .unwrap();
    assert_eq!(added.user_id, "carol");

    let result = groups
        .add_member("alice", &group.id, "carol", GroupRole::Admin)
        .await;
    assert!(matches!(result, Err(StoreError::Validation(_))));

    let members = groups.members(&group.id).await.unwrap();
    assert_eq!(members.last().unwrap().user_id, "carol");
}

#[tokio::test]
async fn test_remove_member() {
    let (_file, db) = setup().await;
    let groups = GroupManager::new(db);
    let group = groups
        .create("Finders", None, "alice", &ids(&["bob", "carol"]))
        .await
        .unwrap();

    // Members may leave, but not kick others
    assert!(matches!(
        groups.remove_member("bob", &group.id, "carol").await,
        Err(StoreError::Forbidden(_))
    ));
    groups.remove_member("bob", &group.id, "bob").await.unwrap();
    groups.remove_member("alice", &group.id, "carol").await.unwrap();

    assert_eq!(groups.members(&group.id).await.unwrap().len(), 1);
    assert!(matches!(
        groups.remove_member("alice", &group.id, "carol").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_last_admin_cannot_leave() {
    let (_file, db) = setup().await;
    let groups = GroupManager::new(db);
    let group = groups
        .create("Finders", None, "alice", &ids(&["bob"]))
        .await
        .unwrap();

    assert!(matches!(
        groups.remove_member("alice", &group.id, "alice").await,
        Err(StoreError::Validation(_))
    ));

    groups
        .add_member("alice", &group.id, "carol", GroupRole::Admin)
        .await
        .unwrap();
    groups.remove_member("carol", &group.id, "alice").await.unwrap();
    assert_eq!(
        groups.role_of(&group.id, "carol").await.unwrap(),
        Some(GroupRole::Admin)
    );
    assert!(matches!(
        groups.remove_member("carol", &group.id, "carol").await,
        Err(StoreError::Validation(_))
    ));
}

#[tokio::test]
async fn test_update_group() {
    let (_file, db) = setup().await;
    let groups = GroupManager::new(db);
    let group = groups
        .create("Finders", None, "alice", &ids(&["bob"]))
        .await
        .unwrap();

    let update = GroupUpdate {
        name: Some("Keepers".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        groups.update("bob", &group.id, update.clone()).await,
        Err(StoreError::Forbidden(_))
    ));

    let updated = groups.update("alice", &group.id, update).await.unwrap();
    assert_eq!(updated.name, "Keepers");
    assert!(updated.updated_at >= group.updated_at);

    let listed = groups.list_for("bob").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Keepers");
}

#[tokio::test]
async fn test_delete_cascades() {
    let (_file, db) = setup().await;
    let groups = GroupManager::new(db.clone());
    let conversations = ConversationStore::new(db.clone());
    let messages = MessageStore::new(db);

    let group = groups
        .create("Finders", None, "alice", &ids(&["bob"]))
        .await
        .unwrap();
    let conv = conversations
        .find_by_group(&group.id)
        .await
        .unwrap()
        .unwrap();
    let msg = messages
        .send(&conv.id, "bob", NewMessage::text("hello group"))
        .await
        .unwrap();

    assert!(matches!(
        groups.delete("bob", &group.id).await,
        Err(StoreError::Forbidden(_))
    ));
    groups.delete("alice", &group.id).await.unwrap();

    assert!(groups.get(&group.id).await.unwrap().is_none());
    assert!(groups.members(&group.id).await.unwrap().is_empty());
    assert!(conversations.get(&conv.id).await.unwrap().is_none());
    assert!(messages.get(&msg.id).await.unwrap().is_none());
    assert!(groups.list_for("bob").await.unwrap().is_empty());
}
