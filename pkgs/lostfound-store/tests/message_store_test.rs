// Copyright 2024 Lostfound Team.
//
// Tests for MessageStore

use lostfound_store::{
    Attachment, Conversation, ConversationStore, DatabaseConnection, MessageKind, MessageStore,
    NewMessage, StoreConfig, StoreError,
};
use tempfile::NamedTempFile;

struct Fixture {
    _file: NamedTempFile,
    messages: MessageStore,
    conv: Conversation,
}

async fn setup() -> Fixture {
    let temp_file = NamedTempFile::new().unwrap();
    let db: DatabaseConnection = StoreConfig::new(temp_file.path())
        .connect()
        .await
        .expect("Failed to open store");
    let conv = ConversationStore::new(db.clone())
        .get_or_create("post-1", "alice", "bob")
        .await
        .expect("Failed to create conversation");
    Fixture {
        _file: temp_file,
        messages: MessageStore::new(db),
        conv,
    }
}

fn photo() -> Attachment {
    Attachment {
        url: "http://localhost/chat-images/alice/1_photo.jpg".to_string(),
        name: Some("photo.jpg".to_string()),
        size: Some(2048),
    }
}

#[tokio::test]
async fn test_send_and_list_in_order() {
    let f = setup().await;

    for i in 0..10 {
        let sender = if i % 2 == 0 { "alice" } else { "bob" };
        f.messages
            .send(&f.conv.id, sender, NewMessage::text(format!("message {}", i)))
            .await
            .expect("Failed to send");
    }

    let listed = f.messages.list(&f.conv.id, 50, 0).await.unwrap();
    assert_eq!(listed.len(), 10);
    for (i, msg) in listed.iter().enumerate() {
        assert_eq!(msg.content.as_deref(), Some(format!("message {}", i).as_str()));
        assert_eq!(msg.seq, i as i64 + 1);
        assert!(!msg.is_read);
        assert!(!msg.is_edited);
    }

    // Pagination
    let page = f.messages.list(&f.conv.id, 3, 8).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].content.as_deref(), Some("message 8"));
}

#[tokio::test]
async fn test_send_image_with_empty_caption() {
    let f = setup().await;

    let msg = f
        .messages
        .send(&f.conv.id, "alice", NewMessage::image(photo(), ""))
        .await
        .unwrap();

    assert_eq!(msg.kind, MessageKind::Image);
    assert_eq!(msg.content.as_deref(), Some(""));
    assert_eq!(msg.attachment, Some(photo()));

    let stored = f.messages.get(&msg.id).await.unwrap().unwrap();
    assert_eq!(stored, msg);
}

#[tokio::test]
async fn test_send_rejects_non_participant() {
    let f = setup().await;

    let result = f
        .messages
        .send(&f.conv.id, "mallory", NewMessage::text("hi"))
        .await;
    assert!(matches!(result, Err(StoreError::Forbidden(_))));

    let result = f
        .messages
        .send("missing", "alice", NewMessage::text("hi"))
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_send_with_client_id_is_idempotent() {
    let f = setup().await;

    let first = f
        .messages
        .send(&f.conv.id, "alice", NewMessage::text("hi").with_client_id("c-1"))
        .await
        .unwrap();
    let retry = f
        .messages
        .send(&f.conv.id, "alice", NewMessage::text("hi").with_client_id("c-1"))
        .await
        .unwrap();

    assert_eq!(first.id, retry.id);
    assert_eq!(f.messages.list(&f.conv.id, 50, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reply_must_target_same_conversation() {
    let f = setup().await;

    let original = f
        .messages
        .send(&f.conv.id, "bob", NewMessage::text("Found a wallet"))
        .await
        .unwrap();
    let reply = f
        .messages
        .send(
            &f.conv.id,
            "alice",
            NewMessage::text("That's mine!").reply_to(&original.id),
        )
        .await
        .unwrap();
    assert_eq!(reply.reply_to.as_deref(), Some(original.id.as_str()));

    let result = f
        .messages
        .send(&f.conv.id, "alice", NewMessage::text("?").reply_to("nope"))
        .await;
    assert!(matches!(result, Err(StoreError::Validation(_))));
}

#[tokio::test]
async fn test_edit_text_message() {
    let f = setup().await;

    let msg = f
        .messages
        .send(&f.conv.id, "alice", NewMessage::text("helo"))
        .await
        .unwrap();
    let edited = f.messages.edit("alice", &msg.id, "hello").await.unwrap();

    assert_eq!(edited.content.as_deref(), Some("hello"));
    assert!(edited.is_edited);
    assert!(edited.edited_at.is_some());

    let stored = f.messages.get(&msg.id).await.unwrap().unwrap();
    assert_eq!(stored.content.as_deref(), Some("hello"));
    assert!(stored.is_edited);
}

#[tokio::test]
async fn test_edit_rejections() {
    let f = setup().await;

    let text = f
        .messages
        .send(&f.conv.id, "alice", NewMessage::text("hi"))
        .await
        .unwrap();
    let image = f
        .messages
        .send(&f.conv.id, "alice", NewMessage::image(photo(), ""))
        .await
        .unwrap();

    assert!(matches!(
        f.messages.edit("alice", &image.id, "caption").await,
        Err(StoreError::NotEditable(_))
    ));
    assert!(matches!(
        f.messages.edit("bob", &text.id, "changed").await,
        Err(StoreError::Forbidden(_))
    ));
    assert!(matches!(
        f.messages.edit("alice", &text.id, "  ").await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        f.messages.edit("alice", "missing", "x").await,
        Err(StoreError::NotFound(_))
    ));

    let stored = f.messages.get(&text.id).await.unwrap().unwrap();
    assert_eq!(stored.content.as_deref(), Some("hi"));
    assert!(!stored.is_edited);
}

#[tokio::test]
async fn test_delete_message() {
    let f = setup().await;

    let msg = f
        .messages
        .send(&f.conv.id, "alice", NewMessage::text("oops"))
        .await
        .unwrap();

    assert!(matches!(
        f.messages.delete("bob", &msg.id).await,
        Err(StoreError::Forbidden(_))
    ));

    let removed = f.messages.delete("alice", &msg.id).await.unwrap();
    assert_eq!(removed.id, msg.id);
    assert!(f.messages.get(&msg.id).await.unwrap().is_none());

    assert!(matches!(
        f.messages.delete("alice", &msg.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_mark_read_and_unread_count() {
    let f = setup().await;

    for text in ["one", "two", "three"] {
        f.messages
            .send(&f.conv.id, "bob", NewMessage::text(text))
            .await
            .unwrap();
    }
    f.messages
        .send(&f.conv.id, "alice", NewMessage::text("mine"))
        .await
        .unwrap();

    assert_eq!(f.messages.unread_count(&f.conv.id, "alice").await.unwrap(), 3);
    assert_eq!(f.messages.unread_count(&f.conv.id, "bob").await.unwrap(), 1);

    assert_eq!(f.messages.mark_read(&f.conv.id, "alice").await.unwrap(), 3);
    assert_eq!(f.messages.unread_count(&f.conv.id, "alice").await.unwrap(), 0);

    // Second call changes nothing
    assert_eq!(f.messages.mark_read(&f.conv.id, "alice").await.unwrap(), 0);

    // Alice's own message stays unread for bob
    assert_eq!(f.messages.unread_count(&f.conv.id, "bob").await.unwrap(), 1);
}

#[tokio::test]
async fn test_search() {
    let f = setup().await;

    for text in ["Lost a red wallet", "Is it leather?", "Yes, red leather"] {
        f.messages
            .send(&f.conv.id, "alice", NewMessage::text(text))
            .await
            .unwrap();
    }

    let hits = f.messages.search(&f.conv.id, "leather").await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].content.as_deref(), Some("Yes, red leather"));

    let hits = f.messages.search(&f.conv.id, "RED").await.unwrap();
    assert_eq!(hits.len(), 2);

    assert!(f.messages.search(&f.conv.id, "  ").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_matches_literally() {
    let f = setup().await;

    for text in ["Reward: 500 dollars", "I can pay 50% now", "Found an ÉCHARPE", "a_b"] {
        f.messages
            .send(&f.conv.id, "alice", NewMessage::text(text))
            .await
            .unwrap();
    }

    let hits = f.messages.search(&f.conv.id, "50%").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content.as_deref(), Some("I can pay 50% now"));

    let hits = f.messages.search(&f.conv.id, "_").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content.as_deref(), Some("a_b"));

    let hits = f.messages.search(&f.conv.id, "écharpe").await.unwrap();
    assert_eq!(hits.len(), 1);
}
