//! Scripted two-user conversation used to eyeball the whole pipeline

use anyhow::Result;
use lostfound_chat::{ChangeEvent, ChatService, EventKinds, TypingDebouncer, TypingSignal};
use std::time::Duration;
use tokio::time::{sleep, sleep_until};
use tracing::info;

const KEYSTROKE_GAP: Duration = Duration::from_millis(120);

fn describe(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::MessageInserted(msg) => format!(
            "💬 {}: {}",
            msg.sender_id,
            msg.preview()
        ),
        ChangeEvent::MessageUpdated(msg) => format!(
            "✏️  {} edited: {}",
            msg.sender_id,
            msg.content.as_deref().unwrap_or_default()
        ),
        ChangeEvent::MessageDeleted { message_id, .. } => format!("🗑️  deleted {}", message_id),
        ChangeEvent::MessagesRead { reader_id, count, .. } => {
            format!("👀 {} read {} messages", reader_id, count)
        }
        ChangeEvent::Typing { state, expired } => match (state.is_typing, expired) {
            (true, _) => format!("⌨️  {} is typing...", state.user_id),
            (false, true) => format!("⌨️  {} went quiet", state.user_id),
            (false, false) => format!("⌨️  {} stopped typing", state.user_id),
        },
        ChangeEvent::Lagged { missed } => format!("⚠️  missed {} events", missed),
    }
}

/// Type `text` one key at a time, reporting typing through the debouncer
async fn compose(
    chat: &ChatService,
    debouncer: &mut TypingDebouncer,
    conversation_id: &str,
    user_id: &str,
    text: &str,
) -> Result<()> {
    for _ in text.chars() {
        if let Some(signal) = debouncer.keystroke() {
            chat.set_typing(conversation_id, user_id, signal.is_typing())
                .await?;
        }
        sleep(KEYSTROKE_GAP).await;
    }
    Ok(())
}

async fn send(
    chat: &ChatService,
    debouncer: &mut TypingDebouncer,
    conversation_id: &str,
    user_id: &str,
    text: &str,
) -> Result<String> {
    compose(chat, debouncer, conversation_id, user_id, text).await?;
    let msg = chat.send_text(conversation_id, user_id, text).await?;
    if let Some(signal) = debouncer.sent() {
        chat.set_typing(conversation_id, user_id, signal.is_typing())
            .await?;
    }
    Ok(msg.id)
}

pub async fn run(chat: &ChatService) -> Result<()> {
    let window = chat.config().typing_debounce;
    let conv = chat
        .get_or_create_conversation("demo-post", "alice", "bob")
        .await?;
    info!("Demo conversation {}", conv.id);

    let watcher = chat
        .subscribe_with("bob", &conv.id, EventKinds::ALL, |event| {
            println!("  [bob sees] {}", describe(&event));
        })
        .await?;

    let mut alice = TypingDebouncer::new(window);
    let mut bob = TypingDebouncer::new(window);

    let first = send(
        chat,
        &mut alice,
        &conv.id,
        "alice",
        "Hi! I think I found your wallet",
    )
    .await?;
    chat.mark_read(&conv.id, "bob").await?;

    // Bob starts typing and then hesitates long enough for the debounce to fire
    compose(chat, &mut bob, &conv.id, "bob", "Really?").await?;
    if let Some(deadline) = bob.deadline() {
        sleep_until(deadline).await;
    }
    if let Some(TypingSignal::Stop) = bob.poll() {
        chat.set_typing(&conv.id, "bob", false).await?;
    }

    send(chat, &mut bob, &conv.id, "bob", "Is it a brown leather one?").await?;
    chat.edit_message("alice", &first, "Hi! I think I found your wallet near the library")
        .await?;
    send(chat, &mut alice, &conv.id, "alice", "Yes, brown leather").await?;
    chat.mark_read(&conv.id, "bob").await?;

    sleep(Duration::from_millis(200)).await;
    watcher.unsubscribe();

    println!();
    for msg in chat.list_messages("alice", &conv.id, None, 0).await? {
        println!(
            "{} {:<6} {}{}",
            msg.created_at.format("%H:%M:%S"),
            msg.sender_id,
            msg.content.as_deref().unwrap_or_default(),
            if msg.is_edited { " (edited)" } else { "" }
        );
    }
    Ok(())
}
