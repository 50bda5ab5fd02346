mod cli;
mod demo;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use cli::{Args, Command};
use lostfound_attachments::FsAttachmentStore;
use lostfound_chat::{ChatService, EventKinds};
use lostfound_store::{Message, NewMessage, StoreConfig};
use std::sync::Arc;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

fn print_message(msg: &Message) {
    let text = msg.content.as_deref().unwrap_or_default();
    let body = match &msg.attachment {
        Some(att) if text.is_empty() => format!("[{}]", att.url),
        Some(att) => format!("{} [{}]", text, att.url),
        None => text.to_string(),
    };
    let edited = if msg.is_edited { " (edited)" } else { "" };
    let read = if msg.is_read { "✓✓" } else { "✓" };
    println!(
        "{:>4} {} {:<10} {:<6} {}{} {}  [{}]",
        msg.seq,
        msg.created_at.format("%Y-%m-%d %H:%M:%S"),
        msg.sender_id,
        msg.kind,
        body,
        edited,
        read,
        msg.id
    );
}

#[instrument(skip(chat))]
async fn watch(
    chat: &ChatService,
    conversation_id: &str,
    user_id: &str,
    duration: Option<std::time::Duration>,
) -> Result<()> {
    let mut sub = chat
        .subscribe(user_id, conversation_id, EventKinds::ALL)
        .await?;
    info!("Watching conversation {}", conversation_id);

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = sub.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
            _ = &mut deadline => break,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let args = Args::parse();

    let db = StoreConfig::new(&args.db).connect().await?;
    let attachments = Arc::new(
        FsAttachmentStore::new(&args.uploads, &args.base_url)
            .context("Invalid attachment store settings")?,
    );
    let chat = ChatService::new(db, attachments, args.chat_config());

    match args.command {
        Command::Open { post, user, peer } => {
            let conv = chat.get_or_create_conversation(&post, &user, &peer).await?;
            println!("{}", conv.id);
        }
        Command::Conversations { user } => {
            for conv in chat.list_conversations(&user).await? {
                let unread = chat.unread_count(&conv.id, &user).await?;
                let title = match conv.peer_of(&user) {
                    Some(peer) => format!("with {}", peer),
                    None => format!("group {}", conv.group_id.as_deref().unwrap_or("?")),
                };
                println!(
                    "{}  {:<20} {:>3} unread  {}",
                    conv.id,
                    title,
                    unread,
                    conv.last_message.as_deref().unwrap_or("")
                );
            }
        }
        Command::Send {
            target,
            text,
            reply_to,
            client_id,
        } => {
            let mut msg = NewMessage::text(text);
            if let Some(reply_to) = reply_to {
                msg = msg.reply_to(reply_to);
            }
            if let Some(client_id) = client_id {
                msg = msg.with_client_id(client_id);
            }
            let sent = chat
                .send_message(&target.conversation, &target.user, msg)
                .await?;
            print_message(&sent);
        }
        Command::SendFile {
            target,
            path,
            image,
            caption,
        } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let data = Bytes::from(data);
            let sent = if image {
                chat.send_image(&target.conversation, &target.user, data, &caption)
                    .await?
            } else {
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .context("File path has no usable file name")?;
                let content_type = mime_guess::from_path(&path).first_raw();
                chat.send_file(
                    &target.conversation,
                    &target.user,
                    data,
                    file_name,
                    content_type,
                )
                .await?
            };
            print_message(&sent);
        }
        Command::History {
            target,
            limit,
            offset,
        } => {
            for msg in chat
                .list_messages(&target.user, &target.conversation, limit, offset)
                .await?
            {
                print_message(&msg);
            }
        }
        Command::Edit {
            user,
            message,
            text,
        } => {
            let edited = chat.edit_message(&user, &message, &text).await?;
            print_message(&edited);
        }
        Command::Delete { user, message } => {
            let removed = chat.delete_message(&user, &message).await?;
            println!("Deleted {}", removed.id);
        }
        Command::Read { target } => {
            let count = chat.mark_read(&target.conversation, &target.user).await?;
            println!("Marked {} messages read", count);
        }
        Command::Search { target, query } => {
            for msg in chat
                .search_messages(&target.user, &target.conversation, &query)
                .await?
            {
                print_message(&msg);
            }
        }
        Command::GroupCreate {
            user,
            name,
            description,
            members,
        } => {
            let (group, conv) = chat
                .create_group(&user, &name, description.as_deref(), &members)
                .await?;
            println!("group {}  conversation {}", group.id, conv.id);
        }
        Command::Watch { target, duration } => {
            watch(&chat, &target.conversation, &target.user, duration).await?;
        }
        Command::Demo => {
            demo::run(&chat).await?;
        }
    }

    Ok(())
}
