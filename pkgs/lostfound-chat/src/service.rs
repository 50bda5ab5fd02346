//! Chat service facade
//!
//! `ChatService` is what the UI layer talks to. It owns the stores, the
//! attachment backend, the change bus and the typing tracker, authorizes
//! every call against the acting user and publishes a change event after
//! each successful mutation.
//!
//! Mutations are serialized per conversation so that events leave the bus
//! in commit order.

use bytes::Bytes;
use lostfound_attachments::{file_path_hint, image_path_hint, AttachmentStore};
use lostfound_store::{
    Attachment, Conversation, ConversationStore, DatabaseConnection, GroupChat, GroupManager,
    GroupMember, GroupRole, GroupUpdate, Message, MessageStore, NewMessage, SYSTEM_SENDER,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{ChangeBus, ChangeEvent, EventKinds, Subscription, SubscriptionHandle};
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::typing::{TypingState, TypingTracker};

const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

type LockTable = parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Holds a conversation's mutation lock; the table entry goes away with the
/// last holder
struct ConversationGuard<'a> {
    table: &'a LockTable,
    conversation_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut table = self.table.lock();
        if table
            .get(&self.conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.conversation_id);
        }
    }
}

struct ServiceInner {
    config: ChatConfig,
    messages: MessageStore,
    conversations: ConversationStore,
    groups: GroupManager,
    attachments: Arc<dyn AttachmentStore>,
    bus: ChangeBus,
    typing: TypingTracker,
    locks: LockTable,
    sweeper: JoinHandle<()>,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

/// Real-time chat service
#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ServiceInner>,
}

impl ChatService {
    /// Build the service over an open database and an attachment backend
    ///
    /// Must be called from within a tokio runtime; the typing sweeper is
    /// spawned here.
    pub fn new(
        db: DatabaseConnection,
        attachments: Arc<dyn AttachmentStore>,
        config: ChatConfig,
    ) -> Self {
        let bus = ChangeBus::new(config.bus_capacity);
        let typing = TypingTracker::new(bus.clone(), config.typing_ttl);
        let sweeper = typing.spawn_sweeper(config.typing_sweep_interval);

        info!(
            "Chat service ready (typing ttl {:?}, upload limit {} bytes)",
            config.typing_ttl, config.max_file_size
        );

        Self {
            inner: Arc::new(ServiceInner {
                messages: MessageStore::new(db.clone()),
                conversations: ConversationStore::new(db.clone()),
                groups: GroupManager::new(db),
                attachments,
                bus,
                typing,
                locks: parking_lot::Mutex::new(HashMap::new()),
                sweeper,
                config,
            }),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.inner.bus
    }

    async fn lock_conversation(&self, conversation_id: &str) -> ConversationGuard<'_> {
        let lock = self
            .inner
            .locks
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .clone();
        ConversationGuard {
            table: &self.inner.locks,
            conversation_id: conversation_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Conversations with a mutation in flight or waiting
    pub fn active_locks(&self) -> usize {
        self.inner.locks.lock().len()
    }

    async fn require_participant(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        if self
            .inner
            .conversations
            .is_participant(conversation_id, user_id)
            .await?
        {
            Ok(())
        } else {
            Err(ChatError::Forbidden(format!(
                "{} is not a participant of conversation {}",
                user_id, conversation_id
            )))
        }
    }

    // Conversations

    /// Open the conversation between two users about a post
    pub async fn get_or_create_conversation(
        &self,
        post_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation> {
        Ok(self
            .inner
            .conversations
            .get_or_create(post_id, user_a, user_b)
            .await?)
    }

    pub async fn get_conversation(&self, actor_id: &str, conversation_id: &str) -> Result<Conversation> {
        self.require_participant(conversation_id, actor_id).await?;
        Ok(self.inner.conversations.require(conversation_id).await?)
    }

    /// Conversations of a user, most recent activity first
    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        Ok(self.inner.conversations.list_for(user_id).await?)
    }

    // Messages

    /// Persist a message, refresh the conversation preview and publish it
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        msg: NewMessage,
    ) -> Result<Message> {
        let _guard = self.lock_conversation(conversation_id).await;

        if let Some(client_id) = msg.client_message_id.as_deref() {
            if let Some(existing) = self
                .inner
                .messages
                .find_by_client_id(conversation_id, sender_id, client_id)
                .await?
            {
                debug!("Send {} already stored as {}", client_id, existing.id);
                return Ok(existing);
            }
        }

        let message = self
            .inner
            .messages
            .send(conversation_id, sender_id, msg)
            .await?;

        if let Err(e) = self
            .inner
            .conversations
            .update_last_message(conversation_id, &message.preview(), message.created_at)
            .await
        {
            warn!(
                "Failed to update preview of conversation {}: {}",
                conversation_id, e
            );
        }

        self.inner
            .bus
            .publish(conversation_id, ChangeEvent::MessageInserted(message.clone()));
        Ok(message)
    }

    pub async fn send_text(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Message> {
        self.send_message(conversation_id, sender_id, NewMessage::text(text))
            .await
    }

    fn check_upload(&self, data: &Bytes) -> Result<()> {
        if data.is_empty() {
            return Err(ChatError::Validation("attachment is empty".to_string()));
        }
        let limit = self.inner.config.max_file_size;
        if data.len() as u64 > limit {
            return Err(ChatError::Validation(format!(
                "attachment is {} bytes, limit is {} bytes",
                data.len(),
                limit
            )));
        }
        Ok(())
    }

    /// Upload an image and send it with an optional caption
    pub async fn send_image(
        &self,
        conversation_id: &str,
        sender_id: &str,
        data: Bytes,
        caption: &str,
    ) -> Result<Message> {
        self.check_upload(&data)?;
        self.require_participant(conversation_id, sender_id).await?;

        let stored = self
            .inner
            .attachments
            .put(
                data,
                Some(IMAGE_CONTENT_TYPE),
                &image_path_hint(conversation_id, sender_id),
            )
            .await?;
        let name = stored.path.rsplit('/').next().map(str::to_string);

        let attachment = Attachment {
            url: stored.url,
            name,
            size: Some(stored.size),
        };
        self.send_uploaded(
            conversation_id,
            sender_id,
            NewMessage::image(attachment, caption),
            &stored.path,
        )
        .await
    }

    /// Upload a file and send it; the message content is the file name
    pub async fn send_file(
        &self,
        conversation_id: &str,
        sender_id: &str,
        data: Bytes,
        file_name: &str,
        content_type: Option<&str>,
    ) -> Result<Message> {
        if file_name.trim().is_empty() {
            return Err(ChatError::Validation(
                "file name must not be empty".to_string(),
            ));
        }
        self.check_upload(&data)?;
        self.require_participant(conversation_id, sender_id).await?;

        let stored = self
            .inner
            .attachments
            .put(
                data,
                content_type,
                &file_path_hint(conversation_id, sender_id, file_name),
            )
            .await?;

        let attachment = Attachment {
            url: stored.url,
            name: Some(file_name.to_string()),
            size: Some(stored.size),
        };
        self.send_uploaded(
            conversation_id,
            sender_id,
            NewMessage::file(attachment),
            &stored.path,
        )
        .await
    }

    async fn send_uploaded(
        &self,
        conversation_id: &str,
        sender_id: &str,
        msg: NewMessage,
        path: &str,
    ) -> Result<Message> {
        // Objects are content addressed and may back earlier messages, so a
        // failed send leaves the upload in place.
        self.send_message(conversation_id, sender_id, msg)
            .await
            .inspect_err(|e| warn!("Send failed after upload of {}: {}", path, e))
    }

    /// Post a message on behalf of the service itself
    pub async fn post_system_message(&self, conversation_id: &str, text: &str) -> Result<Message> {
        self.send_message(conversation_id, SYSTEM_SENDER, NewMessage::system(text))
            .await
    }

    pub async fn edit_message(
        &self,
        actor_id: &str,
        message_id: &str,
        new_content: &str,
    ) -> Result<Message> {
        let existing = self.require_message(message_id).await?;

        let _guard = self.lock_conversation(&existing.conversation_id).await;

        let updated = self
            .inner
            .messages
            .edit(actor_id, message_id, new_content)
            .await?;
        self.inner.bus.publish(
            &updated.conversation_id,
            ChangeEvent::MessageUpdated(updated.clone()),
        );
        Ok(updated)
    }

    pub async fn delete_message(&self, actor_id: &str, message_id: &str) -> Result<Message> {
        let existing = self.require_message(message_id).await?;

        let _guard = self.lock_conversation(&existing.conversation_id).await;

        let removed = self.inner.messages.delete(actor_id, message_id).await?;
        self.inner.bus.publish(
            &removed.conversation_id,
            ChangeEvent::MessageDeleted {
                conversation_id: removed.conversation_id.clone(),
                message_id: removed.id.clone(),
            },
        );
        Ok(removed)
    }

    async fn require_message(&self, message_id: &str) -> Result<Message> {
        self.inner
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("message {}", message_id)))
    }

    /// Page through a conversation oldest first
    pub async fn list_messages(
        &self,
        actor_id: &str,
        conversation_id: &str,
        limit: Option<u64>,
        offset: u64,
    ) -> Result<Vec<Message>> {
        self.require_participant(conversation_id, actor_id).await?;
        let limit = limit.unwrap_or(self.inner.config.default_page_size);
        Ok(self
            .inner
            .messages
            .list(conversation_id, limit, offset)
            .await?)
    }

    pub async fn search_messages(
        &self,
        actor_id: &str,
        conversation_id: &str,
        query: &str,
    ) -> Result<Vec<Message>> {
        self.require_participant(conversation_id, actor_id).await?;
        Ok(self.inner.messages.search(conversation_id, query).await?)
    }

    pub async fn unread_count(&self, conversation_id: &str, user_id: &str) -> Result<u64> {
        self.require_participant(conversation_id, user_id).await?;
        Ok(self
            .inner
            .messages
            .unread_count(conversation_id, user_id)
            .await?)
    }

    /// Mark everything the reader received as read
    pub async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        self.require_participant(conversation_id, reader_id).await?;

        let _guard = self.lock_conversation(conversation_id).await;

        let count = self
            .inner
            .messages
            .mark_read(conversation_id, reader_id)
            .await?;
        if count > 0 {
            self.inner.bus.publish(
                conversation_id,
                ChangeEvent::MessagesRead {
                    conversation_id: conversation_id.to_string(),
                    reader_id: reader_id.to_string(),
                    count,
                },
            );
        }
        Ok(count)
    }

    // Typing

    pub async fn set_typing(
        &self,
        conversation_id: &str,
        user_id: &str,
        is_typing: bool,
    ) -> Result<TypingState> {
        self.require_participant(conversation_id, user_id).await?;
        Ok(self
            .inner
            .typing
            .set_typing(conversation_id, user_id, is_typing))
    }

    pub fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        self.inner.typing.typing_users(conversation_id)
    }

    // Subscriptions

    pub async fn subscribe(
        &self,
        actor_id: &str,
        conversation_id: &str,
        kinds: EventKinds,
    ) -> Result<Subscription> {
        self.require_participant(conversation_id, actor_id).await?;
        Ok(self.inner.bus.subscribe(conversation_id, kinds))
    }

    pub async fn subscribe_with<F>(
        &self,
        actor_id: &str,
        conversation_id: &str,
        kinds: EventKinds,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        self.require_participant(conversation_id, actor_id).await?;
        Ok(self
            .inner
            .bus
            .subscribe_with(conversation_id, kinds, callback))
    }

    // Groups

    /// Create a group and return it together with its conversation
    pub async fn create_group(
        &self,
        creator_id: &str,
        name: &str,
        description: Option<&str>,
        member_ids: &[String],
    ) -> Result<(GroupChat, Conversation)> {
        let group = self
            .inner
            .groups
            .create(name, description, creator_id, member_ids)
            .await?;
        let conv = self.group_conversation(&group.id).await?;
        Ok((group, conv))
    }

    pub async fn group_conversation(&self, group_id: &str) -> Result<Conversation> {
        self.inner
            .conversations
            .find_by_group(group_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation of group {}", group_id)))
    }

    pub async fn get_group(&self, group_id: &str) -> Result<GroupChat> {
        self.inner
            .groups
            .get(group_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("group {}", group_id)))
    }

    pub async fn list_groups(&self, user_id: &str) -> Result<Vec<GroupChat>> {
        Ok(self.inner.groups.list_for(user_id).await?)
    }

    /// Members of a group; only visible to its members
    pub async fn group_members(&self, actor_id: &str, group_id: &str) -> Result<Vec<GroupMember>> {
        self.get_group(group_id).await?;
        if self.inner.groups.role_of(group_id, actor_id).await?.is_none() {
            return Err(ChatError::Forbidden(format!(
                "{} is not a member of group {}",
                actor_id, group_id
            )));
        }
        Ok(self.inner.groups.members(group_id).await?)
    }

    pub async fn add_group_member(
        &self,
        actor_id: &str,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<GroupMember> {
        Ok(self
            .inner
            .groups
            .add_member(actor_id, group_id, user_id, role)
            .await?)
    }

    pub async fn remove_group_member(
        &self,
        actor_id: &str,
        group_id: &str,
        user_id: &str,
    ) -> Result<()> {
        Ok(self
            .inner
            .groups
            .remove_member(actor_id, group_id, user_id)
            .await?)
    }

    pub async fn update_group(
        &self,
        actor_id: &str,
        group_id: &str,
        update: GroupUpdate,
    ) -> Result<GroupChat> {
        Ok(self.inner.groups.update(actor_id, group_id, update).await?)
    }

    /// Delete a group with its members, conversation and messages
    pub async fn delete_group(&self, actor_id: &str, group_id: &str) -> Result<()> {
        self.inner.groups.delete(actor_id, group_id).await?;
        Ok(())
    }

    // Attachments

    /// Remove an uploaded object; messages referencing it are left as they are
    ///
    /// Paths have the form `{kind}/{conversation}/{object}` and the actor must
    /// take part in that conversation.
    pub async fn delete_attachment(&self, actor_id: &str, path: &str) -> Result<()> {
        let conversation_id = path
            .split('/')
            .filter(|s| !s.is_empty())
            .nth(1)
            .ok_or_else(|| ChatError::Validation(format!("invalid attachment path {}", path)))?;
        self.require_participant(conversation_id, actor_id).await?;

        self.inner.attachments.delete(path).await?;
        info!("{} deleted attachment {}", actor_id, path);
        Ok(())
    }
}
