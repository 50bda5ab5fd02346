//! Message store - persistent, append-only message log per conversation

use crate::conversation_store::is_participant_in;
use crate::entities::{conversations, messages};
use crate::error::{Result, StoreError};
use crate::models::{Attachment, Conversation, Message, MessageKind, NewMessage};
use crate::{from_millis, now_millis};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempts at claiming a sequence number before giving up on a send
const MAX_INSERT_ATTEMPTS: usize = 5;

impl TryFrom<messages::Model> for Message {
    type Error = StoreError;

    fn try_from(model: messages::Model) -> Result<Self> {
        let attachment = model.file_url.map(|url| Attachment {
            url,
            name: model.file_name,
            size: model.file_size.map(|s| s as u64),
        });

        Ok(Self {
            id: model.id,
            conversation_id: model.conversation_id,
            sender_id: model.sender_id,
            content: model.content,
            kind: model.kind.parse()?,
            attachment,
            reply_to: model.reply_to_message_id,
            is_edited: model.is_edited,
            edited_at: model.edited_at.map(from_millis),
            is_read: model.is_read,
            created_at: from_millis(model.created_at),
            seq: model.seq,
        })
    }
}

fn validate_new_message(msg: &NewMessage) -> Result<()> {
    match msg.kind {
        MessageKind::Text | MessageKind::System => {
            let empty = msg
                .content
                .as_deref()
                .map(|c| c.trim().is_empty())
                .unwrap_or(true);
            if empty {
                return Err(StoreError::Validation(format!(
                    "{} message content must not be empty",
                    msg.kind
                )));
            }
            if msg.attachment.is_some() {
                return Err(StoreError::Validation(format!(
                    "{} message cannot carry an attachment",
                    msg.kind
                )));
            }
        }
        MessageKind::Image | MessageKind::File => {
            let has_url = msg
                .attachment
                .as_ref()
                .map(|a| !a.url.is_empty())
                .unwrap_or(false);
            if !has_url {
                return Err(StoreError::Validation(format!(
                    "{} message requires an attachment",
                    msg.kind
                )));
            }
        }
    }
    Ok(())
}

/// Message store - manages persistent message storage
#[derive(Clone)]
pub struct MessageStore {
    db: DatabaseConnection,
}

impl MessageStore {
    /// Create a message store over an existing connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append a message to a conversation
    ///
    /// The conversation preview is not touched here; callers update it with
    /// `ConversationStore::update_last_message` once the insert succeeded.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender_id: &str,
        msg: NewMessage,
    ) -> Result<Message> {
        validate_new_message(&msg)?;

        let conv: Conversation = conversations::Entity::find_by_id(conversation_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {}", conversation_id)))?
            .try_into()?;

        if msg.kind != MessageKind::System && !is_participant_in(&self.db, &conv, sender_id).await?
        {
            return Err(StoreError::Forbidden(format!(
                "{} is not a participant of conversation {}",
                sender_id, conversation_id
            )));
        }

        if let Some(client_id) = msg.client_message_id.as_deref() {
            if let Some(existing) = self
                .find_by_client_id(conversation_id, sender_id, client_id)
                .await?
            {
                debug!(
                    "Duplicate send {} in conversation {}, returning {}",
                    client_id, conversation_id, existing.id
                );
                return Ok(existing);
            }
        }

        if let Some(reply_to) = msg.reply_to.as_deref() {
            let target = messages::Entity::find_by_id(reply_to.to_string())
                .one(&self.db)
                .await?;
            if target.map(|t| t.conversation_id != conversation_id).unwrap_or(true) {
                return Err(StoreError::Validation(format!(
                    "reply target {} is not in conversation {}",
                    reply_to, conversation_id
                )));
            }
        }

        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            let seq = self.next_seq(conversation_id).await?;
            let message = Message {
                id: Uuid::new_v4().to_string(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.to_string(),
                content: msg.content.clone(),
                kind: msg.kind,
                attachment: msg.attachment.clone(),
                reply_to: msg.reply_to.clone(),
                is_edited: false,
                edited_at: None,
                is_read: false,
                created_at: from_millis(now_millis()),
                seq,
            };

            let active = messages::ActiveModel {
                id: Set(message.id.clone()),
                conversation_id: Set(message.conversation_id.clone()),
                sender_id: Set(message.sender_id.clone()),
                content: Set(message.content.clone()),
                kind: Set(message.kind.as_str().to_string()),
                file_url: Set(message.attachment.as_ref().map(|a| a.url.clone())),
                file_name: Set(message.attachment.as_ref().and_then(|a| a.name.clone())),
                file_size: Set(message
                    .attachment
                    .as_ref()
                    .and_then(|a| a.size)
                    .map(|s| s as i64)),
                reply_to_message_id: Set(message.reply_to.clone()),
                client_message_id: Set(msg.client_message_id.clone()),
                is_edited: Set(false),
                edited_at: Set(None),
                is_read: Set(false),
                created_at: Set(message.created_at.timestamp_millis()),
                seq: Set(seq),
            };

            match messages::Entity::insert(active)
                .exec_without_returning(&self.db)
                .await
            {
                Ok(_) => {
                    info!(
                        "Stored {} message {} in conversation {} (seq {})",
                        message.kind, message.id, conversation_id, seq
                    );
                    return Ok(message);
                }
                Err(e) if is_unique_violation(&e) => {
                    if let Some(client_id) = msg.client_message_id.as_deref() {
                        if let Some(existing) = self
                            .find_by_client_id(conversation_id, sender_id, client_id)
                            .await?
                        {
                            return Ok(existing);
                        }
                    }
                    warn!(
                        "Sequence {} in conversation {} already taken (attempt {})",
                        seq, conversation_id, attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Database(DbErr::Custom(format!(
            "could not allocate a sequence number in conversation {}",
            conversation_id
        ))))
    }

    async fn next_seq(&self, conversation_id: &str) -> Result<i64> {
        let last = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .order_by_desc(messages::Column::Seq)
            .one(&self.db)
            .await?;

        Ok(last.map(|m| m.seq).unwrap_or(0) + 1)
    }

    /// Message previously sent with this idempotency key, if any
    pub async fn find_by_client_id(
        &self,
        conversation_id: &str,
        sender_id: &str,
        client_message_id: &str,
    ) -> Result<Option<Message>> {
        messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::SenderId.eq(sender_id))
            .filter(messages::Column::ClientMessageId.eq(client_message_id))
            .one(&self.db)
            .await?
            .map(Message::try_from)
            .transpose()
    }

    /// Get message by ID
    pub async fn get(&self, message_id: &str) -> Result<Option<Message>> {
        messages::Entity::find_by_id(message_id.to_string())
            .one(&self.db)
            .await?
            .map(Message::try_from)
            .transpose()
    }

    async fn require_model(&self, message_id: &str) -> Result<messages::Model> {
        messages::Entity::find_by_id(message_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("message {}", message_id)))
    }

    /// Replace the content of a text message the actor sent
    pub async fn edit(&self, actor_id: &str, message_id: &str, new_content: &str) -> Result<Message> {
        let model = self.require_model(message_id).await?;

        let kind: MessageKind = model.kind.parse()?;
        if kind != MessageKind::Text {
            return Err(StoreError::NotEditable(format!(
                "message {} is a {} message",
                message_id, kind
            )));
        }
        if model.sender_id != actor_id {
            return Err(StoreError::Forbidden(format!(
                "{} cannot edit message {}",
                actor_id, message_id
            )));
        }
        if new_content.trim().is_empty() {
            return Err(StoreError::Validation(
                "message content must not be empty".to_string(),
            ));
        }

        let edited_at = now_millis();
        let result = messages::Entity::update_many()
            .col_expr(messages::Column::Content, Expr::value(new_content.to_string()))
            .col_expr(messages::Column::IsEdited, Expr::value(true))
            .col_expr(messages::Column::EditedAt, Expr::value(edited_at))
            .filter(messages::Column::Id.eq(message_id))
            .filter(messages::Column::SenderId.eq(actor_id))
            .filter(messages::Column::Kind.eq(MessageKind::Text.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("message {}", message_id)));
        }

        let mut message = Message::try_from(model)?;
        message.content = Some(new_content.to_string());
        message.is_edited = true;
        message.edited_at = Some(from_millis(edited_at));

        info!("Edited message {}", message_id);
        Ok(message)
    }

    /// Hard-delete a message the actor sent and return the removed row
    pub async fn delete(&self, actor_id: &str, message_id: &str) -> Result<Message> {
        let model = self.require_model(message_id).await?;

        let kind: MessageKind = model.kind.parse()?;
        if kind == MessageKind::System || model.sender_id != actor_id {
            return Err(StoreError::Forbidden(format!(
                "{} cannot delete message {}",
                actor_id, message_id
            )));
        }

        let result = messages::Entity::delete_many()
            .filter(messages::Column::Id.eq(message_id))
            .filter(messages::Column::SenderId.eq(actor_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("message {}", message_id)));
        }

        info!("Deleted message {}", message_id);
        Message::try_from(model)
    }

    /// Page through a conversation in creation order
    pub async fn list(&self, conversation_id: &str, limit: u64, offset: u64) -> Result<Vec<Message>> {
        let messages = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Seq)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Retrieved {} messages from conversation {}",
            messages.len(),
            conversation_id
        );
        Ok(messages)
    }

    /// Mark every unread message not sent by `reader_id` as read
    pub async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        let result = messages::Entity::update_many()
            .col_expr(messages::Column::IsRead, Expr::value(true))
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::SenderId.ne(reader_id))
            .filter(messages::Column::IsRead.eq(false))
            .exec(&self.db)
            .await?;

        debug!(
            "Marked {} messages read in {} for {}",
            result.rows_affected, conversation_id, reader_id
        );
        Ok(result.rows_affected)
    }

    /// Unread messages in a conversation that `user_id` did not send
    pub async fn unread_count(&self, conversation_id: &str, user_id: &str) -> Result<u64> {
        let count = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::SenderId.ne(user_id))
            .filter(messages::Column::IsRead.eq(false))
            .count(&self.db)
            .await?;

        Ok(count)
    }

    /// Case-insensitive substring search over message content, newest first
    ///
    /// The query is matched literally and case is folded with Unicode rules,
    /// so it is compared here rather than with SQLite `LIKE`.
    pub async fn search(&self, conversation_id: &str, query: &str) -> Result<Vec<Message>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::Content.is_not_null())
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Seq)
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|m| {
                m.content
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&needle))
            })
            .map(Message::try_from)
            .collect()
    }

    pub(crate) async fn delete_for_conversation<C: ConnectionTrait>(
        db: &C,
        conversation_id: &str,
    ) -> Result<u64> {
        let result = messages::Entity::delete_many()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
