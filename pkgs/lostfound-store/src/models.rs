//! Public data types returned by the stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Preview shown in conversation lists for an image message
pub const IMAGE_PREVIEW: &str = "📷 Image";
/// Preview shown in conversation lists for a file message
pub const FILE_PREVIEW: &str = "📎 File";
/// Sender id used for messages posted by the service itself
pub const SYSTEM_SENDER: &str = "system";

/// Message type tag
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }

    /// Image and file messages must carry an attachment
    pub fn requires_attachment(&self) -> bool {
        matches!(self, MessageKind::Image | MessageKind::File)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "file" => Ok(MessageKind::File),
            "system" => Ok(MessageKind::System),
            other => Err(StoreError::Validation(format!(
                "unknown message kind '{}'",
                other
            ))),
        }
    }
}

/// Binary content referenced by a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub name: Option<String>,
    pub size: Option<u64>,
}

/// A persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub kind: MessageKind,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<String>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Per-conversation insertion ordinal
    pub seq: i64,
}

impl Message {
    /// Text written into the conversation preview after this message is sent
    pub fn preview(&self) -> String {
        preview_for(self.kind, self.content.as_deref())
    }
}

/// Preview text for a message of the given kind
pub fn preview_for(kind: MessageKind, content: Option<&str>) -> String {
    match kind {
        MessageKind::Image => IMAGE_PREVIEW.to_string(),
        MessageKind::File => FILE_PREVIEW.to_string(),
        MessageKind::Text | MessageKind::System => content.unwrap_or_default().to_string(),
    }
}

/// Request to append a message to a conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMessage {
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<String>,
    /// Caller-chosen key; a resend with the same key returns the original row
    pub client_message_id: Option<String>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn image(attachment: Attachment, caption: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Image,
            content: Some(caption.into()),
            attachment: Some(attachment),
            ..Default::default()
        }
    }

    pub fn file(attachment: Attachment) -> Self {
        let content = attachment.name.clone();
        Self {
            kind: MessageKind::File,
            content,
            attachment: Some(attachment),
            ..Default::default()
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn with_client_id(mut self, client_message_id: impl Into<String>) -> Self {
        self.client_message_id = Some(client_message_id.into());
        self
    }
}

/// Conversation variant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Direct => "direct",
            ConversationKind::Group => "group",
        }
    }
}

impl FromStr for ConversationKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ConversationKind::Direct),
            "group" => Ok(ConversationKind::Group),
            other => Err(StoreError::Validation(format!(
                "unknown conversation kind '{}'",
                other
            ))),
        }
    }
}

/// A durable thread between two users about a post, or a group's thread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub post_id: Option<String>,
    pub user1_id: Option<String>,
    pub user2_id: Option<String>,
    pub group_id: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Time used to order conversation lists
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }

    /// The other participant of a direct conversation
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        match (self.user1_id.as_deref(), self.user2_id.as_deref()) {
            (Some(a), Some(b)) if a == user_id => Some(b),
            (Some(a), Some(b)) if b == user_id => Some(a),
            _ => None,
        }
    }
}

/// Group member role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Admin,
    Member,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Admin => "admin",
            GroupRole::Member => "member",
        }
    }
}

impl FromStr for GroupRole {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(GroupRole::Admin),
            "member" => Ok(GroupRole::Member),
            other => Err(StoreError::Validation(format!(
                "unknown group role '{}'",
                other
            ))),
        }
    }
}

/// Group chat metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupChat {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership row tying a user to a group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

/// Partial update of group metadata; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_sentinels() {
        assert_eq!(preview_for(MessageKind::Text, Some("hello")), "hello");
        assert_eq!(preview_for(MessageKind::Image, Some("")), IMAGE_PREVIEW);
        assert_eq!(preview_for(MessageKind::File, Some("a.pdf")), FILE_PREVIEW);
        assert_eq!(preview_for(MessageKind::System, None), "");
    }

    #[test]
    fn test_kind_strings() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::File,
            MessageKind::System,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
        assert!("video".parse::<MessageKind>().is_err());
    }

    #[test]
    fn test_kind_display_pads() {
        assert_eq!(format!("{:<6}|", MessageKind::File), "file  |");
        assert_eq!(format!("{:>6}", MessageKind::Text), "  text");
    }

    #[test]
    fn test_peer_of() {
        let now = Utc::now();
        let conv = Conversation {
            id: "c1".to_string(),
            kind: ConversationKind::Direct,
            post_id: Some("p1".to_string()),
            user1_id: Some("alice".to_string()),
            user2_id: Some("bob".to_string()),
            group_id: None,
            last_message: None,
            last_message_at: None,
            created_at: now,
        };
        assert_eq!(conv.peer_of("alice"), Some("bob"));
        assert_eq!(conv.peer_of("bob"), Some("alice"));
        assert_eq!(conv.peer_of("carol"), None);
        assert_eq!(conv.activity_at(), now);
    }
}
