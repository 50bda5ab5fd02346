//! Lostfound Store - Persistent storage for Lostfound chat
//!
//! This crate provides SQLite-based persistent storage for conversations,
//! messages and group chats using Sea-ORM.
//!
//! # Architecture
//!
//! The storage layer is organized into three managers that share one
//! `DatabaseConnection`:
//!
//! - **MessageStore**: append-only message log per conversation, edit/delete
//!   with owner checks, bulk read marking, search and unread counts
//! - **ConversationStore**: natural-key upsert of direct conversations and the
//!   denormalized "last message" preview used by list views
//! - **GroupManager**: group chats, their members and roles
//!
//! # Database Schema
//!
//! - `conversations`: one row per (post, participant pair) or per group
//! - `messages`: message content, attachment reference, edit and read state
//! - `group_chats`: group metadata
//! - `group_members`: (group, user) rows with role and join time
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use lostfound_store::{ConversationStore, MessageStore, NewMessage, StoreConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = StoreConfig::new("lostfound.db").connect().await?;
//! let conversations = ConversationStore::new(db.clone());
//! let messages = MessageStore::new(db);
//!
//! let conv = conversations.get_or_create("post-1", "alice", "bob").await?;
//! messages.send(&conv.id, "alice", NewMessage::text("Is this your wallet?")).await?;
//! # Ok(())
//! # }
//! ```

pub mod conversation_store;
pub mod entities;
pub mod error;
pub mod group_manager;
pub mod message_store;
pub mod migration;
pub mod models;

pub use conversation_store::ConversationStore;
pub use error::{Result, StoreError};
pub use group_manager::GroupManager;
pub use message_store::MessageStore;
pub use models::{
    preview_for, Attachment, Conversation, ConversationKind, GroupChat, GroupMember, GroupRole,
    GroupUpdate, Message, MessageKind, NewMessage, FILE_PREVIEW, IMAGE_PREVIEW, SYSTEM_SENDER,
};
pub use sea_orm::DatabaseConnection;

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::path::PathBuf;
use tracing::info;

/// Configuration for the persistence layer
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("lostfound.db"),
        }
    }
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// SQLite connection URL for this config
    pub fn database_url(&self) -> anyhow::Result<String> {
        let db_path_str = self
            .db_path
            .to_str()
            .context("Invalid database path")?
            .replace('\\', "/");

        Ok(format!("sqlite:{}?mode=rwc", db_path_str))
    }

    /// Open the database and bring the schema up to date
    pub async fn connect(&self) -> anyhow::Result<DatabaseConnection> {
        let db_url = self.database_url()?;

        let db = Database::connect(db_url.as_str())
            .await
            .context("Failed to connect to database")?;

        migration::Migrator::up(&db, None)
            .await
            .context("Failed to run migrations")?;

        info!("Store initialized at {}", self.db_path.display());
        Ok(db)
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn from_millis(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
