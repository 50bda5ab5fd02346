//! Lostfound Chat - real-time messaging on top of `lostfound-store`
//!
//! # Components
//!
//! - [`ChatService`]: the facade the UI talks to. Authorizes every call,
//!   persists through the stores and publishes change events.
//! - [`ChangeBus`]: in-process publish/subscribe keyed by conversation.
//! - [`TypingTracker`]: in-memory typing state with TTL expiry.
//! - [`TypingDebouncer`]: client-side keystroke debounce.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use lostfound_attachments::FsAttachmentStore;
//! use lostfound_chat::{ChatConfig, ChatService, EventKinds};
//! use lostfound_store::StoreConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = StoreConfig::new("lostfound.db").connect().await?;
//! let attachments = Arc::new(FsAttachmentStore::new("uploads", "http://localhost:8080/files")?);
//! let chat = ChatService::new(db, attachments, ChatConfig::default());
//!
//! let conv = chat.get_or_create_conversation("post-1", "alice", "bob").await?;
//! let mut sub = chat.subscribe("bob", &conv.id, EventKinds::MESSAGES).await?;
//! chat.send_text(&conv.id, "alice", "Is this your wallet?").await?;
//! let event = sub.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod debounce;
pub mod error;
pub mod service;
pub mod typing;

pub use bus::{ChangeBus, ChangeEvent, EventKinds, Subscription, SubscriptionHandle};
pub use config::{ChatConfig, DEFAULT_MAX_FILE_SIZE};
pub use debounce::{TypingDebouncer, TypingSignal};
pub use error::{ChatError, Result};
pub use service::ChatService;
pub use typing::{TypingState, TypingTracker};
