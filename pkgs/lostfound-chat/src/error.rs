//! Error types surfaced to the UI layer

use lostfound_attachments::AttachmentError;
use lostfound_store::StoreError;
use thiserror::Error;

/// Errors returned by `ChatService`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not editable: {0}")]
    NotEditable(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => ChatError::Validation(msg),
            StoreError::NotFound(msg) => ChatError::NotFound(msg),
            StoreError::NotEditable(msg) => ChatError::NotEditable(msg),
            StoreError::Forbidden(msg) => ChatError::Forbidden(msg),
            StoreError::Database(e) => ChatError::Transport(e.to_string()),
        }
    }
}

impl From<AttachmentError> for ChatError {
    fn from(err: AttachmentError) -> Self {
        ChatError::Upload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
