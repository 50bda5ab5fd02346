//! Error types for attachment storage

use thiserror::Error;

/// Errors that can occur while storing or reading attachments
#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, AttachmentError>;
