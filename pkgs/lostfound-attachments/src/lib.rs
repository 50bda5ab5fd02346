//! # Lostfound Attachments
//!
//! Object storage for the binary content behind image and file messages.
//!
//! ## Object paths
//!
//! Callers pass a *path hint* such as `chat-images/{conversation}/{user}.jpg`.
//! The store keeps the hint's directory, sanitizes every segment and prefixes
//! the file name with a BLAKE3 tag of the content:
//!
//! ```text
//! hint:  chat-files/c-42/alice_Lost wallet.pdf
//! path:  chat-files/c-42/3f9a0c1d2e4b5a69_alice_Lost_wallet.pdf
//! url:   {base_url}/chat-files/c-42/3f9a0c1d2e4b5a69_alice_Lost_wallet.pdf
//! ```
//!
//! Uploading the same bytes under the same hint therefore lands on the same
//! object, which makes a retried upload harmless.
//!
//! ## Integrity
//!
//! Every stored object reports a SHA256 checksum of its bytes.
//!
//! ## Deletion
//!
//! `delete` is idempotent. Messages that still reference a deleted object
//! are not touched.

pub mod error;
pub mod fs_store;

pub use error::{AttachmentError, Result};
pub use fs_store::FsAttachmentStore;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content type used when neither the caller nor the file name tells us better
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Length of the hex content tag put in front of stored file names
const CONTENT_TAG_LEN: usize = 16;

/// Metadata of an object after it has been stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredObject {
    /// Public URL the object can be fetched from
    pub url: String,
    /// Store-relative path, used for `get` and `delete`
    pub path: String,
    pub size: u64,
    pub content_type: String,
    /// SHA256 hex digest of the content
    pub checksum: String,
}

/// Binary object storage used for chat attachments
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Store `data` under a path derived from `path_hint`
    async fn put(
        &self,
        data: Bytes,
        content_type: Option<&str>,
        path_hint: &str,
    ) -> Result<StoredObject>;

    /// Read an object back, `None` if it does not exist
    async fn get(&self, path: &str) -> Result<Option<Bytes>>;

    /// Remove an object; removing a missing object succeeds
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Path hint for an image sent by `user_id` in a conversation
pub fn image_path_hint(conversation_id: &str, user_id: &str) -> String {
    format!(
        "chat-images/{}/{}.jpg",
        sanitize_file_name(conversation_id),
        sanitize_file_name(user_id)
    )
}

/// Path hint for a file sent by `user_id` in a conversation
pub fn file_path_hint(conversation_id: &str, user_id: &str, file_name: &str) -> String {
    format!(
        "chat-files/{}/{}_{}",
        sanitize_file_name(conversation_id),
        sanitize_file_name(user_id),
        sanitize_file_name(file_name)
    )
}

/// Turn a hint into the store-relative path the content is written to
pub fn object_path(path_hint: &str, data: &[u8]) -> Result<String> {
    let mut segments = split_path(path_hint)?;
    let file_name = segments
        .pop()
        .ok_or_else(|| AttachmentError::InvalidPath(path_hint.to_string()))?;

    let tag = content_tag(data);
    segments.push(format!("{}_{}", tag, file_name));
    Ok(segments.join("/"))
}

/// Split and sanitize a relative path, rejecting traversal
pub(crate) fn split_path(path: &str) -> Result<Vec<String>> {
    let mut segments = Vec::new();
    for raw in path.split('/') {
        if raw.is_empty() {
            continue;
        }
        if raw == "." || raw == ".." {
            return Err(AttachmentError::InvalidPath(path.to_string()));
        }
        segments.push(sanitize_file_name(raw));
    }
    if segments.is_empty() {
        return Err(AttachmentError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn content_tag(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex()[..CONTENT_TAG_LEN].to_string()
}

/// SHA256 hex digest of `data`
pub fn checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Resolve the content type from the caller or the file extension
pub fn content_type_for(content_type: Option<&str>, path: &str) -> String {
    match content_type {
        Some(ct) if !ct.trim().is_empty() => ct.to_string(),
        _ => mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string(),
    }
}
