//! Filesystem-backed attachment store

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info};
use url::Url;

use crate::error::{AttachmentError, Result};
use crate::{checksum, content_type_for, object_path, split_path, AttachmentStore, StoredObject};

static UPLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `data` next to `full` and rename it into place, so readers see
/// either nothing or the whole object
async fn write_atomic(full: &Path, data: &[u8]) -> Result<()> {
    let file_name = full
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AttachmentError::InvalidPath(full.display().to_string()))?;
    let temp_path = full.with_file_name(format!(
        ".{}.{}-{}.uploading",
        file_name,
        std::process::id(),
        UPLOAD_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = fs::write(&temp_path, data).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp_path, full).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Stores attachments as plain files under a root directory
///
/// Public URLs are built by joining `base_url` with the object path, so the
/// root is expected to be served as static files at that URL.
#[derive(Debug, Clone)]
pub struct FsAttachmentStore {
    root: PathBuf,
    base_url: Url,
}

impl FsAttachmentStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            root: root.into(),
            base_url,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL of a stored object
    pub fn public_url(&self, path: &str) -> Result<Url> {
        let relative = split_path(path)?.join("/");
        Ok(self.base_url.join(&relative)?)
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut full = self.root.clone();
        for segment in split_path(path)? {
            full.push(segment);
        }
        Ok(full)
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn put(
        &self,
        data: Bytes,
        content_type: Option<&str>,
        path_hint: &str,
    ) -> Result<StoredObject> {
        let path = object_path(path_hint, &data)?;
        let full = self.resolve(&path)?;

        let already_stored = match fs::metadata(&full).await {
            Ok(meta) => meta.len() == data.len() as u64,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if already_stored {
            debug!("Attachment {} already stored", path);
        } else {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).await?;
            }
            write_atomic(&full, &data).await?;
            info!("Stored attachment {} ({} bytes)", path, data.len());
        }

        Ok(StoredObject {
            url: self.public_url(&path)?.to_string(),
            content_type: content_type_for(content_type, &path),
            size: data.len() as u64,
            checksum: checksum(&data),
            path,
        })
    }

    async fn get(&self, path: &str) -> Result<Option<Bytes>> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                info!("Deleted attachment {}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Attachment {} already gone", path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
