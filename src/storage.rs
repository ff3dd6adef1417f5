//! Image materialization: persist extracted image bytes and hand back a
//! reference that can be dropped into Markdown image syntax as-is.
//!
//! The pipeline only ever sees the [`ImageStore`] trait. Two backends ship
//! with the crate:
//!
//! * [`InlineImageStore`]: encodes the bytes as a `data:` URI. Nothing touches
//!   the disk, so it cannot fail.
//! * [`DirectoryImageStore`]: writes each image to a directory under a
//!   collision-free name and returns a relative path or a URL.
//!
//! Names are made unique with a random UUID suffix, so concurrent requests
//! sharing one directory never overwrite each other's files.

use crate::pipeline::encode;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors raised by an image store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not write the image.
    #[error("failed to write '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend refused the image or is unreachable.
    #[error("image store unavailable: {0}")]
    Unavailable(String),
}

/// Backend-agnostic image persistence.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist `bytes` and return a reference usable inside `![..](reference)`.
    ///
    /// Every successful call returns a new reference, even for a name that was
    /// already used.
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StorageError>;

    /// Check the backend is reachable and writable.
    async fn check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Embeds images as base64 `data:` URIs.
#[derive(Debug, Clone, Default)]
pub struct InlineImageStore;

#[async_trait]
impl ImageStore for InlineImageStore {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StorageError> {
        let mime = mime_from_name(suggested_name);
        Ok(encode::data_uri(bytes, mime))
    }
}

/// Writes images to a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryImageStore {
    dir: PathBuf,
    url_prefix: Option<String>,
}

impl DirectoryImageStore {
    /// Store images under `dir`. References are `url_prefix/name` when a
    /// prefix is given, otherwise `dir/name`.
    pub fn new(dir: impl Into<PathBuf>, url_prefix: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn reference_for(&self, name: &str) -> String {
        match self.url_prefix {
            Some(ref prefix) => format!("{}/{}", prefix.trim_end_matches('/'), name),
            None => self
                .dir
                .join(name)
                .to_string_lossy()
                .replace('\\', "/"),
        }
    }
}

#[async_trait]
impl ImageStore for DirectoryImageStore {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StorageError> {
        let name = unique_name(suggested_name);
        let io_err = |source| StorageError::Io {
            name: name.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let path = self.dir.join(&name);

        // create_new: a name collision is an error, never an overwrite.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(io_err)?;

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                warn!("Could not remove partial image {}: {}", path.display(), rm);
            }
            return Err(io_err(e));
        }

        debug!("Stored image {} ({} bytes)", path.display(), bytes.len());
        Ok(self.reference_for(&name))
    }

    async fn check(&self) -> Result<(), StorageError> {
        let name = format!(".doc2md-check-{}", Uuid::new_v4().simple());
        let io_err = |source| StorageError::Io {
            name: name.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let path = self.dir.join(&name);
        tokio::fs::write(&path, b"ok").await.map_err(io_err)?;
        tokio::fs::remove_file(&path).await.map_err(io_err)?;
        Ok(())
    }
}

/// Turn a suggested name into a safe, collision-free file name.
///
/// `"Figure 1 (a).PNG"` → `"Figure-1-a-<uuid>.png"`.
pub fn unique_name(suggested: &str) -> String {
    let path = Path::new(suggested);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| sanitize(e).to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "bin".to_string());
    format!("{}-{}.{}", stem, Uuid::new_v4().simple(), ext)
}

fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// MIME type for an image file name, by extension.
pub fn mime_from_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "emf" => "image/emf",
        "wmf" => "image/wmf",
        _ => "application/octet-stream",
    }
}
