//! File storage backends.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// File storage backend trait.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Write data to storage at the given URI.
    async fn write(&self, uri: &str, data: &[u8]) -> Result<()>;

    /// Read data from storage at the given URI.
    async fn read(&self, uri: &str) -> Result<Vec<u8>>;

    /// Delete a file. Returns `false` when nothing was stored at `uri`.
    async fn delete(&self, uri: &str) -> Result<bool>;

    /// Check if a file exists.
    async fn exists(&self, uri: &str) -> Result<bool>;

    /// Generate a fresh storage URI for an uploaded file name.
    fn generate_uri(&self, filename: &str) -> String;

    /// Get the public URL for a file.
    fn public_url(&self, uri: &str) -> String;

    /// Map a public URL produced by [`FileStorage::public_url`] back to its URI.
    fn uri_for_url(&self, url: &str) -> Option<String>;

    /// Get the storage scheme (e.g., "local").
    fn scheme(&self) -> &'static str;
}

/// Local filesystem storage rooted at the uploads directory.
pub struct LocalFileStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalFileStorage {
    pub fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            base_url: base_url.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a `local://` URI under the base path.
    ///
    /// Rejects absolute paths and `..` components.
    fn parse_uri(&self, uri: &str) -> Result<PathBuf> {
        let path = uri
            .strip_prefix("local://")
            .context("invalid local URI, must start with local://")?;
        for component in Path::new(path).components() {
            if !matches!(component, Component::Normal(_)) {
                anyhow::bail!("directory traversal not allowed in storage URI");
            }
        }
        Ok(self.base_path.join(path))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn write(&self, uri: &str, data: &[u8]) -> Result<()> {
        let path = self.parse_uri(uri)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create directories")?;
        }

        let mut file = fs::File::create(&path)
            .await
            .context("failed to create file")?;
        file.write_all(data).await.context("failed to write file")?;
        file.flush().await.context("failed to flush file")?;

        debug!(uri = %uri, path = ?path, size = data.len(), "file written");
        Ok(())
    }

    async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let path = self.parse_uri(uri)?;
        let data = fs::read(&path).await.context("failed to read file")?;
        Ok(data)
    }

    async fn delete(&self, uri: &str) -> Result<bool> {
        let path = self.parse_uri(uri)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(uri = %uri, "file deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(uri = %uri, "file not found for deletion");
                Ok(false)
            }
            Err(e) => Err(e).context("failed to delete file"),
        }
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = self.parse_uri(uri)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    fn generate_uri(&self, filename: &str) -> String {
        let now = chrono::Utc::now();
        format!(
            "local://{}/{}/{}_{}",
            now.format("%Y"),
            now.format("%m"),
            uuid::Uuid::now_v7().simple(),
            sanitize_filename(filename)
        )
    }

    fn public_url(&self, uri: &str) -> String {
        let path = uri.strip_prefix("local://").unwrap_or(uri);
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn uri_for_url(&self, url: &str) -> Option<String> {
        let prefix = self.base_url.trim_end_matches('/');
        let path = url.strip_prefix(prefix)?.strip_prefix('/')?;
        if path.is_empty() {
            return None;
        }
        Some(format!("local://{path}"))
    }

    fn scheme(&self) -> &'static str {
        "local"
    }
}

impl std::fmt::Debug for LocalFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileStorage")
            .field("base_path", &self.base_path)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Reduce an uploaded file name to a safe final path component.
pub fn sanitize_filename(filename: &str) -> String {
    // Backslashes count as separators whatever the host platform.
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let safe: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .take(200)
        .collect();

    if safe.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        safe
    }
}
