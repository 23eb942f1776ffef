//! Attachment service.
//!
//! Validates uploads, writes them through a [`FileStorage`] backend and
//! hands back the public URL that is stored in the row. The same URL is
//! later mapped back to a storage URI for deletion.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::storage::FileStorage;

/// Maximum file size (10 MB).
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Allowed MIME types for upload.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    // Images
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    // Documents
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "text/csv",
];

/// Types that have no magic bytes; accepted on the client's word when the
/// payload is valid UTF-8.
const TEXT_MIME_TYPES: &[&str] = &["text/plain", "text/csv"];

/// One uploaded file from a multipart request.
#[derive(Clone)]
pub struct Upload {
    /// Form field the file arrived under.
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("field", &self.field)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("uploaded file {filename} is empty")]
    Empty { filename: String },

    #[error("file too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("file type not allowed: {0}")]
    UnsupportedType(String),

    #[error("file storage failed: {0:#}")]
    Storage(anyhow::Error),
}

/// Stores and removes files referenced from content rows.
#[derive(Clone)]
pub struct AttachmentService {
    storage: Arc<dyn FileStorage>,
}

impl AttachmentService {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.storage
    }

    /// Check size and sniffed type. Returns the detected MIME type.
    pub fn validate(&self, upload: &Upload) -> Result<&'static str, AttachmentError> {
        if upload.data.is_empty() {
            return Err(AttachmentError::Empty {
                filename: upload.filename.clone(),
            });
        }
        if upload.data.len() > MAX_FILE_SIZE {
            return Err(AttachmentError::TooLarge {
                size: upload.data.len(),
                max: MAX_FILE_SIZE,
            });
        }

        if let Some(kind) = infer::get(&upload.data) {
            let mime = kind.mime_type();
            return ALLOWED_MIME_TYPES
                .iter()
                .find(|&&allowed| allowed == mime)
                .copied()
                .ok_or_else(|| AttachmentError::UnsupportedType(mime.to_string()));
        }

        let declared = upload
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
            .unwrap_or("application/octet-stream");
        match TEXT_MIME_TYPES.iter().find(|&&t| t == declared) {
            Some(&mime) if std::str::from_utf8(&upload.data).is_ok() => Ok(mime),
            _ => Err(AttachmentError::UnsupportedType(declared.to_string())),
        }
    }

    /// Validate and write one upload. Returns the reference to store.
    pub async fn store(&self, upload: &Upload) -> Result<String, AttachmentError> {
        let mime = self.validate(upload)?;
        let uri = self.storage.generate_uri(&upload.filename);
        self.storage
            .write(&uri, &upload.data)
            .await
            .map_err(AttachmentError::Storage)?;

        let reference = self.storage.public_url(&uri);
        info!(
            field = %upload.field,
            filename = %upload.filename,
            mime,
            size = upload.data.len(),
            reference = %reference,
            "attachment stored"
        );
        Ok(reference)
    }

    /// Store several uploads. On failure the ones already written are removed.
    pub async fn store_all(&self, uploads: &[&Upload]) -> Result<Vec<String>, AttachmentError> {
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.store(upload).await {
                Ok(reference) => stored.push(reference),
                Err(e) => {
                    self.discard(&stored).await;
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    /// Delete the file behind `reference`.
    ///
    /// References that do not point into this storage (external URLs, seed
    /// data) are left alone and report `false`, as does a file that is
    /// already gone.
    pub async fn delete(&self, reference: &str) -> Result<bool, AttachmentError> {
        let Some(uri) = self.storage.uri_for_url(reference) else {
            debug!(reference, "attachment is not managed here, skipping delete");
            return Ok(false);
        };
        self.storage
            .delete(&uri)
            .await
            .map_err(AttachmentError::Storage)
    }

    /// Check that `reference` could be deleted without touching it. Unmanaged
    /// references pass; managed ones must resolve to a valid storage path.
    pub async fn ensure_removable(&self, reference: &str) -> Result<(), AttachmentError> {
        let Some(uri) = self.storage.uri_for_url(reference) else {
            return Ok(());
        };
        self.storage
            .exists(&uri)
            .await
            .map(|_| ())
            .map_err(AttachmentError::Storage)
    }

    /// Best-effort removal; failures are logged.
    pub async fn discard(&self, references: &[String]) {
        for reference in references {
            if let Err(e) = self.delete(reference).await {
                warn!(error = %e, reference = %reference, "failed to remove attachment");
            }
        }
    }
}

impl std::fmt::Debug for AttachmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentService")
            .field("scheme", &self.storage.scheme())
            .finish()
    }
}
