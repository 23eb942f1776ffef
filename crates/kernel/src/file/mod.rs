//! Uploaded file handling.
//!
//! Files are written through a [`FileStorage`] backend; rows store the
//! public URL returned by [`AttachmentService::store`].

pub mod service;
pub mod storage;

pub use service::{ALLOWED_MIME_TYPES, AttachmentError, AttachmentService, MAX_FILE_SIZE, Upload};
pub use storage::{FileStorage, LocalFileStorage, sanitize_filename};
