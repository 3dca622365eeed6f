use std::{fmt, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::AttachmentError;

/// A file sent identically to every recipient of a batch. The contents are
/// shared, so cloning an attachment per message does not copy the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Arc<[u8]>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.data.len())
            .finish()
    }
}

impl Attachment {
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read an attachment from disk, guessing its MIME type from the
    /// extension.
    ///
    /// # Errors
    ///
    /// If the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self, AttachmentError> {
        let data = std::fs::read(path).map_err(|source| AttachmentError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let filename = path.file_name().map_or_else(
            || path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );

        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self::new(filename, content_type, data))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Upper bounds on what may be attached to a batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttachmentLimits {
    /// Largest single attachment, in megabytes
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: usize,

    /// Most attachments per batch
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

const fn default_max_size_mb() -> usize {
    5
}

const fn default_max_files() -> usize {
    5
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            max_files: default_max_files(),
        }
    }
}

impl AttachmentLimits {
    #[must_use]
    pub const fn max_size_bytes(&self) -> usize {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Check a set of attachments against these limits
    ///
    /// # Errors
    ///
    /// [`AttachmentError::TooMany`] or [`AttachmentError::TooLarge`] for the
    /// first attachment over the size limit.
    pub fn check(&self, attachments: &[Attachment]) -> Result<(), AttachmentError> {
        if attachments.len() > self.max_files {
            return Err(AttachmentError::TooMany {
                count: attachments.len(),
                limit: self.max_files,
            });
        }

        let limit = self.max_size_bytes();
        attachments
            .iter()
            .find(|attachment| attachment.len() > limit)
            .map_or(Ok(()), |attachment| {
                Err(AttachmentError::TooLarge {
                    filename: attachment.filename.clone(),
                    size: attachment.len(),
                    limit,
                })
            })
    }
}
