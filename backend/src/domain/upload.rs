//! Uploaded report files, upload limits and the stored form of each file.

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::domain::Error;

/// Default maximum number of files per upload.
pub const DEFAULT_MAX_FILES: usize = 50;
/// Default maximum size of one file.
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
/// Default maximum size of all files together.
pub const DEFAULT_MAX_TOTAL_BYTES: usize = 50 * 1024 * 1024;
/// Default number of content bytes kept per stored file.
pub const DEFAULT_MAX_STORED_FILE_BYTES: usize = 1024 * 1024;

/// One report file as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedReport {
    /// Client-supplied file name.
    pub filename: String,
    /// Raw document bytes.
    pub content: Vec<u8>,
}

impl UploadedReport {
    /// Create an uploaded report.
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Upload limit violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadLimitError {
    /// The upload carried no report files.
    #[error("at least one report file is required")]
    NoFiles,
    /// More files than allowed.
    #[error("upload contains more than {max} files")]
    TooManyFiles {
        /// Configured maximum.
        max: usize,
    },
    /// One file exceeded the per-file limit.
    #[error("file `{filename}` exceeds the {max}-byte per-file limit")]
    FileTooLarge {
        /// Offending file.
        filename: String,
        /// Configured maximum.
        max: usize,
    },
    /// All files together exceeded the total limit.
    #[error("upload exceeds the {max}-byte total limit")]
    TotalTooLarge {
        /// Configured maximum.
        max: usize,
    },
}

impl UploadLimitError {
    /// Whether the violation is about size or count rather than shape.
    pub fn is_oversized(&self) -> bool {
        !matches!(self, Self::NoFiles)
    }
}

impl From<UploadLimitError> for Error {
    fn from(error: UploadLimitError) -> Self {
        if error.is_oversized() {
            Error::payload_too_large(error.to_string())
        } else {
            Error::invalid_request(error.to_string()).with_details(json!({ "field": "files" }))
        }
    }
}

/// Configured upload limits.
///
/// The checks are split so the HTTP adapter can enforce them incrementally
/// while streaming, before a whole file is buffered.
///
/// # Examples
/// ```
/// use flaketrack::domain::upload::{UploadLimits, UploadedReport};
///
/// let limits = UploadLimits::new(2, 16, 24);
/// assert!(limits.check(&[UploadedReport::new("a.xml", "<testsuite/>")]).is_ok());
/// assert!(limits.check(&[]).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    max_files: usize,
    max_file_bytes: usize,
    max_total_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_TOTAL_BYTES)
    }
}

impl UploadLimits {
    /// Create limits.
    pub const fn new(max_files: usize, max_file_bytes: usize, max_total_bytes: usize) -> Self {
        Self {
            max_files,
            max_file_bytes,
            max_total_bytes,
        }
    }

    /// Maximum file count.
    pub const fn max_files(&self) -> usize {
        self.max_files
    }

    /// Maximum bytes per file.
    pub const fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Maximum bytes across all files.
    pub const fn max_total_bytes(&self) -> usize {
        self.max_total_bytes
    }

    /// Check that `count` files are allowed.
    pub fn check_file_count(&self, count: usize) -> Result<(), UploadLimitError> {
        if count > self.max_files {
            return Err(UploadLimitError::TooManyFiles {
                max: self.max_files,
            });
        }
        Ok(())
    }

    /// Check one file of `size` bytes.
    pub fn check_file_size(&self, filename: &str, size: usize) -> Result<(), UploadLimitError> {
        if size > self.max_file_bytes {
            return Err(UploadLimitError::FileTooLarge {
                filename: filename.to_owned(),
                max: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Check the running total of `total` bytes.
    pub fn check_total_size(&self, total: usize) -> Result<(), UploadLimitError> {
        if total > self.max_total_bytes {
            return Err(UploadLimitError::TotalTooLarge {
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }

    /// Check a complete upload.
    ///
    /// # Errors
    ///
    /// Returns the first violated limit, or [`UploadLimitError::NoFiles`].
    pub fn check(&self, files: &[UploadedReport]) -> Result<(), UploadLimitError> {
        if files.is_empty() {
            return Err(UploadLimitError::NoFiles);
        }
        self.check_file_count(files.len())?;
        let mut total = 0_usize;
        for file in files {
            self.check_file_size(&file.filename, file.content.len())?;
            total = total.saturating_add(file.content.len());
            self.check_total_size(total)?;
        }
        Ok(())
    }
}

/// A report file prepared for storage.
///
/// Hash and size describe the full upload; `content` may be cut to the
/// storage budget, in which case `truncated` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReportFile {
    /// Client-supplied file name.
    pub filename: String,
    /// Lowercase hex SHA-256 of the full content.
    pub content_sha256: String,
    /// Size of the full content in bytes.
    pub size_bytes: i64,
    /// Whether `content` was cut.
    pub truncated: bool,
    /// Stored bytes.
    pub content: Vec<u8>,
}

impl StoredReportFile {
    /// Prepare `upload` for storage keeping at most `max_stored_bytes`.
    ///
    /// # Examples
    /// ```
    /// use flaketrack::domain::upload::{StoredReportFile, UploadedReport};
    ///
    /// let upload = UploadedReport::new("junit.xml", "<testsuite/>");
    /// let stored = StoredReportFile::from_upload(&upload, 4);
    /// assert_eq!(stored.size_bytes, 12);
    /// assert_eq!(stored.content, b"<tes");
    /// assert!(stored.truncated);
    /// assert_eq!(stored.content_sha256.len(), 64);
    /// ```
    pub fn from_upload(upload: &UploadedReport, max_stored_bytes: usize) -> Self {
        let digest = Sha256::digest(&upload.content);
        let truncated = upload.content.len() > max_stored_bytes;
        let kept = upload.content.len().min(max_stored_bytes);
        Self {
            filename: upload.filename.clone(),
            content_sha256: hex::encode(digest),
            size_bytes: i64::try_from(upload.content.len()).unwrap_or(i64::MAX),
            truncated,
            content: upload.content.get(..kept).unwrap_or_default().to_vec(),
        }
    }
}
