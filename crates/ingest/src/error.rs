//! Error types for the ingestion pipeline.
//!
//! Each component owns an error enum; [`IngestError`] is the taxonomy callers
//! of the orchestrator see. Low-level I/O failures are mapped into one of its
//! variants before they leave the crate.

use crate::types::{UnsupportedReason, ValidationReport};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Error type for archive extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Archive file not found at the specified path.
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    /// The archive contained no regular-file entries.
    #[error("Archive contains no files")]
    EmptyArchive,

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// The decompressed content exceeded the configured ceiling.
    #[error("Size limit exceeded: {current} bytes > {limit} bytes")]
    SizeLimitExceeded {
        /// Bytes written so far, including the offending entry
        current: u64,
        /// Configured ceiling in bytes
        limit: u64,
    },

    /// The archive is corrupted or an entry could not be opened.
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    /// Extraction ran past its wall-clock budget.
    #[error("Extraction timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// An I/O error occurred while writing extracted files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The extraction was cancelled by the caller.
    #[error("Cancelled by user")]
    Cancelled,
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => ExtractError::Corrupted(io.to_string()),
            other => ExtractError::Corrupted(other.to_string()),
        }
    }
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),
}

/// Errors raised by a [`FileRepository`](crate::repository::FileRepository).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Record already exists: {0}")]
    Duplicate(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// User-facing failure of an ingestion, content or delete request.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The upload failed the archive safety checks.
    #[error("Upload rejected: {}", .0.errors.join("; "))]
    Validation(ValidationReport),

    /// The archive could not be unpacked.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// The archive held nothing that can be played or downloaded.
    #[error("{0}")]
    Unsupported(UnsupportedReason),

    /// The declared file type is not one the launcher accepts.
    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),

    /// The record store refused the write.
    #[error("Failed to save upload: {0}")]
    Persistence(RepositoryError),

    #[error("File not found: {0}")]
    NotFound(Uuid),

    /// A file inside a stored bundle does not exist.
    #[error("File not found in bundle: {0}")]
    BundleFileNotFound(String),

    /// A requested file name escapes the record's storage directory.
    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    /// Filesystem failure while storing, serving or deleting an artifact.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<RepositoryError> for IngestError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => IngestError::NotFound(id),
            other => IngestError::Persistence(other),
        }
    }
}
