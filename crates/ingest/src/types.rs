//! Type definitions shared across the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// One inbound file, as handed over by the transport layer once it has been
/// buffered to a temporary location.
#[derive(Debug, Clone)]
pub struct UploadedArchive {
    /// Temporary location of the upload on disk
    pub path: PathBuf,

    /// Media type declared by the client
    pub media_type: String,

    /// Original filename declared by the client
    pub filename: String,

    /// Size in bytes as reported by the transport
    pub size: u64,
}

/// Outcome of the archive safety checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,

    /// Hard errors; any one of them rejects the upload
    pub errors: Vec<String>,

    /// Advisory findings that do not block ingestion
    pub warnings: Vec<String>,
}

/// Options for extracting an archive.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum total decompressed size in bytes
    pub size_limit_bytes: Option<u64>,

    /// Wall-clock budget for the whole extraction
    pub timeout: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            size_limit_bytes: Some(crate::config::DEFAULT_MAX_UPLOAD_BYTES),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Statistics about a completed extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Archive-relative paths of every file written, in archive order
    pub files: Vec<String>,

    /// Archive-relative paths of explicit directory entries, in archive order
    pub directories: Vec<String>,

    /// Entries that were deliberately not materialized (symlinks)
    pub skipped: Vec<String>,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Duration of the extraction, in seconds
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// How the entry point of an HTML bundle was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    /// Matched a known naming convention
    PatternMatch,
    /// Positional default, no naming convention matched
    Fallback,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::PatternMatch => f.write_str("pattern-match"),
            DetectionMethod::Fallback => f.write_str("fallback"),
        }
    }
}

/// Why a bundle cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum UnsupportedReason {
    /// Nothing in the archive is an HTML page or a Java archive
    NoRunnableEntry,
    /// The archive holds configuration/manifest files and nothing else usable
    OnlyAuxiliaryFiles { files: Vec<String> },
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsupportedReason::NoRunnableEntry => f.write_str(
                "No HTML or JAR files found in the archive. Please upload an archive containing a playable client.",
            ),
            UnsupportedReason::OnlyAuxiliaryFiles { files } => write!(
                f,
                "The archive only contains configuration files ({}) and no HTML or JAR client.",
                files.join(", ")
            ),
        }
    }
}

/// What kind of bundle an archive turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BundleKind {
    Html {
        /// Archive-relative path of the page to serve
        main_entry: String,
        detection: DetectionMethod,
    },
    JavaArchive {
        /// Archive-relative paths of every `.jar` entry
        archive_files: Vec<String>,
    },
    Unsupported {
        #[serde(flatten)]
        reason: UnsupportedReason,
    },
}

/// Output of the entry-point classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(flatten)]
    pub kind: BundleKind,

    /// Every HTML entry, in archive order
    pub html_files: Vec<String>,

    /// Every Java-archive entry, in archive order
    pub jar_files: Vec<String>,

    pub total_files: usize,

    /// Advisory, non-fatal findings
    pub warnings: Vec<String>,
}

impl Classification {
    pub fn main_entry(&self) -> Option<&str> {
        match &self.kind {
            BundleKind::Html { main_entry, .. } => Some(main_entry),
            _ => None,
        }
    }

    pub fn detection(&self) -> Option<DetectionMethod> {
        match &self.kind {
            BundleKind::Html { detection, .. } => Some(*detection),
            _ => None,
        }
    }
}

/// Metadata sniffed out of an HTML entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityInfo {
    pub client_version: Option<String>,
    pub engine_version: Option<String>,
    pub client_family: Option<String>,
    pub warnings: Vec<String>,
}

/// Whether a record's artifact is a single file or a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    File,
    Directory,
}

/// The persisted result of one successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameFileRecord {
    pub id: Uuid,

    /// Generated `<timestamp>-<suffix>` name of the stored artifact
    pub storage_name: String,

    /// Filename the client uploaded
    pub original_name: String,

    /// Size of the upload in bytes
    pub size: u64,

    pub media_type: String,

    /// File for HTML and loose uploads, directory for Java-archive bundles
    pub storage_path: PathBuf,

    pub storage_kind: StorageKind,

    /// Extraction directory of an archive upload; deleting the record removes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_root: Option<PathBuf>,

    pub uploaded_at: DateTime<Utc>,

    /// How the entry point was chosen, for archive uploads with an HTML page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionMethod>,

    /// Validator and classifier advisories
    #[serde(default)]
    pub notices: Vec<String>,

    #[serde(flatten)]
    pub compatibility: CompatibilityInfo,
}

/// A body ready to be handed back to the player or a downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentResponse {
    pub media_type: String,
    pub body: Vec<u8>,

    /// `Content-Disposition` header value, for downloads
    pub disposition: Option<String>,
}

/// Per-upload lifecycle, used for logging state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Received,
    Validated,
    Extracted,
    SkippedExtraction,
    Classified,
    Analyzed,
    Persisted,
    Failed,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestState::Received => "received",
            IngestState::Validated => "validated",
            IngestState::Extracted => "extracted",
            IngestState::SkippedExtraction => "skipped-extraction",
            IngestState::Classified => "classified",
            IngestState::Analyzed => "analyzed",
            IngestState::Persisted => "persisted",
            IngestState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
