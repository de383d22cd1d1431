//! Ingestion configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upload ceiling of the reference deployment (80 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 80 * 1024 * 1024;

/// Nothing smaller than this can hold a usable ZIP archive.
pub const DEFAULT_MIN_ARCHIVE_BYTES: u64 = 100;

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings injected into an [`Ingestor`](crate::ingest::Ingestor).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory that holds every stored upload and extraction directory
    pub storage_root: PathBuf,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: u64,

    /// Smallest file accepted as a ZIP archive
    pub min_archive_bytes: u64,

    /// Ceiling on decompressed archive content; `None` uses `max_upload_bytes`
    pub max_extracted_bytes: Option<u64>,

    #[serde(with = "secs")]
    pub extraction_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            min_archive_bytes: DEFAULT_MIN_ARCHIVE_BYTES,
            max_extracted_bytes: None,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }
}

impl IngestConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    pub fn extracted_limit(&self) -> u64 {
        self.max_extracted_bytes.unwrap_or(self.max_upload_bytes)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
