//! # Bundle ingest
//!
//! Upload pipeline for browser-playable game bundles.
//!
//! An upload is either a single HTML page, a loose Java archive / manifest /
//! executable, or a ZIP bundle. ZIP bundles are checked, unpacked into their
//! own directory, and classified: an HTML bundle gets a single entry point
//! chosen from its pages, a Java-archive bundle gets a generated landing page
//! with download links, anything else is rejected.
//!
//! ## Pipeline
//!
//! - [`safety`]: size and signature checks on the raw upload, entry path containment
//! - [`extract`]: sequential, size-capped, time-boxed ZIP extraction
//! - [`classify`]: bundle kind and entry-point selection
//! - [`analyze`]: client family and version sniffing, compatibility warnings
//! - [`ingest`]: the orchestrator tying them together, plus delete, content and download
//!
//! ## Example
//!
//! ```rust,no_run
//! use bundle_ingest::{IngestConfig, Ingestor, MemoryRepository, UploadedArchive};
//! use std::path::PathBuf;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let ingestor = Ingestor::new(IngestConfig::new("uploads"), MemoryRepository::new());
//!
//! let record = ingestor
//!     .ingest(UploadedArchive {
//!         path: PathBuf::from("/tmp/upload-1234"),
//!         media_type: "application/zip".to_string(),
//!         filename: "client.zip".to_string(),
//!         size: 1_048_576,
//!     })
//!     .await?;
//!
//! println!("Stored {} at {}", record.original_name, record.storage_path.display());
//! let page = ingestor.content(record.id).await?;
//! println!("Serving {} bytes of {}", page.body.len(), page.media_type);
//! # Ok(())
//! # }
//! ```

pub mod analyze;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod landing;
pub mod media;
pub mod repository;
pub mod safety;
pub mod types;

// Re-export main types
pub use config::IngestConfig;
pub use error::{ExtractError, IngestError, RepositoryError, SecurityError};
pub use ingest::Ingestor;
pub use media::UploadKind;
pub use repository::{FileRepository, JsonFileRepository, MemoryRepository};
pub use safety::EntryType;
pub use types::{
    BundleKind, Classification, CompatibilityInfo, ContentResponse, DetectionMethod,
    ExtractOptions, ExtractStats, GameFileRecord, StorageKind, UnsupportedReason,
    UploadedArchive, ValidationReport,
};

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Extract a ZIP archive to the specified output directory.
///
/// Blocking; see [`extract::extract_archive_with_timeout`] for the
/// time-boxed async variant the orchestrator uses.
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist or is corrupted
/// - An entry path escapes the output directory
/// - Decompressed content exceeds `options.size_limit_bytes`
/// - The archive holds no regular files
/// - Extraction is cancelled
/// - I/O errors occur
pub fn extract(
    archive_path: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
    cancel_flag: Arc<AtomicBool>,
) -> Result<ExtractStats, ExtractError> {
    extract::extract_archive(archive_path, output_dir, options, cancel_flag)
}

/// Classify a list of archive-relative file paths.
pub fn classify_paths(paths: &[String]) -> Classification {
    classify::classify(paths)
}
