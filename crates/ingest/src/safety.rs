//! Safety checks for uploaded archives and their entries.
//!
//! Two layers live here: [`validate_archive`] decides whether an upload is
//! plausibly a ZIP before anything touches it, and [`validate_entry_path`]
//! keeps every archive entry (and every download request) inside its root.

use crate::config::IngestConfig;
use crate::error::{ExtractError, SecurityError};
use crate::types::ValidationReport;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Local file header, end of central directory, and spanned-archive markers.
const ZIP_SIGNATURES: [[u8; 4]; 3] = [
    [0x50, 0x4b, 0x03, 0x04],
    [0x50, 0x4b, 0x05, 0x06],
    [0x50, 0x4b, 0x07, 0x08],
];

/// Extensions that should never hide inside an archive's filename.
const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "msi", "ps1", "vbs", "sh", "dll",
];

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Entry type for filtering special file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
}

impl EntryType {
    /// Classify a ZIP entry from its name and optional unix mode bits.
    pub fn from_zip(name: &str, unix_mode: Option<u32>) -> Self {
        if name.ends_with('/') || name.ends_with('\\') {
            return EntryType::Directory;
        }
        match unix_mode {
            Some(mode) if mode & S_IFMT == S_IFLNK => EntryType::Symlink,
            _ => EntryType::File,
        }
    }
}

/// Check that an upload is plausibly a ZIP archive before extraction.
///
/// Checks run in order: minimum size, maximum size, then the 4-byte magic
/// number. Failures to read the file are reported as validation errors, never
/// returned as I/O errors.
pub async fn validate_archive(
    path: &Path,
    declared_name: Option<&str>,
    config: &IngestConfig,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if let Some(name) = declared_name {
        report.warnings.extend(filename_warnings(name));
    }

    let size = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            report.errors.push(format!("Could not read uploaded file: {}", e));
            return report;
        }
    };

    if size < config.min_archive_bytes {
        report.errors.push(format!(
            "File too small to be a valid ZIP archive ({} bytes)",
            size
        ));
        return report;
    }

    if size > config.max_upload_bytes {
        report.errors.push(format!(
            "File too large: {} bytes exceeds the {} byte limit",
            size, config.max_upload_bytes
        ));
        return report;
    }

    match read_prefix(path).await {
        Ok(prefix) if ZIP_SIGNATURES.contains(&prefix) => {}
        Ok(_) => report
            .errors
            .push("Invalid ZIP file signature".to_string()),
        Err(e) => report
            .errors
            .push(format!("Could not read file header: {}", e)),
    }

    report.is_valid = report.errors.is_empty();
    report
}

async fn read_prefix(path: &Path) -> std::io::Result<[u8; 4]> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut prefix = [0u8; 4];
    file.read_exact(&mut prefix).await?;
    Ok(prefix)
}

/// Advisory warnings for a declared upload filename.
pub fn filename_warnings(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    let segments: Vec<&str> = lower.split('.').collect();
    let mut warnings = Vec::new();

    // Only inner segments count; a trailing `.exe` is a loose executable upload.
    if segments.len() > 2 {
        let inner = &segments[1..segments.len() - 1];
        if let Some(ext) = inner.iter().find(|s| EXECUTABLE_EXTENSIONS.contains(*s)) {
            warnings.push(format!(
                "Filename contains an embedded executable extension (.{})",
                ext
            ));
        }
    }

    warnings
}

/// Validates and normalizes an archive entry path to prevent security vulnerabilities.
///
/// This function performs the following checks:
/// - Rejects absolute paths
/// - Rejects paths containing ".." components (path traversal)
/// - Normalizes the path to remove redundant separators and "." components
/// - Treats backslashes as separators, so Windows-built archives behave alike
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use bundle_ingest::safety::validate_entry_path;
///
/// let safe_path = validate_entry_path("dir/file.txt").unwrap();
/// assert_eq!(safe_path, Path::new("dir/file.txt"));
///
/// assert!(validate_entry_path("../../etc/passwd").is_err());
/// assert!(validate_entry_path("/etc/passwd").is_err());
/// ```
pub fn validate_entry_path(name: &str) -> Result<PathBuf, SecurityError> {
    let unified = name.replace('\\', "/");
    let path = Path::new(&unified);

    if path.is_absolute() || unified.starts_with('/') {
        return Err(SecurityError::AbsolutePath(name.to_string()));
    }

    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if part == ".." {
                    return Err(SecurityError::PathTraversal(format!(
                        "Path contains '..' component: {}",
                        name
                    )));
                }
                normalized.push(part);
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(SecurityError::PathTraversal(format!(
                    "Path contains '..' component: {}",
                    name
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::AbsolutePath(name.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SecurityError::PathTraversal(
            "Path normalizes to empty".to_string(),
        ));
    }

    Ok(normalized)
}

/// Resolve `name` beneath `root`, refusing anything that would land outside it.
pub fn contained_path(root: &Path, name: &str) -> Result<PathBuf, SecurityError> {
    let relative = validate_entry_path(name)?;
    let joined = root.join(&relative);
    if !joined.starts_with(root) {
        return Err(SecurityError::PathTraversal(name.to_string()));
    }
    Ok(joined)
}

/// Render a normalized relative path with forward slashes.
pub fn to_archive_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Checks if the current extracted size exceeds the configured limit.
///
/// ```
/// use bundle_ingest::safety::check_size_limits;
///
/// assert!(check_size_limits(1000, Some(2000)).is_ok());
/// assert!(check_size_limits(3000, Some(2000)).is_err());
/// assert!(check_size_limits(999_999_999, None).is_ok());
/// ```
pub fn check_size_limits(current_bytes: u64, limit: Option<u64>) -> Result<(), ExtractError> {
    if let Some(max_bytes) = limit {
        if current_bytes > max_bytes {
            return Err(ExtractError::SizeLimitExceeded {
                current: current_bytes,
                limit: max_bytes,
            });
        }
    }
    Ok(())
}
