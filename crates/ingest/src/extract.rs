//! ZIP extraction with path validation, size ceilings and a wall-clock budget.
//!
//! The central directory is read up front for entry metadata only (names,
//! sizes, unix modes). Entry contents are then pulled one at a time with
//! [`zip::ZipArchive::by_index`] in archive order, and each entry's write
//! completes before the next entry is opened. Sizes come from the central
//! directory, so entries written with trailing data descriptors extract the
//! same as any other.

use crate::error::ExtractError;
use crate::safety::{check_size_limits, to_archive_path, validate_entry_path, EntryType};
use crate::types::{ExtractOptions, ExtractStats};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const COPY_CHUNK: usize = 64 * 1024;

/// Extract every regular-file entry of a ZIP archive into `output_dir`.
///
/// This function performs secure extraction with the following features:
/// - Path validation to prevent zip-slip attacks; an unsafe entry aborts the run
/// - A ceiling on total decompressed bytes
/// - Cancellation checked between entries and between copy chunks
/// - Directory entries only ensure the directory exists; symlinks are skipped
///
/// Partial output is left in place on failure. Cleaning it up is the
/// caller's job.
pub fn extract_archive(
    archive_path: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
    cancel_flag: Arc<AtomicBool>,
) -> Result<ExtractStats, ExtractError> {
    let start_time = Instant::now();

    if !archive_path.exists() {
        return Err(ExtractError::NotFound(archive_path.to_path_buf()));
    }

    let file = BufReader::new(File::open(archive_path)?);
    let mut archive = zip::ZipArchive::new(file)?;
    if archive.is_empty() {
        return Err(ExtractError::EmptyArchive);
    }

    fs::create_dir_all(output_dir)?;
    let mut stats = ExtractStats::default();

    for i in 0..archive.len() {
        if cancel_flag.load(Ordering::Relaxed) {
            return Err(ExtractError::Cancelled);
        }

        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let relative = validate_entry_path(&name)?;
        let archive_name = to_archive_path(&relative);
        let target = output_dir.join(&relative);

        match EntryType::from_zip(&name, entry.unix_mode()) {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                stats.directories.push(archive_name);
            }
            EntryType::Symlink => {
                warn!(entry = %name, "Skipping symbolic link entry");
                stats.skipped.push(archive_name);
            }
            EntryType::File => {
                check_size_limits(
                    stats.bytes_written.saturating_add(entry.size()),
                    options.size_limit_bytes,
                )?;

                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }

                let written = copy_entry(
                    &mut entry,
                    &target,
                    stats.bytes_written,
                    options.size_limit_bytes,
                    &cancel_flag,
                )?;

                debug!(entry = %archive_name, bytes = written, "Extracted entry");
                stats.bytes_written += written;
                stats.files.push(archive_name);
            }
        }
    }

    if stats.files.is_empty() {
        return Err(ExtractError::EmptyArchive);
    }

    stats.duration = start_time.elapsed();
    Ok(stats)
}

/// Run [`extract_archive`] on the blocking pool under `options.timeout`.
///
/// On expiry the cancel flag is raised and the blocking task is awaited, so no
/// write is still in flight when this returns [`ExtractError::Timeout`].
pub async fn extract_archive_with_timeout(
    archive_path: PathBuf,
    output_dir: PathBuf,
    options: ExtractOptions,
    cancel_flag: Arc<AtomicBool>,
) -> Result<ExtractStats, ExtractError> {
    let timeout = options.timeout;
    let flag = cancel_flag.clone();

    let mut task = tokio::task::spawn_blocking(move || {
        extract_archive(&archive_path, &output_dir, &options, flag)
    });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => joined.map_err(|e| ExtractError::Io(io::Error::other(e)))?,
        Err(_) => {
            cancel_flag.store(true, Ordering::Relaxed);
            let _ = task.await;
            Err(ExtractError::Timeout(timeout))
        }
    }
}

/// Copy one entry to `target` in fixed-size chunks.
///
/// The running total is checked against the size ceiling as bytes arrive, so
/// an entry whose header understates its size still cannot overrun it.
fn copy_entry(
    entry: &mut impl Read,
    target: &Path,
    already_written: u64,
    limit: Option<u64>,
    cancel_flag: &AtomicBool,
) -> Result<u64, ExtractError> {
    let mut out = BufWriter::new(File::create(target)?);
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut written = 0u64;

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            return Err(ExtractError::Cancelled);
        }

        let n = match entry.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExtractError::Corrupted(e.to_string())),
        };

        written += n as u64;
        check_size_limits(already_written + written, limit)?;
        out.write_all(&buf[..n])?;
    }

    out.flush()?;
    Ok(written)
}
