//! The ingestion orchestrator.
//!
//! Drives one upload through validate, extract, classify, analyze and
//! persist, and owns every filesystem side effect along the way. Whatever
//! path an upload takes, the temporary upload file is gone when
//! [`Ingestor::ingest`] returns, and a failed archive leaves no extraction
//! directory behind.

use crate::analyze::analyze_file;
use crate::classify::classify;
use crate::config::IngestConfig;
use crate::error::{ExtractError, IngestError};
use crate::extract::extract_archive_with_timeout;
use crate::landing::{downloadable_files, render_landing_page};
use crate::media::{media_type_for_path, UploadKind};
use crate::repository::FileRepository;
use crate::safety::{contained_path, validate_archive, validate_entry_path};
use crate::types::{
    BundleKind, CompatibilityInfo, ContentResponse, ExtractOptions, GameFileRecord, IngestState,
    StorageKind, UploadedArchive, ValidationReport,
};
use chrono::Utc;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs uploads through the pipeline and serves the stored results.
pub struct Ingestor<R> {
    config: IngestConfig,
    repository: R,
}

impl<R: FileRepository> Ingestor<R> {
    pub fn new(config: IngestConfig, repository: R) -> Self {
        Self { config, repository }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Ingest one upload.
    pub async fn ingest(&self, upload: UploadedArchive) -> Result<GameFileRecord, IngestError> {
        self.ingest_with_cancel(upload, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// Ingest one upload, aborting extraction once `cancel_flag` is raised.
    pub async fn ingest_with_cancel(
        &self,
        upload: UploadedArchive,
        cancel_flag: Arc<AtomicBool>,
    ) -> Result<GameFileRecord, IngestError> {
        transition(&upload.filename, IngestState::Received);

        match self.run(&upload, cancel_flag).await {
            Ok(record) => {
                transition(&upload.filename, IngestState::Persisted);
                info!(
                    upload = %upload.filename,
                    id = %record.id,
                    path = %record.storage_path.display(),
                    "Upload stored"
                );
                Ok(record)
            }
            Err(e) => {
                transition(&upload.filename, IngestState::Failed);
                warn!(upload = %upload.filename, error = %e, "Upload rejected");
                // Every branch already removed the upload; this covers early exits.
                discard_file(&upload.path).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        upload: &UploadedArchive,
        cancel_flag: Arc<AtomicBool>,
    ) -> Result<GameFileRecord, IngestError> {
        let kind = UploadKind::detect(&upload.filename, &upload.media_type)
            .ok_or_else(|| IngestError::UnsupportedMediaType(upload.media_type.clone()))?;

        tokio::fs::create_dir_all(&self.config.storage_root).await?;
        let storage_name = generate_storage_name();

        match kind {
            UploadKind::Zip => self.ingest_archive(upload, storage_name, cancel_flag).await,
            UploadKind::Html => self.ingest_page(upload, storage_name).await,
            other => self.ingest_loose(upload, storage_name, other).await,
        }
    }

    async fn ingest_archive(
        &self,
        upload: &UploadedArchive,
        storage_name: String,
        cancel_flag: Arc<AtomicBool>,
    ) -> Result<GameFileRecord, IngestError> {
        let report = validate_archive(&upload.path, Some(&upload.filename), &self.config).await;
        if !report.is_valid {
            discard_file(&upload.path).await;
            return Err(IngestError::Validation(report));
        }
        transition(&upload.filename, IngestState::Validated);

        let extract_dir = self.config.storage_root.join(&storage_name);
        let options = ExtractOptions {
            size_limit_bytes: Some(self.config.extracted_limit()),
            timeout: self.config.extraction_timeout,
        };

        let extracted = extract_archive_with_timeout(
            upload.path.clone(),
            extract_dir.clone(),
            options,
            cancel_flag,
        )
        .await;
        discard_file(&upload.path).await;

        let stats = match extracted {
            Ok(stats) => stats,
            Err(e) => {
                discard_dir(&extract_dir).await;
                return Err(IngestError::Extraction(e));
            }
        };
        transition(&upload.filename, IngestState::Extracted);

        let classification = classify(&stats.files);
        transition(&upload.filename, IngestState::Classified);
        debug!(
            upload = %upload.filename,
            files = classification.total_files,
            html = classification.html_files.len(),
            jars = classification.jar_files.len(),
            "Classified bundle"
        );

        let mut notices = report.warnings;
        notices.extend(classification.warnings);
        if !stats.skipped.is_empty() {
            notices.push(format!(
                "Skipped {} symbolic link entries",
                stats.skipped.len()
            ));
        }

        let (storage_path, storage_kind, media_type, detection, compatibility) =
            match classification.kind {
                BundleKind::Unsupported { reason } => {
                    discard_dir(&extract_dir).await;
                    return Err(IngestError::Unsupported(reason));
                }
                BundleKind::Html {
                    main_entry,
                    detection,
                } => {
                    let entry_path = resolve_main_entry(&extract_dir, &main_entry).await?;
                    let compatibility = analyze_file(&entry_path).await;
                    transition(&upload.filename, IngestState::Analyzed);
                    (
                        entry_path,
                        StorageKind::File,
                        UploadKind::Html.media_type(),
                        Some(detection),
                        compatibility,
                    )
                }
                BundleKind::JavaArchive { .. } => (
                    extract_dir.clone(),
                    StorageKind::Directory,
                    UploadKind::JavaArchive.media_type(),
                    None,
                    CompatibilityInfo::default(),
                ),
            };

        let record = GameFileRecord {
            id: Uuid::new_v4(),
            storage_name,
            original_name: upload.filename.clone(),
            size: upload.size,
            media_type: media_type.to_string(),
            storage_path,
            storage_kind,
            bundle_root: Some(extract_dir),
            uploaded_at: Utc::now(),
            detection,
            notices,
            compatibility,
        };

        self.persist(record).await
    }

    /// A bare HTML upload skips extraction and is analyzed in place.
    async fn ingest_page(
        &self,
        upload: &UploadedArchive,
        storage_name: String,
    ) -> Result<GameFileRecord, IngestError> {
        self.check_loose_size(upload).await?;
        transition(&upload.filename, IngestState::Validated);

        let target = self
            .config
            .storage_root
            .join(format!("{}.{}", storage_name, UploadKind::Html.extension()));
        move_file(&upload.path, &target).await?;
        transition(&upload.filename, IngestState::SkippedExtraction);

        let compatibility = analyze_file(&target).await;
        transition(&upload.filename, IngestState::Analyzed);

        let record = GameFileRecord {
            id: Uuid::new_v4(),
            storage_name,
            original_name: upload.filename.clone(),
            size: upload.size,
            media_type: UploadKind::Html.media_type().to_string(),
            storage_path: target,
            storage_kind: StorageKind::File,
            bundle_root: None,
            uploaded_at: Utc::now(),
            detection: None,
            notices: Vec::new(),
            compatibility,
        };

        self.persist(record).await
    }

    /// Java archives, manifests and executables are stored as they came.
    async fn ingest_loose(
        &self,
        upload: &UploadedArchive,
        storage_name: String,
        kind: UploadKind,
    ) -> Result<GameFileRecord, IngestError> {
        self.check_loose_size(upload).await?;
        transition(&upload.filename, IngestState::Validated);

        let target = self
            .config
            .storage_root
            .join(format!("{}.{}", storage_name, kind.extension()));
        move_file(&upload.path, &target).await?;
        transition(&upload.filename, IngestState::SkippedExtraction);

        let record = GameFileRecord {
            id: Uuid::new_v4(),
            storage_name,
            original_name: upload.filename.clone(),
            size: upload.size,
            media_type: kind.media_type().to_string(),
            storage_path: target,
            storage_kind: StorageKind::File,
            bundle_root: None,
            uploaded_at: Utc::now(),
            detection: None,
            notices: Vec::new(),
            compatibility: CompatibilityInfo::default(),
        };

        self.persist(record).await
    }

    async fn check_loose_size(&self, upload: &UploadedArchive) -> Result<(), IngestError> {
        let size = match tokio::fs::metadata(&upload.path).await {
            Ok(metadata) => metadata.len().max(upload.size),
            Err(e) => {
                return Err(IngestError::Validation(ValidationReport {
                    is_valid: false,
                    errors: vec![format!("Could not read uploaded file: {}", e)],
                    warnings: Vec::new(),
                }))
            }
        };

        if size > self.config.max_upload_bytes {
            return Err(IngestError::Validation(ValidationReport {
                is_valid: false,
                errors: vec![format!(
                    "File too large: {} bytes exceeds the {} byte limit",
                    size, self.config.max_upload_bytes
                )],
                warnings: Vec::new(),
            }));
        }
        Ok(())
    }

    /// Artifacts are left in place when the store fails; [`Ingestor::sweep_orphans`]
    /// reclaims them.
    async fn persist(&self, record: GameFileRecord) -> Result<GameFileRecord, IngestError> {
        self.repository
            .create(record)
            .await
            .map_err(IngestError::Persistence)
    }

    pub async fn get(&self, id: Uuid) -> Result<GameFileRecord, IngestError> {
        Ok(self.repository.get(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<GameFileRecord>, IngestError> {
        Ok(self.repository.list().await?)
    }

    /// Delete a record and its artifact.
    ///
    /// The artifact goes first. If removing it fails the record is kept so the
    /// delete can be retried; an artifact that is already gone counts as
    /// removed.
    pub async fn delete(&self, id: Uuid) -> Result<GameFileRecord, IngestError> {
        let record = self.repository.get(id).await?;

        let (artifact, is_dir) = match (&record.bundle_root, record.storage_kind) {
            (Some(root), _) => (root.as_path(), true),
            (None, StorageKind::Directory) => (record.storage_path.as_path(), true),
            (None, StorageKind::File) => (record.storage_path.as_path(), false),
        };

        let removed = if is_dir {
            tokio::fs::remove_dir_all(artifact).await
        } else {
            tokio::fs::remove_file(artifact).await
        };
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(id = %id, path = %artifact.display(), "Artifact already missing");
            }
            Err(e) => return Err(IngestError::Storage(e)),
        }

        let deleted = self.repository.delete(id).await?;
        info!(id = %id, name = %deleted.original_name, "Deleted upload");
        Ok(deleted)
    }

    /// The body the player loads for a record.
    ///
    /// File records return their stored bytes; Java-archive bundles get a
    /// generated landing page linking each downloadable file.
    pub async fn content(&self, id: Uuid) -> Result<ContentResponse, IngestError> {
        let record = self.repository.get(id).await?;

        match record.storage_kind {
            StorageKind::File => {
                let body = tokio::fs::read(&record.storage_path).await?;
                Ok(ContentResponse {
                    media_type: record.media_type,
                    body,
                    disposition: None,
                })
            }
            StorageKind::Directory => {
                let root = record.storage_path.clone();
                let files = tokio::task::spawn_blocking(move || downloadable_files(&root))
                    .await
                    .map_err(io::Error::other)??;
                let page = render_landing_page(record.id, &record.original_name, &files);
                Ok(ContentResponse {
                    media_type: "text/html".to_string(),
                    body: page.into_bytes(),
                    disposition: None,
                })
            }
        }
    }

    /// Serve one file out of a record's bundle directory as an attachment.
    pub async fn download(&self, id: Uuid, name: &str) -> Result<ContentResponse, IngestError> {
        let record = self.repository.get(id).await?;
        let root = record
            .bundle_root
            .as_deref()
            .ok_or_else(|| IngestError::InvalidPath(format!("{} is not a bundle", id)))?;

        let target =
            contained_path(root, name).map_err(|e| IngestError::InvalidPath(e.to_string()))?;

        // Resolve links before trusting the location.
        let canonical_root = tokio::fs::canonicalize(root).await?;
        let canonical = match tokio::fs::canonicalize(&target).await {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IngestError::BundleFileNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !canonical.starts_with(&canonical_root) {
            return Err(IngestError::InvalidPath(name.to_string()));
        }
        if !tokio::fs::metadata(&canonical).await?.is_file() {
            return Err(IngestError::BundleFileNotFound(name.to_string()));
        }

        let body = tokio::fs::read(&canonical).await?;
        let filename = canonical
            .file_name()
            .map(|n| n.to_string_lossy().replace('"', "_"))
            .unwrap_or_else(|| "download".to_string());

        Ok(ContentResponse {
            media_type: media_type_for_path(name),
            body,
            disposition: Some(format!("attachment; filename=\"{}\"", filename)),
        })
    }

    /// Remove extraction directories under the storage root that no record
    /// references and that are older than `min_age`.
    ///
    /// The age threshold keeps in-flight ingestions safe from the sweep.
    pub async fn sweep_orphans(&self, min_age: Duration) -> Result<Vec<PathBuf>, IngestError> {
        let referenced: HashSet<PathBuf> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter_map(|r| r.bundle_root)
            .collect();

        let mut removed = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.config.storage_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() || referenced.contains(&path) {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok())
                .unwrap_or_default();
            if age < min_age {
                continue;
            }

            tokio::fs::remove_dir_all(&path).await?;
            info!(path = %path.display(), "Removed orphaned extraction directory");
            removed.push(path);
        }

        Ok(removed)
    }
}

fn transition(upload: &str, state: IngestState) {
    debug!(upload = %upload, state = %state, "Ingestion state");
}

/// `<UTC timestamp>-<random suffix>`, unique per upload.
fn generate_storage_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d%H%M%S%3f"), &suffix[..12])
}

/// Locate the selected entry inside the extraction directory, discarding the
/// directory if the entry path is unusable.
async fn resolve_main_entry(extract_dir: &Path, main_entry: &str) -> Result<PathBuf, IngestError> {
    match validate_entry_path(main_entry) {
        Ok(relative) => Ok(extract_dir.join(relative)),
        Err(e) => {
            discard_dir(extract_dir).await;
            Err(IngestError::Extraction(ExtractError::from(e)))
        }
    }
}

/// Move an upload into storage, copying when a rename cannot cross devices.
async fn move_file(from: &Path, to: &Path) -> Result<(), IngestError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    if let Err(e) = tokio::fs::copy(from, to).await {
        discard_file(to).await;
        return Err(IngestError::Storage(e));
    }
    discard_file(from).await;
    Ok(())
}

async fn discard_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
    }
}

async fn discard_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed extraction directory"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove extraction directory"),
    }
}
