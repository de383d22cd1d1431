//! End-to-end tests for the ingestion orchestrator.

mod common;

use async_trait::async_trait;
use bundle_ingest::{
    DetectionMethod, ExtractError, FileRepository, GameFileRecord, IngestConfig, IngestError,
    Ingestor, MemoryRepository, RepositoryError, StorageKind, UnsupportedReason, UploadedArchive,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;
use zip::write::{SimpleFileOptions, ZipWriter};

struct Harness {
    _temp: TempDir,
    incoming: PathBuf,
    storage: PathBuf,
    ingestor: Ingestor<MemoryRepository>,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let incoming = temp.path().join("incoming");
        let storage = temp.path().join("storage");
        fs::create_dir_all(&incoming).unwrap();

        let ingestor = Ingestor::new(IngestConfig::new(&storage), MemoryRepository::new());
        Self {
            _temp: temp,
            incoming,
            storage,
            ingestor,
        }
    }

    /// Write a ZIP to the incoming area and describe it as an upload.
    fn zip_upload(&self, filename: &str, entries: &[(&str, &[u8])]) -> UploadedArchive {
        let path = self.incoming.join(format!("{}.tmp", Uuid::new_v4()));
        let file = File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
        upload_for(path, filename, "application/zip")
    }

    fn raw_upload(&self, filename: &str, media_type: &str, content: &[u8]) -> UploadedArchive {
        let path = self.incoming.join(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        upload_for(path, filename, media_type)
    }

    fn storage_entries(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.storage) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn upload_for(path: PathBuf, filename: &str, media_type: &str) -> UploadedArchive {
    let size = fs::metadata(&path).unwrap().len();
    UploadedArchive {
        path,
        media_type: media_type.to_string(),
        filename: filename.to_string(),
        size,
    }
}

fn has_notice(record: &GameFileRecord, needle: &str) -> bool {
    record.notices.iter().any(|n| n.contains(needle))
}

#[tokio::test]
async fn test_root_index_is_selected_and_served_byte_for_byte() {
    let h = Harness::new();
    let page = b"<html><script src=\"app.js\"></script>Eaglercraft 1.8.8</html>";
    let upload = h.zip_upload(
        "client.zip",
        &[
            ("docs/index.html", b"<html>docs</html>"),
            ("launcher.html", b"<html>launcher</html>"),
            ("index.html", page),
            ("app.js", b"void 0;"),
        ],
    );
    let upload_path = upload.path.clone();

    let record = h.ingestor.ingest(upload).await.unwrap();

    assert!(!upload_path.exists());
    assert_eq!(record.storage_kind, StorageKind::File);
    assert_eq!(record.media_type, "text/html");
    assert_eq!(record.detection, Some(DetectionMethod::PatternMatch));
    assert!(record.storage_path.ends_with("index.html"));
    assert_eq!(
        record.compatibility.client_family.as_deref(),
        Some("Eaglercraft 1.8.8")
    );

    let content = h.ingestor.content(record.id).await.unwrap();
    assert_eq!(content.media_type, "text/html");
    assert_eq!(content.body, page.to_vec());
}

#[tokio::test]
async fn test_play_html_with_assets() {
    let h = Harness::new();
    let upload = h.zip_upload(
        "bundle.zip",
        &[
            ("assets/logo.png", b"\x89PNG fake image data"),
            ("play.html", b"<html>play</html>"),
            ("scripts/app.js", b"console.log('start');"),
        ],
    );

    let record = h.ingestor.ingest(upload).await.unwrap();

    assert!(record.storage_path.ends_with("play.html"));
    assert_eq!(record.detection, Some(DetectionMethod::PatternMatch));
    assert!(!has_notice(&record, "No common asset"));
    assert!(record.bundle_root.as_ref().unwrap().join("assets/logo.png").exists());
}

#[tokio::test]
async fn test_nested_readme_falls_back_with_warnings() {
    let h = Harness::new();
    let upload = h.zip_upload(
        "docs.zip",
        &[("one/two/three/readme.html", b"<html>readme only</html>")],
    );

    let record = h.ingestor.ingest(upload).await.unwrap();

    assert!(record.storage_path.ends_with("one/two/three/readme.html"));
    assert_eq!(record.detection, Some(DetectionMethod::Fallback));
    assert!(has_notice(&record, "subdirectory"));
    assert!(has_notice(&record, "No common asset"));
}

#[tokio::test]
async fn test_java_archive_bundle_gets_landing_page_and_downloads() {
    let h = Harness::new();
    let jar_bytes: &[u8] = b"PK\x03\x04 pretend this is a jar with classes inside";
    let upload = h.zip_upload(
        "java-client.zip",
        &[
            ("client.jar", jar_bytes),
            ("launcher_profiles.json", b"{\"profiles\": {}}"),
            ("textures/sky.jpg", b"\xff\xd8\xff\xe0 fake jpeg"),
        ],
    );

    let record = h.ingestor.ingest(upload).await.unwrap();

    assert_eq!(record.storage_kind, StorageKind::Directory);
    assert!(record.storage_path.is_dir());
    assert_eq!(record.media_type, "application/java-archive");
    assert_eq!(record.compatibility.client_family, None);

    let landing = h.ingestor.content(record.id).await.unwrap();
    assert_eq!(landing.media_type, "text/html");
    let page = String::from_utf8(landing.body).unwrap();
    assert_eq!(page.matches("<li>").count(), 2);
    assert!(page.contains(&format!("/files/{}/download/client.jar", record.id)));
    assert!(page.contains(&format!(
        "/files/{}/download/launcher_profiles.json",
        record.id
    )));

    let download = h.ingestor.download(record.id, "client.jar").await.unwrap();
    assert_eq!(download.body, jar_bytes.to_vec());
    assert_eq!(download.media_type, "application/java-archive");
    assert_eq!(
        download.disposition.as_deref(),
        Some("attachment; filename=\"client.jar\"")
    );

    let texture = h.ingestor.download(record.id, "textures/sky.jpg").await.unwrap();
    assert_eq!(texture.media_type, "image/jpeg");

    let escape = h.ingestor.download(record.id, "../../etc/passwd").await;
    assert!(matches!(escape, Err(IngestError::InvalidPath(_))));

    let missing = h.ingestor.download(record.id, "missing.jar").await;
    assert!(matches!(missing, Err(IngestError::BundleFileNotFound(_))));
}

#[tokio::test]
async fn test_archive_with_only_configuration_files_is_rejected() {
    let h = Harness::new();
    let upload = h.zip_upload(
        "config.zip",
        &[
            ("manifest.json", b"{\"name\": \"nothing to run here\"}"),
            ("settings.yml", b"volume: 10"),
        ],
    );
    let upload_path = upload.path.clone();

    let result = h.ingestor.ingest(upload).await;

    match result {
        Err(IngestError::Unsupported(UnsupportedReason::OnlyAuxiliaryFiles { files })) => {
            assert_eq!(files, vec!["manifest.json", "settings.yml"]);
        }
        other => panic!("Expected auxiliary-only rejection, got {:?}", other),
    }
    assert!(!upload_path.exists());
    assert!(h.storage_entries().is_empty());
    assert!(h.ingestor.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_archive_with_nothing_runnable_is_rejected() {
    let h = Harness::new();
    let upload = h.zip_upload(
        "images.zip",
        &[("cover.png", b"not really a png but long enough")],
    );

    let result = h.ingestor.ingest(upload).await;

    assert!(matches!(
        result,
        Err(IngestError::Unsupported(UnsupportedReason::NoRunnableEntry))
    ));
    assert!(h.storage_entries().is_empty());
}

#[tokio::test]
async fn test_tiny_zip_fails_validation_and_is_removed() {
    let h = Harness::new();
    let upload = h.raw_upload("tiny.zip", "application/zip", b"PK\x03\x04");
    let upload_path = upload.path.clone();

    let result = h.ingestor.ingest(upload).await;

    match result {
        Err(IngestError::Validation(report)) => {
            assert!(!report.is_valid);
            assert!(report.errors[0].contains("too small"));
        }
        other => panic!("Expected validation error, got {:?}", other),
    }
    assert!(!upload_path.exists());
}

#[tokio::test]
async fn test_bad_signature_fails_validation() {
    let h = Harness::new();
    let upload = h.raw_upload("fake.zip", "application/zip", &[b'A'; 256]);

    let result = h.ingestor.ingest(upload).await;

    assert!(matches!(result, Err(IngestError::Validation(_))));
    assert!(h.storage_entries().is_empty());
}

#[tokio::test]
async fn test_oversized_zip_fails_validation() {
    let temp = TempDir::new().unwrap();
    let mut config = IngestConfig::new(temp.path().join("storage"));
    config.max_upload_bytes = 150;
    let ingestor = Ingestor::new(config, MemoryRepository::new());

    let path = temp.path().join("upload.tmp");
    let mut bytes = b"PK\x03\x04".to_vec();
    bytes.extend(vec![0u8; 300]);
    fs::write(&path, &bytes).unwrap();

    let result = ingestor
        .ingest(upload_for(path.clone(), "big.zip", "application/zip"))
        .await;

    match result {
        Err(IngestError::Validation(report)) => assert!(report.errors[0].contains("too large")),
        other => panic!("Expected validation error, got {:?}", other),
    }
    assert!(!path.exists());
}

#[tokio::test]
async fn test_path_traversal_never_escapes_storage() {
    let h = Harness::new();
    let upload = h.zip_upload(
        "evil.zip",
        &[
            ("index.html", b"<html>bait</html>"),
            ("../../outside.txt", b"should never be written"),
        ],
    );

    let result = h.ingestor.ingest(upload).await;

    assert!(matches!(
        result,
        Err(IngestError::Extraction(ExtractError::Security(_)))
    ));
    assert!(!h.storage.join("../outside.txt").exists());
    assert!(!h.storage.join("../../outside.txt").exists());
    assert!(h.storage_entries().is_empty());
}

#[tokio::test]
async fn test_archive_with_only_directories_is_empty() {
    let h = Harness::new();
    let path = h.incoming.join("dirs.tmp");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    for dir in ["assets/", "scripts/", "styles/"] {
        zip.add_directory(dir, SimpleFileOptions::default()).unwrap();
    }
    zip.finish().unwrap();

    let result = h
        .ingestor
        .ingest(upload_for(path.clone(), "dirs.zip", "application/zip"))
        .await;

    assert!(matches!(
        result,
        Err(IngestError::Extraction(ExtractError::EmptyArchive))
    ));
    assert!(!path.exists());
    assert!(h.storage_entries().is_empty());
}

#[tokio::test]
async fn test_plain_html_upload() {
    let h = Harness::new();
    let mut page = b"<html><head><title>Eaglercraft 1.8.8</title></head><body>".to_vec();
    page.resize(2048, b' ');
    let upload = h.raw_upload("game.html", "text/html", &page);
    let upload_path = upload.path.clone();

    let record = h.ingestor.ingest(upload).await.unwrap();

    assert!(!upload_path.exists());
    assert_eq!(record.media_type, "text/html");
    assert_eq!(record.storage_kind, StorageKind::File);
    assert_eq!(record.bundle_root, None);
    assert_eq!(record.detection, None);
    assert!(record
        .compatibility
        .client_family
        .as_deref()
        .unwrap()
        .contains("1.8.8"));
    assert!(!has_notice(&record, "No common asset"));
    assert!(record.notices.is_empty());

    let content = h.ingestor.content(record.id).await.unwrap();
    assert_eq!(content.body, page);
}

#[tokio::test]
async fn test_loose_jar_upload_is_stored_as_is() {
    let h = Harness::new();
    let upload = h.raw_upload("client.jar", "application/octet-stream", b"jar bytes");

    let record = h.ingestor.ingest(upload).await.unwrap();

    assert_eq!(record.media_type, "application/java-archive");
    assert_eq!(record.storage_kind, StorageKind::File);
    assert_eq!(fs::read(&record.storage_path).unwrap(), b"jar bytes");
}

#[tokio::test]
async fn test_unknown_upload_type_is_rejected() {
    let h = Harness::new();
    let upload = h.raw_upload("notes.pdf", "application/pdf", b"%PDF-1.4");
    let upload_path = upload.path.clone();

    let result = h.ingestor.ingest(upload).await;

    assert!(matches!(result, Err(IngestError::UnsupportedMediaType(_))));
    assert!(!upload_path.exists());
}

#[tokio::test]
async fn test_delete_removes_artifact_and_is_idempotent() {
    let h = Harness::new();
    let upload = h.zip_upload(
        "bundle.zip",
        &[("index.html", b"<html>hello</html>"), ("style.css", b"body{}")],
    );
    let record = h.ingestor.ingest(upload).await.unwrap();
    let bundle_root = record.bundle_root.clone().unwrap();
    assert!(bundle_root.is_dir());

    let deleted = h.ingestor.delete(record.id).await.unwrap();
    assert_eq!(deleted.id, record.id);
    assert!(!bundle_root.exists());

    let again = h.ingestor.delete(record.id).await;
    assert!(matches!(again, Err(IngestError::NotFound(id)) if id == record.id));
}

#[tokio::test]
async fn test_concurrent_uploads_use_separate_directories() {
    let h = Harness::new();
    let first = h.zip_upload("a.zip", &[("index.html", b"<html>first bundle</html>")]);
    let second = h.zip_upload("b.zip", &[("index.html", b"<html>second bundle</html>")]);

    let (a, b) = tokio::join!(h.ingestor.ingest(first), h.ingestor.ingest(second));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.bundle_root, b.bundle_root);
    assert_eq!(
        fs::read_to_string(&a.storage_path).unwrap(),
        "<html>first bundle</html>"
    );
    assert_eq!(
        fs::read_to_string(&b.storage_path).unwrap(),
        "<html>second bundle</html>"
    );
}

#[tokio::test]
async fn test_sweep_removes_only_unreferenced_directories() {
    let h = Harness::new();
    let upload = h.zip_upload("keep.zip", &[("index.html", b"<html>keep me</html>")]);
    let record = h.ingestor.ingest(upload).await.unwrap();

    let orphan = h.storage.join("20240101000000000-deadbeef0000");
    fs::create_dir_all(orphan.join("nested")).unwrap();
    fs::write(orphan.join("nested/index.html"), "<html></html>").unwrap();

    let removed = h.ingestor.sweep_orphans(Duration::ZERO).await.unwrap();

    assert_eq!(removed, vec![orphan.clone()]);
    assert!(!orphan.exists());
    assert!(record.bundle_root.unwrap().exists());
}

#[tokio::test]
async fn test_archive_with_data_descriptors_is_ingested() {
    let h = Harness::new();
    let page: &[u8] = b"<html><script src=\"app.js\"></script>Eaglercraft 1.8.8</html>";
    let bytes = common::data_descriptor_zip(&[("index.html", page), ("app.js", b"void 0;")]);
    let upload = h.raw_upload("streamed.zip", "application/zip", &bytes);

    let record = h.ingestor.ingest(upload).await.unwrap();

    assert!(record.storage_path.ends_with("index.html"));
    assert_eq!(record.detection, Some(DetectionMethod::PatternMatch));
    let content = h.ingestor.content(record.id).await.unwrap();
    assert_eq!(content.body, page.to_vec());
}

#[tokio::test]
async fn test_symlink_entries_are_skipped_with_notice() {
    let h = Harness::new();
    let path = h.incoming.join("links.tmp");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default();
    zip.start_file("index.html", options).unwrap();
    zip.write_all(b"<html>linked bundle</html>").unwrap();
    zip.start_file("app.js", options).unwrap();
    zip.write_all(b"void 0;").unwrap();
    zip.add_symlink("secrets.html", "/etc/shadow", options).unwrap();
    zip.finish().unwrap();

    let record = h
        .ingestor
        .ingest(upload_for(path, "links.zip", "application/zip"))
        .await
        .unwrap();

    assert!(has_notice(&record, "Skipped 1 symbolic link"));
    let root = record.bundle_root.unwrap();
    assert!(fs::symlink_metadata(root.join("secrets.html")).is_err());
}

#[tokio::test]
async fn test_delete_keeps_record_when_artifact_removal_fails() {
    let h = Harness::new();
    let page = h.raw_upload("page.html", "text/html", b"<html>keep</html>");
    let stored = h.ingestor.ingest(page).await.unwrap();

    // A file record whose path is a non-empty directory cannot be unlinked.
    let blocker = h.storage.join("blocker");
    fs::create_dir_all(&blocker).unwrap();
    fs::write(blocker.join("inside.txt"), "x").unwrap();
    let record = GameFileRecord {
        id: Uuid::new_v4(),
        storage_path: blocker.clone(),
        ..stored
    };
    h.ingestor.repository().create(record.clone()).await.unwrap();

    let result = h.ingestor.delete(record.id).await;

    assert!(matches!(result, Err(IngestError::Storage(_))));
    assert_eq!(h.ingestor.get(record.id).await.unwrap(), record);
    assert!(blocker.join("inside.txt").exists());
}

struct FailingRepository;

#[async_trait]
impl FileRepository for FailingRepository {
    async fn create(&self, _record: GameFileRecord) -> Result<GameFileRecord, RepositoryError> {
        Err(RepositoryError::Io(std::io::Error::other("disk full")))
    }

    async fn get(&self, id: Uuid) -> Result<GameFileRecord, RepositoryError> {
        Err(RepositoryError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<GameFileRecord>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn delete(&self, id: Uuid) -> Result<GameFileRecord, RepositoryError> {
        Err(RepositoryError::NotFound(id))
    }
}

#[tokio::test]
async fn test_persistence_failure_is_reported() {
    let temp = TempDir::new().unwrap();
    let storage = temp.path().join("storage");
    let ingestor = Ingestor::new(IngestConfig::new(&storage), FailingRepository);

    let path = temp.path().join("page.tmp");
    fs::write(&path, "<html>hello</html>").unwrap();

    let result = ingestor
        .ingest(upload_for(path.clone(), "index.html", "text/html"))
        .await;

    assert!(matches!(result, Err(IngestError::Persistence(_))));
    assert!(!path.exists());
    assert!(exists_any(&storage));
}

fn exists_any(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut d| d.next().is_some()).unwrap_or(false)
}
