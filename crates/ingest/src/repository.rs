//! Record persistence.
//!
//! The pipeline only needs create/get/list/delete, each treated as atomic.
//! [`MemoryRepository`] backs tests and embedders; [`JsonFileRepository`]
//! keeps records in a single JSON document so the CLI survives restarts.

use crate::error::RepositoryError;
use crate::types::GameFileRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Storage for [`GameFileRecord`]s.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Store a new record. Fails if the id is already taken.
    async fn create(&self, record: GameFileRecord) -> Result<GameFileRecord, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<GameFileRecord, RepositoryError>;

    /// All records, newest upload first.
    async fn list(&self) -> Result<Vec<GameFileRecord>, RepositoryError>;

    /// Remove a record, returning it.
    async fn delete(&self, id: Uuid) -> Result<GameFileRecord, RepositoryError>;
}

fn sorted_newest_first(mut records: Vec<GameFileRecord>) -> Vec<GameFileRecord> {
    records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    records
}

/// In-process repository.
#[derive(Default)]
pub struct MemoryRepository {
    records: Mutex<HashMap<Uuid, GameFileRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileRepository for MemoryRepository {
    async fn create(&self, record: GameFileRecord) -> Result<GameFileRecord, RepositoryError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.id) {
            return Err(RepositoryError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<GameFileRecord, RepositoryError> {
        self.records
            .lock()
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<GameFileRecord>, RepositoryError> {
        Ok(sorted_newest_first(
            self.records.lock().values().cloned().collect(),
        ))
    }

    async fn delete(&self, id: Uuid) -> Result<GameFileRecord, RepositoryError> {
        self.records
            .lock()
            .remove(&id)
            .ok_or(RepositoryError::NotFound(id))
    }
}

/// Repository persisted as a JSON array in one file.
///
/// Every mutation rewrites the document through a temporary file in the same
/// directory that is then renamed over the original, so a crash never leaves
/// a half-written store behind.
pub struct JsonFileRepository {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<GameFileRecord>, RepositoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, records: Vec<GameFileRecord>) -> Result<(), RepositoryError> {
        let path = self.path.clone();
        let json = serde_json::to_vec_pretty(&records)?;

        tokio::task::spawn_blocking(move || -> Result<(), RepositoryError> {
            let dir = path.parent().unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl FileRepository for JsonFileRepository {
    async fn create(&self, record: GameFileRecord) -> Result<GameFileRecord, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        if records.iter().any(|r| r.id == record.id) {
            return Err(RepositoryError::Duplicate(record.id));
        }
        records.push(record.clone());
        self.store(records).await?;
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<GameFileRecord, RepositoryError> {
        let _guard = self.lock.lock().await;
        self.load()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<GameFileRecord>, RepositoryError> {
        let _guard = self.lock.lock().await;
        Ok(sorted_newest_first(self.load().await?))
    }

    async fn delete(&self, id: Uuid) -> Result<GameFileRecord, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        let removed = records.remove(index);
        self.store(records).await?;
        Ok(removed)
    }
}
