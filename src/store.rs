use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Errors that can occur while persisting resume positions
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-item resume positions, keyed by item identifier
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self, item_id: &str) -> Result<Option<u64>, StoreError>;
    async fn save(&self, item_id: &str, position_millis: u64) -> Result<(), StoreError>;
    async fn clear(&self, item_id: &str) -> Result<(), StoreError>;
}

/// In-process store, lost when the process exits
#[derive(Default)]
pub struct MemoryProgressStore {
    positions: Mutex<HashMap<String, u64>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn positions(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.positions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Current value without going through the async trait
    pub fn get(&self, item_id: &str) -> Option<u64> {
        self.positions().get(item_id).copied()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, item_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.get(item_id))
    }

    async fn save(&self, item_id: &str, position_millis: u64) -> Result<(), StoreError> {
        self.positions()
            .insert(item_id.to_string(), position_millis);
        Ok(())
    }

    async fn clear(&self, item_id: &str) -> Result<(), StoreError> {
        self.positions().remove(item_id);
        Ok(())
    }
}

/// JSON file store: a single `{ item_id: millis }` object on disk
pub struct FileProgressStore {
    path: PathBuf,
    /// In-memory copy of the file contents
    entries: RwLock<HashMap<String, u64>>,
}

impl FileProgressStore {
    /// Open the store, loading existing positions if the file exists
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entries = match fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "FileProgressStore: Loaded {} resume positions from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Write the whole map to a temp file, then rename over the old one
    async fn flush(&self, entries: &HashMap<String, u64>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.path).await?;
        debug!("FileProgressStore: Flushed {} entries", entries.len());
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self, item_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.entries.read().await.get(item_id).copied())
    }

    async fn save(&self, item_id: &str, position_millis: u64) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(item_id.to_string(), position_millis);
        self.flush(&entries).await
    }

    async fn clear(&self, item_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if entries.remove(item_id).is_none() {
            return Ok(());
        }
        self.flush(&entries).await
    }
}
