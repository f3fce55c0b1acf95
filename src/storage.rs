pub mod json_file;
pub mod memory;
pub mod sqlite;

use crate::errors::StoreError;
use crate::models::{AuditEntry, StoredRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence contract for the task log.
///
/// Rows are keyed by `(user, date)`. `upsert_one` must replace an existing row
/// for the key in a single step: no reader may observe the key missing while
/// it is being replaced.
pub trait LogStore: Send + Sync {
    fn backend(&self) -> &'static str;

    fn load(&self) -> Result<Vec<StoredRow>, StoreError>;

    fn upsert_one(&self, row: StoredRow) -> Result<(), StoreError>;

    /// Returns whether a row was removed. A missing key is not an error.
    fn delete(&self, user: &str, date: NaiveDate) -> Result<bool, StoreError>;

    fn replace_all(&self, rows: Vec<StoredRow>) -> Result<(), StoreError>;

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;

    fn audit_trail(&self) -> Result<Vec<AuditEntry>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    #[default]
    Json,
    Sqlite,
}

impl Backend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "session" => Some(Self::Memory),
            "json" | "file" => Some(Self::Json),
            "sqlite" | "db" => Some(Self::Sqlite),
            _ => None,
        }
    }

    fn default_path(self) -> PathBuf {
        match self {
            Self::Sqlite => PathBuf::from("data/logs.sqlite"),
            Self::Memory | Self::Json => PathBuf::from("data/logs.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_data_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| self.backend.default_path())
    }
}

pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn LogStore>, StoreError> {
    let store: Arc<dyn LogStore> = match config.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Json => {
            let path = config.resolve_data_path();
            ensure_parent(&path)?;
            Arc::new(JsonFileStore::open(path)?)
        }
        Backend::Sqlite => {
            let path = config.resolve_data_path();
            ensure_parent(&path)?;
            Arc::new(SqliteStore::open(&path)?)
        }
    };
    info!(backend = store.backend(), "log store opened");
    Ok(store)
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
