//! Storage backends for the transaction list.
//!
//! The contract is deliberately narrow: the manager reads the whole list and
//! writes the whole list back. Backends never mutate individual records, and
//! each call only needs to be atomic on its own because the manager
//! serializes its read-modify-write cycles.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tempfile::NamedTempFile;

use crate::error::{Result, StoreError};
use crate::transaction::TxRecord;

/// Abstraction over the container holding the transaction list
pub trait TxStore: Send + Sync {
    /// Snapshot of the whole list, in insertion order
    fn read(&self) -> Vec<TxRecord>;

    /// Replace the whole list. Errors propagate to the mutating caller
    /// unmodified and leave the previous list in place.
    fn write(&self, records: Vec<TxRecord>) -> Result<()>;
}

/// In-memory store, the default backend and the one tests use
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<TxRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn with_records(records: Vec<TxRecord>) -> Self {
        InMemoryStore {
            records: RwLock::new(records),
        }
    }
}

impl TxStore for InMemoryStore {
    fn read(&self) -> Vec<TxRecord> {
        self.records.read().clone()
    }

    fn write(&self, records: Vec<TxRecord>) -> Result<()> {
        *self.records.write() = records;
        Ok(())
    }
}

/// Whole-list JSON persistence with atomic tempfile-and-rename writes
pub struct JsonFileStore {
    path: PathBuf,
    cache: RwLock<Vec<TxRecord>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading any existing list
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Vec::new()
        };
        Ok(JsonFileStore {
            path,
            cache: RwLock::new(records),
        })
    }

    /// Open the store at the default location under the user's home directory
    pub fn open_default() -> Result<Self> {
        Self::open(default_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TxStore for JsonFileStore {
    fn read(&self) -> Vec<TxRecord> {
        self.cache.read().clone()
    }

    fn write(&self, records: Vec<TxRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(&records)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // Write to a sibling tempfile and rename over the target so a crash
        // mid-write never leaves a truncated list behind
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::StorageError(format!("Failed to finalize write: {}", e)))?;

        *self.cache.write() = records;
        Ok(())
    }
}

/// Default on-disk location for the transaction list
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".txtrail")
        .join("transactions.json")
}
