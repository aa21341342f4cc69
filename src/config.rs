//! Configuration for the transaction state store

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, StoreError};
use crate::transaction::TxRecord;

/// Construction-time options for the store
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// How many records the list may hold before adding a new one evicts the
    /// earliest finished record
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Replaces the default status set; `rejected` and `failed` stay
    /// available either way
    #[serde(default)]
    pub custom_status_list: Option<Vec<String>>,

    /// Records seeded into the container at construction; runtime-only
    #[serde(skip)]
    pub initial_records: Vec<TxRecord>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            history_limit: default_history_limit(),
            custom_status_list: None,
            initial_records: Vec::new(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        StoreConfig::default()
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_status_list(mut self, statuses: Vec<String>) -> Self {
        self.custom_status_list = Some(statuses);
        self
    }

    pub fn with_initial_records(mut self, records: Vec<TxRecord>) -> Self {
        self.initial_records = records;
        self
    }

    /// Load config from a TOML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(StoreConfig::default());
        }
        let contents = fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&contents).map_err(|e| {
            StoreError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the store misbehave
    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(StoreError::ConfigError(
                "history_limit must be at least 1".to_string(),
            ));
        }
        if let Some(statuses) = &self.custom_status_list {
            if statuses.is_empty() {
                return Err(StoreError::ConfigError(
                    "custom_status_list cannot be empty".to_string(),
                ));
            }
            for tag in statuses {
                if tag.trim().is_empty() {
                    return Err(StoreError::ConfigError(
                        "custom_status_list entries cannot be blank".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_history_limit() -> usize {
    40
}
