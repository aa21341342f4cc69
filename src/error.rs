//! Error types for txtrail

use std::fmt;

use crate::transaction::TxId;

#[derive(Debug, Clone)]
pub enum StoreError {
    NetworkUnavailable,
    InvalidTxParams { field: String, reason: String },
    UnknownTransaction(TxId),
    UnknownStatus(String),
    HistoryError(String),
    StorageError(String),
    SerializationError(String),
    IoError(String),
    ConfigError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::NetworkUnavailable => {
                write!(f, "Network identity is unavailable while the provider is loading")
            }
            StoreError::InvalidTxParams { field, reason } => {
                write!(f, "Invalid transaction params: {}: {}", field, reason)
            }
            StoreError::UnknownTransaction(id) => write!(f, "Unknown transaction: {}", id),
            StoreError::UnknownStatus(tag) => write!(f, "Unknown status: {}", tag),
            StoreError::HistoryError(msg) => write!(f, "History error: {}", msg),
            StoreError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            StoreError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StoreError::IoError(msg) => write!(f, "IO error: {}", msg),
            StoreError::ConfigError(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, StoreError>;
