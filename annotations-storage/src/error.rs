//! Error types for key-value storage operations

use thiserror::Error;

/// Errors raised by key-value stores and the batch retry client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Invalid table name: {name}")]
    InvalidTableName { name: String },

    #[error("Batch of {requested} entries exceeds the store limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },

    #[error("Invalid item for key {key}: {reason}")]
    InvalidItem { key: String, reason: String },

    #[error("Backend error: {reason}")]
    Backend { reason: String },

    #[error("Retries exhausted after {attempts} attempts, {remaining} entries still unprocessed")]
    RetriesExhausted { attempts: u32, remaining: usize },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Key-value store query error: {:?}", err);
        StorageError::Backend {
            reason: "Key-value store query failed".to_string(),
        }
    }
}

impl From<deadpool_postgres::PoolError> for StorageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Key-value store pool error: {:?}", err);
        StorageError::Backend {
            reason: "Failed to acquire key-value store connection".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_exhausted_display() {
        let err = StorageError::RetriesExhausted {
            attempts: 10,
            remaining: 4,
        };
        let display = err.to_string();
        assert!(display.contains("10 attempts"));
        assert!(display.contains("4 entries"));
    }
}
