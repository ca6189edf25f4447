//! Storage error types

use crate::output::OutputError;
use thiserror::Error;

/// Errors that can occur during result store operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Checkpoint write failed: {0}")]
    Write(#[from] OutputError),

    #[error("Result store already finalized")]
    Finalized,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
