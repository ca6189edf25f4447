//! Output writer trait and error types
//!
//! Writers receive a snapshot of everything collected so far and persist it
//! durably. A writer is called for every checkpoint and once more at the end
//! of the run, always with the full snapshot.

use crate::extract::DetailRecord;
use crate::storage::ListingRecord;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Column '{column}' not found in {path}")]
    MissingColumn { column: String, path: String },

    #[error("Failed to write output: {0}")]
    Write(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Everything collected so far, in collection order
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub listings: &'a [ListingRecord],
    pub details: &'a [DetailRecord],
}

/// Trait for durable result writers
pub trait RecordWriter {
    /// Persists the snapshot, replacing whatever an earlier call wrote
    ///
    /// Writing the same snapshot twice must leave identical output.
    fn write_snapshot(&mut self, snapshot: Snapshot<'_>) -> OutputResult<()>;

    /// Where the output lands, for reporting
    fn location(&self) -> &Path;
}
