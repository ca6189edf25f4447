//! Storage module for accumulating crawl results
//!
//! This module holds the records collected during a run:
//! - Listing records keyed by name (phase 1 output, phase 2 input)
//! - Detail records in visit order (phase 2 output)
//! - Checkpoint and finalize operations delegating to a `RecordWriter`

mod store;
mod traits;

pub use store::ResultStore;
pub use traits::{StorageError, StorageResult};

/// One listing item: a human-readable key and the reference to its detail page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingRecord {
    pub key: String,
    pub detail_ref: String,
}

impl ListingRecord {
    pub fn new(key: impl Into<String>, detail_ref: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            detail_ref: detail_ref.into(),
        }
    }
}
