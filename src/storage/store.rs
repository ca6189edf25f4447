//! In-memory result accumulation with checkpointing

use crate::extract::DetailRecord;
use crate::output::{RecordWriter, Snapshot};
use crate::storage::traits::{StorageError, StorageResult};
use crate::storage::ListingRecord;
use std::collections::HashMap;

/// Append-only store of listing and detail records for one run
///
/// Listing records are keyed: adding a key that already exists replaces its
/// reference in place, keeping the original position. Detail records are kept
/// in arrival order.
#[derive(Debug, Default)]
pub struct ResultStore {
    listings: Vec<ListingRecord>,
    index: HashMap<String, usize>,
    details: Vec<DetailRecord>,
    checkpoints: u64,
    finalized: bool,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listing record
    ///
    /// Returns the replaced record when the key was already present.
    pub fn add_listing(&mut self, record: ListingRecord) -> Option<ListingRecord> {
        match self.index.get(&record.key) {
            Some(&position) => Some(std::mem::replace(&mut self.listings[position], record)),
            None => {
                self.index.insert(record.key.clone(), self.listings.len());
                self.listings.push(record);
                None
            }
        }
    }

    /// Adds a detail record
    pub fn add_detail(&mut self, record: DetailRecord) {
        self.details.push(record);
    }

    pub fn listings(&self) -> &[ListingRecord] {
        &self.listings
    }

    pub fn details(&self) -> &[DetailRecord] {
        &self.details
    }

    /// Number of checkpoints written so far, the final write excluded
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Writes the current contents without clearing them
    pub fn checkpoint(&mut self, writer: &mut dyn RecordWriter) -> StorageResult<()> {
        if self.finalized {
            return Err(StorageError::Finalized);
        }
        writer.write_snapshot(self.snapshot())?;
        self.checkpoints += 1;
        tracing::debug!(
            "Checkpoint {} written to {} ({} listings, {} details)",
            self.checkpoints,
            writer.location().display(),
            self.listings.len(),
            self.details.len()
        );
        Ok(())
    }

    /// Writes the final contents; allowed exactly once
    pub fn finalize(&mut self, writer: &mut dyn RecordWriter) -> StorageResult<()> {
        if self.finalized {
            return Err(StorageError::Finalized);
        }
        writer.write_snapshot(self.snapshot())?;
        self.finalized = true;
        Ok(())
    }

    fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            listings: &self.listings,
            details: &self.details,
        }
    }
}
