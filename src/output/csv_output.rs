//! CSV persistence for both crawl phases
//!
//! Phase 1 writes `key, reference` pairs; phase 2 reads them back by header
//! name and writes `key, field...` rows. Files are replaced atomically: each
//! snapshot goes to a temporary sibling that is then renamed over the target.

use crate::output::traits::{OutputError, OutputResult, RecordWriter, Snapshot};
use crate::storage::ListingRecord;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// Column layout of a CSV output file
#[derive(Debug, Clone)]
pub enum CsvLayout {
    /// Phase 1: key column and detail reference column
    Listing {
        key_column: String,
        ref_column: String,
    },

    /// Phase 2: key column followed by one column per field
    Detail {
        key_column: String,
        columns: Vec<String>,
        field_names: Vec<String>,
    },
}

impl CsvLayout {
    fn headers(&self) -> Vec<&str> {
        match self {
            Self::Listing {
                key_column,
                ref_column,
            } => vec![key_column.as_str(), ref_column.as_str()],
            Self::Detail {
                key_column,
                columns,
                ..
            } => std::iter::once(key_column.as_str())
                .chain(columns.iter().map(String::as_str))
                .collect(),
        }
    }
}

/// Writes snapshots to one CSV file per run
pub struct CsvSink {
    path: PathBuf,
    layout: CsvLayout,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, layout: CsvLayout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RecordWriter for CsvSink {
    fn write_snapshot(&mut self, snapshot: Snapshot<'_>) -> OutputResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_path();
        {
            let mut writer = csv::Writer::from_path(&temp)?;
            writer.write_record(self.layout.headers())?;

            match &self.layout {
                CsvLayout::Listing { .. } => {
                    for record in snapshot.listings {
                        writer.write_record([record.key.as_str(), record.detail_ref.as_str()])?;
                    }
                }
                CsvLayout::Detail { field_names, .. } => {
                    for record in snapshot.details {
                        let row = std::iter::once(record.source_key.as_str())
                            .chain(field_names.iter().map(|name| record.get(name).unwrap_or("")));
                        writer.write_record(row)?;
                    }
                }
            }

            writer.flush()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Builds `<directory>/<prefix>_<YYYYMMDD_HHMMSS>.csv`
pub fn timestamped_path(directory: &Path, prefix: &str, at: DateTime<Local>) -> PathBuf {
    directory.join(format!("{}_{}.csv", prefix, at.format("%Y%m%d_%H%M%S")))
}

/// Reads phase 1 output back into listing records
///
/// Columns are located by header name. Values come back exactly as written;
/// rows whose key or reference is blank are skipped with a warning.
pub fn read_listing_csv(
    path: &Path,
    key_column: &str,
    ref_column: &str,
) -> OutputResult<Vec<ListingRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let find = |column: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == column)
            .ok_or_else(|| OutputError::MissingColumn {
                column: column.to_string(),
                path: path.display().to_string(),
            })
    };
    let key_index = find(key_column)?;
    let ref_index = find(ref_column)?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let key = row.get(key_index).unwrap_or("");
        let detail_ref = row.get(ref_index).unwrap_or("");
        if key.trim().is_empty() || detail_ref.trim().is_empty() {
            tracing::warn!(
                "Skipping input row {} of {}: empty key or reference",
                line + 2,
                path.display()
            );
            continue;
        }
        records.push(ListingRecord::new(key, detail_ref));
    }

    Ok(records)
}
