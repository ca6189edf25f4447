//! Output module for persisting crawl results and reporting
//!
//! This module handles:
//! - Writing listing and detail snapshots as CSV files
//! - Reading phase 1 output back as phase 2 input
//! - Printing the end-of-run report

mod csv_output;
pub mod stats;
mod traits;

pub use csv_output::{read_listing_csv, timestamped_path, CsvLayout, CsvSink};
pub use stats::print_report;
pub use traits::{OutputError, OutputResult, RecordWriter, Snapshot};
