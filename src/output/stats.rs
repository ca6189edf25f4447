//! End-of-run summary
//!
//! Renders a [`CrawlReport`] as a short human-readable block with counts and
//! percentages against the configured caps.

use crate::crawler::{CrawlReport, Phase};
use crate::state::percent;
use std::fmt::Write;

/// Formats the report the way `print_report` shows it
pub fn format_report(report: &CrawlReport) -> String {
    let mut out = String::new();
    let progress = &report.progress;
    let limits = &report.limits;

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Crawl Report ({}) ===\n", report.phase);
    let _ = writeln!(out, "Stop reason: {}", report.stop_reason);
    let _ = writeln!(out, "Config hash: {}", report.config_hash);
    let _ = writeln!(out);

    let _ = writeln!(out, "Progress:");
    match report.phase {
        Phase::Listing => {
            let _ = writeln!(out, "  Pages visited: {}", progress.pages_visited());
            let _ = writeln!(
                out,
                "  Items collected: {} / {} ({:.1}%)",
                progress.items_collected(),
                limits.max_listing_items,
                percent(progress.items_collected(), limits.max_listing_items)
            );
            let _ = writeln!(out, "  Items persisted: {}", report.rows_written);
        }
        Phase::Detail => {
            let _ = writeln!(
                out,
                "  Records visited: {} / {} ({:.1}%)",
                progress.records_visited(),
                limits.max_records_to_visit,
                percent(progress.records_visited(), limits.max_records_to_visit)
            );
            let _ = writeln!(
                out,
                "  Results collected: {} / {} ({:.1}%)",
                progress.results_collected(),
                limits.max_results,
                percent(progress.results_collected(), limits.max_results)
            );
            let _ = writeln!(out, "  Records skipped: {}", progress.records_skipped());
        }
    }
    let _ = writeln!(out, "  Challenges seen: {}", progress.challenges_seen());
    let _ = writeln!(out, "  Checkpoints: {}", report.checkpoints);
    let _ = writeln!(out);

    match &report.output {
        Some(path) => {
            let _ = writeln!(out, "Output: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "Output: none");
        }
    }

    out
}

/// Prints the report to stdout
pub fn print_report(report: &CrawlReport) {
    print!("{}", format_report(report));
}
