//! Crawler module for the two crawl phases
//!
//! This module contains the core crawling logic, including:
//! - Listing pagination (phase 1)
//! - Detail page visits with field extraction (phase 2)
//! - Interstitial challenge detection and recovery
//! - Request pacing and cancellable waits
//! - Session orchestration, checkpointing and reporting

mod challenge;
mod detail;
mod listing;
mod pacing;
mod session;

pub use challenge::{ChallengeGuard, GuardOutcome};
pub use detail::{DetailStep, DetailWalker};
pub use listing::{ListingWalker, PageSource};
pub use pacing::{sleep_or_cancel, Pacer};
pub use session::CrawlSession;

use crate::state::{CrawlLimits, CrawlProgress};
use std::fmt;
use std::path::PathBuf;

/// Crawl phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Phase 1: collect listing records
    Listing,

    /// Phase 2: visit detail pages and extract fields
    Detail,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing => write!(f, "listing"),
            Self::Detail => write!(f, "detail"),
        }
    }
}

/// Why a crawl run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The listing ran out of pages or the input ran out of records
    Exhausted,

    ListingCapReached,

    ResultCapReached,

    VisitCapReached,

    /// The listing's `max-pages` bound was reached
    PageLimitReached,

    Cancelled,

    /// A challenge page did not clear within its wait budget
    ChallengeEscalated,

    /// Too many listing pages failed in a row
    PageFailures,
}

impl StopReason {
    /// True for stops that leave the run complete
    pub fn is_clean(&self) -> bool {
        !matches!(
            self,
            Self::Cancelled | Self::ChallengeEscalated | Self::PageFailures
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::ListingCapReached => "listing cap reached",
            Self::ResultCapReached => "results cap reached",
            Self::VisitCapReached => "visit cap reached",
            Self::PageLimitReached => "page limit reached",
            Self::Cancelled => "cancelled",
            Self::ChallengeEscalated => "challenge escalated",
            Self::PageFailures => "too many page failures",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a finished crawl run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub phase: Phase,
    pub stop_reason: StopReason,
    pub progress: CrawlProgress,
    pub limits: CrawlLimits,

    /// Rows in the final output file
    pub rows_written: usize,

    /// Intermediate writes made before the final one
    pub checkpoints: u64,

    /// Final output file
    pub output: Option<PathBuf>,

    /// Fingerprint of the configuration used
    pub config_hash: String,
}
