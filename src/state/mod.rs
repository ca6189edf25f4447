//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `ChallengeState`: states of the interstitial-challenge guard
//! - `CrawlLimits`: operator caps on items, results and visited records
//! - `CrawlProgress`: monotonic counters owned by the crawl session

mod challenge_state;
mod progress;

// Re-export main types
pub use challenge_state::ChallengeState;
pub use progress::{percent, CrawlLimits, CrawlProgress};
