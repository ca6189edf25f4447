//! Crawl caps and progress counters

use serde::Deserialize;

/// Operator-supplied caps
///
/// A cap of `0` means "collect nothing": the corresponding walk stops before
/// its first request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlLimits {
    /// Listing items to collect in phase 1
    pub max_listing_items: u64,

    /// Detail records to keep in phase 2
    pub max_results: u64,

    /// Input records to visit in phase 2, whether or not they yield a result
    pub max_records_to_visit: u64,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_listing_items: 1000,
            max_results: 200,
            max_records_to_visit: 1000,
        }
    }
}

/// Monotonic counters for one crawl run
///
/// Owned by the session and lent to walkers; counters only ever increase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlProgress {
    pages_visited: u64,
    items_collected: u64,
    records_visited: u64,
    results_collected: u64,
    records_skipped: u64,
    challenges_seen: u64,
}

impl CrawlProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages_visited(&self) -> u64 {
        self.pages_visited
    }

    pub fn items_collected(&self) -> u64 {
        self.items_collected
    }

    pub fn records_visited(&self) -> u64 {
        self.records_visited
    }

    pub fn results_collected(&self) -> u64 {
        self.results_collected
    }

    pub fn records_skipped(&self) -> u64 {
        self.records_skipped
    }

    pub fn challenges_seen(&self) -> u64 {
        self.challenges_seen
    }

    pub fn record_page(&mut self) {
        self.pages_visited += 1;
    }

    pub fn record_item(&mut self) {
        self.items_collected += 1;
    }

    pub fn record_visit(&mut self) {
        self.records_visited += 1;
    }

    pub fn record_result(&mut self) {
        self.results_collected += 1;
    }

    pub fn record_skip(&mut self) {
        self.records_skipped += 1;
    }

    pub fn record_challenge(&mut self) {
        self.challenges_seen += 1;
    }

    /// True once the listing item cap is met
    pub fn listing_cap_reached(&self, limits: &CrawlLimits) -> bool {
        self.items_collected >= limits.max_listing_items
    }

    /// True once the results cap is met
    pub fn results_cap_reached(&self, limits: &CrawlLimits) -> bool {
        self.results_collected >= limits.max_results
    }

    /// True once the records-to-visit cap is met
    pub fn visit_cap_reached(&self, limits: &CrawlLimits) -> bool {
        self.records_visited >= limits.max_records_to_visit
    }
}

/// `part` as a percentage of `whole`, 0 when `whole` is 0
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64) * 100.0
}
