use crate::extract::{FieldSpec, ValueRule};
use crate::state::CrawlLimits;
use serde::Deserialize;

/// Main configuration structure for pagewalk
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub limits: CrawlLimits,

    #[serde(default)]
    pub http: HttpConfig,

    /// Interstitial detection; without it the guard never reports a challenge
    #[serde(default)]
    pub challenge: Option<ChallengeConfig>,

    /// Required for the listing phase
    #[serde(default)]
    pub listing: Option<ListingConfig>,

    /// Required for the detail phase
    #[serde(default)]
    pub detail: Option<DetailConfig>,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Session-level pacing, login and checkpoint policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Page opened before the login wait (defaults to the first crawl URL)
    pub login_url: Option<String>,

    /// Time given to the operator to log in (milliseconds)
    pub login_wait_ms: u64,

    /// Wait for Enter on stdin instead of a fixed delay
    pub login_prompt: bool,

    /// Delay between consecutive page or record requests (milliseconds)
    pub pacing_ms: u64,

    /// Extra attempts for a failed page or record
    pub retries: u32,

    /// Delay before each retry (milliseconds)
    pub retry_delay_ms: u64,

    /// Checkpoint cadence, in detail records visited (phase 2) or listing pages (phase 1)
    pub checkpoint_every: u64,

    /// Listing pages that may fail in a row before the walk gives up
    pub max_consecutive_page_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_url: None,
            login_wait_ms: 60_000,
            login_prompt: false,
            pacing_ms: 2_000,
            retries: 1,
            retry_delay_ms: 2_000,
            checkpoint_every: 50,
            max_consecutive_page_failures: 3,
        }
    }
}

/// HTTP renderer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    /// User agent header sent with every request
    pub user_agent: String,

    /// Whole-request timeout (milliseconds)
    pub timeout_ms: u64,

    /// Connection timeout (milliseconds)
    pub connect_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("pagewalk/{}", env!("CARGO_PKG_VERSION")),
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Interstitial challenge detection and polling bounds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChallengeConfig {
    /// Element whose text is searched for the marker
    #[serde(default = "default_marker_selector")]
    pub marker_selector: String,

    /// Text fragment identifying the challenge page
    pub marker_text: String,

    /// Wait before the first re-check (milliseconds)
    #[serde(default = "default_initial_wait")]
    pub initial_wait_ms: u64,

    /// Interval between re-checks (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Total wait after which the guard escalates (milliseconds)
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,

    /// Also guard listing page navigations
    #[serde(default)]
    pub guard_listing: bool,
}

fn default_marker_selector() -> String {
    "body".to_string()
}

fn default_initial_wait() -> u64 {
    30_000
}

fn default_poll_interval() -> u64 {
    10_000
}

fn default_max_wait() -> u64 {
    600_000
}

/// Listing (phase 1) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListingConfig {
    /// Page URL with a `{page}` placeholder
    #[serde(default)]
    pub url_template: Option<String>,

    /// First listing URL when pages are switched by script
    #[serde(default)]
    pub start_url: Option<String>,

    /// Script with a `{page}` placeholder evaluated to switch pages
    #[serde(default)]
    pub page_script: Option<String>,

    #[serde(default = "default_start_page")]
    pub start_page: u32,

    /// Hard bound on listing pages, independent of item caps
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Listing container; its absence ends the walk
    pub container: String,

    /// Item selector, relative to the container
    pub item: String,

    pub key: ValueRule,

    pub detail_ref: ValueRule,
}

fn default_start_page() -> u32 {
    1
}

/// Detail (phase 2) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetailConfig {
    pub fields: Vec<FieldSpec>,
}

/// Output file configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving the CSV files
    pub directory: String,

    /// Header of the key column in both phases
    pub key_column: String,

    /// Header of the detail reference column in phase 1
    pub ref_column: String,

    /// File name prefix for phase 1 output
    pub listing_prefix: String,

    /// File name prefix for phase 2 output
    pub detail_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: ".".to_string(),
            key_column: "Company Name".to_string(),
            ref_column: "URL".to_string(),
            listing_prefix: "recruit_urls".to_string(),
            detail_prefix: "email_results".to_string(),
        }
    }
}
