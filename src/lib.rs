//! Pagewalk: a paginated crawl-and-extract pipeline
//!
//! This crate walks a paginated listing site to collect detail references,
//! visits each detail page through an interstitial-challenge guard, extracts a
//! configured set of fields, and persists results with periodic checkpoints.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod render;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for pagewalk operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Renderer error: {0}")]
    Render(#[from] render::RenderError),

    #[error("Extraction error: {0}")]
    Extract(#[from] extract::ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Listing page {page} failed after {attempts} attempts: {source}")]
    PageFailed {
        page: u32,
        attempts: u32,
        source: render::RenderError,
    },

    #[error("Invalid challenge transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::ChallengeState,
        to: state::ChallengeState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Result type alias for pagewalk operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlReport, CrawlSession, StopReason};
pub use extract::{DetailRecord, FieldSpec};
pub use render::{HttpRenderer, PageRenderer};
pub use state::{ChallengeState, CrawlLimits, CrawlProgress};
pub use storage::{ListingRecord, ResultStore};
