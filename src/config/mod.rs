//! Configuration module for pagewalk
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use pagewalk::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Results cap: {}", config.limits.max_results);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ChallengeConfig, Config, DetailConfig, HttpConfig, ListingConfig, OutputConfig, SessionConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::{compile_selector, validate};
