use crate::config::types::{ChallengeConfig, Config, DetailConfig, ListingConfig, SessionConfig};
use crate::extract::{FieldSpec, SelectorRule, ValueRule};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_session_config(&config.session)?;
    if config.http.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "http timeout_ms must be >= 1".to_string(),
        ));
    }
    if let Some(challenge) = &config.challenge {
        validate_challenge_config(challenge)?;
    }
    if let Some(listing) = &config.listing {
        validate_listing_config(listing)?;
    }
    if let Some(detail) = &config.detail {
        validate_detail_config(detail)?;
    }
    if config.output.key_column.is_empty() || config.output.ref_column.is_empty() {
        return Err(ConfigError::Validation(
            "output column names cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Parses a CSS selector, mapping failures to a configuration error
pub fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.checkpoint_every < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_every must be >= 1, got {}",
            config.checkpoint_every
        )));
    }

    if config.max_consecutive_page_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "max_consecutive_page_failures must be >= 1, got {}",
            config.max_consecutive_page_failures
        )));
    }

    if let Some(login_url) = &config.login_url {
        Url::parse(login_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid login_url: {}", e)))?;
    }

    Ok(())
}

fn validate_challenge_config(config: &ChallengeConfig) -> Result<(), ConfigError> {
    if config.marker_text.trim().is_empty() {
        return Err(ConfigError::Validation(
            "challenge marker_text cannot be empty".to_string(),
        ));
    }

    compile_selector(&config.marker_selector)?;

    if config.poll_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "challenge poll_interval_ms must be >= 1".to_string(),
        ));
    }

    if config.max_wait_ms < config.initial_wait_ms {
        return Err(ConfigError::Validation(format!(
            "challenge max_wait_ms ({}) must not be shorter than initial_wait_ms ({})",
            config.max_wait_ms, config.initial_wait_ms
        )));
    }

    Ok(())
}

fn validate_listing_config(config: &ListingConfig) -> Result<(), ConfigError> {
    match (&config.url_template, &config.start_url, &config.page_script) {
        (Some(template), None, None) => {
            if !template.contains("{page}") {
                return Err(ConfigError::Validation(format!(
                    "url_template '{}' must contain a {{page}} placeholder",
                    template
                )));
            }
            Url::parse(&template.replace("{page}", "1")).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid url_template '{}': {}", template, e))
            })?;
        }
        (None, Some(start_url), Some(script)) => {
            Url::parse(start_url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid start_url '{}': {}", start_url, e))
            })?;
            if !script.contains("{page}") {
                return Err(ConfigError::Validation(format!(
                    "page_script '{}' must contain a {{page}} placeholder",
                    script
                )));
            }
        }
        _ => {
            return Err(ConfigError::Validation(
                "listing needs either url_template, or start_url together with page_script"
                    .to_string(),
            ));
        }
    }

    if config.start_page < 1 {
        return Err(ConfigError::Validation(
            "listing start_page must be >= 1".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "listing max_pages must be >= 1 when set".to_string(),
        ));
    }

    compile_selector(&config.container)?;
    compile_selector(&config.item)?;
    validate_value_rule(&config.key)?;
    validate_value_rule(&config.detail_ref)?;

    Ok(())
}

fn validate_detail_config(config: &DetailConfig) -> Result<(), ConfigError> {
    if config.fields.is_empty() {
        return Err(ConfigError::Validation(
            "detail must declare at least one field".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for field in &config.fields {
        validate_field_spec(field)?;
        if !names.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }
    }

    Ok(())
}

fn validate_field_spec(field: &FieldSpec) -> Result<(), ConfigError> {
    if field.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "field name cannot be empty".to_string(),
        ));
    }

    match &field.rule {
        SelectorRule::Css(selector) => {
            compile_selector(selector)?;
        }
        SelectorRule::Labeled(rule) => {
            if let Some(scope) = &rule.scope {
                compile_selector(scope)?;
            }
            compile_selector(&rule.label)?;
            compile_selector(&rule.value)?;
            if let Some(inner) = &rule.inner {
                compile_selector(inner)?;
            }
            if rule.contains.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "field '{}': label fragment cannot be empty",
                    field.name
                )));
            }
        }
    }

    field.read.compile()?;
    Ok(())
}

fn validate_value_rule(rule: &ValueRule) -> Result<(), ConfigError> {
    if let Some(selector) = &rule.selector {
        compile_selector(selector)?;
    }
    rule.read.compile()?;
    Ok(())
}
