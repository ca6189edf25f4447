//! Value reading rules shared by listing items and detail fields
//!
//! A raw string (element text or attribute) goes through the declared
//! transforms in order, then the optional regex pattern, then the optional
//! template. Any step may find nothing, in which case the value is absent.

use crate::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email regex")
});

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}").expect("valid placeholder regex"));

/// Post-processing step applied to a raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    /// Strip surrounding whitespace
    Trim,
    /// Keep the first whitespace-delimited token
    FirstToken,
    /// Keep the last non-empty line
    LastLine,
    /// Collapse runs of whitespace into single spaces
    Collapse,
    /// Keep the first email address found in the text
    Email,
}

impl Transform {
    pub fn apply(&self, value: &str) -> Option<String> {
        match self {
            Self::Trim => Some(value.trim().to_string()),
            Self::FirstToken => value.split_whitespace().next().map(str::to_string),
            Self::LastLine => value
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .last()
                .map(str::to_string),
            Self::Collapse => Some(value.split_whitespace().collect::<Vec<_>>().join(" ")),
            Self::Email => extract_email(value),
        }
    }
}

/// Finds the first `local@domain.tld` address in `text`
///
/// ```
/// use pagewalk::extract::extract_email;
///
/// assert_eq!(
///     extract_email("Contact: jane.doe+work@example.co.kr for info"),
///     Some("jane.doe+work@example.co.kr".to_string())
/// );
/// assert_eq!(extract_email("no address here"), None);
/// ```
pub fn extract_email(text: &str) -> Option<String> {
    EMAIL.find(text).map(|m| m.as_str().to_string())
}

/// How a value is read from an element and post-processed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReadRule {
    /// Attribute to read; the element text when unset
    pub attribute: Option<String>,

    /// Regex applied after transforms. Capture groups of every match feed the
    /// template; without a template the first capture is the value.
    pub pattern: Option<String>,

    /// Output template with `{1}`..`{n}` placeholders
    pub template: Option<String>,

    pub transforms: Vec<Transform>,
}

impl ReadRule {
    /// Compiles the pattern and checks template placeholders
    pub fn compile(&self) -> Result<CompiledRead, ConfigError> {
        let pattern = match &self.pattern {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        if let Some(template) = &self.template {
            let indexes = placeholders(template);
            if indexes.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "template '{}' has no {{n}} placeholder",
                    template
                )));
            }
            if indexes.contains(&0) {
                return Err(ConfigError::Validation(format!(
                    "template '{}': placeholders start at {{1}}",
                    template
                )));
            }
            if pattern.is_none() && indexes.iter().any(|&i| i > 1) {
                return Err(ConfigError::Validation(format!(
                    "template '{}' uses more than {{1}} without a pattern",
                    template
                )));
            }
        }

        Ok(CompiledRead {
            attribute: self.attribute.clone(),
            pattern,
            template: self.template.clone(),
            transforms: self.transforms.clone(),
        })
    }
}

/// A value rule: where to find the element and how to read it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ValueRule {
    /// Selector relative to the enclosing element; the element itself when unset
    #[serde(default)]
    pub selector: Option<String>,

    #[serde(flatten)]
    pub read: ReadRule,
}

/// A validated [`ReadRule`] ready to process raw values
#[derive(Debug, Clone)]
pub struct CompiledRead {
    pub attribute: Option<String>,
    pattern: Option<Regex>,
    template: Option<String>,
    transforms: Vec<Transform>,
}

impl CompiledRead {
    /// Runs transforms, pattern and template over `raw`
    ///
    /// Returns `None` when any step finds nothing or the result is empty.
    pub fn apply(&self, raw: &str) -> Option<String> {
        let mut value = raw.to_string();
        for transform in &self.transforms {
            value = transform.apply(&value)?;
        }

        let captures = match &self.pattern {
            Some(pattern) => {
                let captures = collect_captures(pattern, &value);
                if captures.is_empty() {
                    return None;
                }
                captures
            }
            None => vec![value],
        };

        let value = match &self.template {
            Some(template) => fill_template(template, &captures)?,
            None => captures.into_iter().next()?,
        };

        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Capture values of every match, in order
///
/// With capture groups, each participating group is one value; without
/// groups, each whole match is one value.
fn collect_captures(pattern: &Regex, text: &str) -> Vec<String> {
    let mut values = Vec::new();
    for caps in pattern.captures_iter(text) {
        if caps.len() > 1 {
            values.extend(
                caps.iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str().to_string()),
            );
        } else if let Some(m) = caps.get(0) {
            values.push(m.as_str().to_string());
        }
    }
    values
}

/// Substitutes `{n}` placeholders with `values[n - 1]`
///
/// Returns `None` when a placeholder has no corresponding value.
pub fn fill_template(template: &str, values: &[String]) -> Option<String> {
    let mut missing = false;
    let filled = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
        let index: usize = caps[1].parse().unwrap_or(0);
        match index.checked_sub(1).and_then(|i| values.get(i)) {
            Some(value) => value.clone(),
            None => {
                missing = true;
                String::new()
            }
        }
    });
    if missing {
        None
    } else {
        Some(filled.into_owned())
    }
}

fn placeholders(template: &str) -> Vec<usize> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}
