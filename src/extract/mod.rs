//! Field extraction from rendered pages
//!
//! This module turns a declarative ruleset into string values:
//! - `rules`: reading an element's text or attribute, transforms, regex
//!   patterns and templates
//! - `fields`: locating detail-page fields and enforcing `required`

mod fields;
mod rules;

pub use fields::{FieldExtractor, FieldSpec, LabelRule, SelectorRule};
pub use rules::{extract_email, fill_template, CompiledRead, ReadRule, Transform, ValueRule};

pub(crate) use fields::read_value;

use crate::render::RenderError;
use thiserror::Error;

/// Errors that can occur while extracting fields
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Renderer failed while reading field '{field}': {source}")]
    Render { field: String, source: RenderError },
}

/// Extracted result for one detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRecord {
    /// Key of the listing record this detail came from
    pub source_key: String,

    /// Field name/value pairs in declared order
    pub fields: Vec<(String, String)>,
}

impl DetailRecord {
    pub fn new(source_key: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            source_key: source_key.into(),
            fields,
        }
    }

    /// Value of a field by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}
