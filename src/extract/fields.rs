//! Field extraction against a rendered detail page

use crate::extract::rules::{CompiledRead, ReadRule};
use crate::extract::ExtractError;
use crate::render::{ElementHandle, PageRenderer, RenderResult};
use crate::ConfigError;
use serde::Deserialize;

/// Declarative description of one field on a detail page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldSpec {
    /// Field name, unique within a field set
    pub name: String,

    /// Output column header; the field name when unset
    #[serde(default)]
    pub column: Option<String>,

    /// A missing required field discards the whole record
    #[serde(default)]
    pub required: bool,

    /// How to locate the element
    pub rule: SelectorRule,

    /// How to read and post-process its value
    #[serde(flatten)]
    pub read: ReadRule,
}

impl FieldSpec {
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// Element location strategy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorRule {
    /// First element matching a CSS selector
    Css(String),

    /// Value element paired with the label whose text contains a fragment
    Labeled(LabelRule),
}

/// Label/value pairing, e.g. the `dt`/`dd` pairs of a definition list
///
/// Labels and values are paired by position within `scope`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LabelRule {
    /// Container holding the pairs; the whole page when unset
    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default = "default_label")]
    pub label: String,

    #[serde(default = "default_value")]
    pub value: String,

    /// Fragment the label text must contain
    pub contains: String,

    /// Element inside the value to read instead of the value itself
    #[serde(default)]
    pub inner: Option<String>,
}

fn default_label() -> String {
    "dt".to_string()
}

fn default_value() -> String {
    "dd".to_string()
}

struct CompiledField {
    spec: FieldSpec,
    read: CompiledRead,
}

/// Applies an ordered set of [`FieldSpec`]s to the current page
pub struct FieldExtractor {
    fields: Vec<CompiledField>,
}

impl FieldExtractor {
    pub fn new(specs: &[FieldSpec]) -> Result<Self, ConfigError> {
        let fields = specs
            .iter()
            .map(|spec| {
                Ok(CompiledField {
                    read: spec.read.compile()?,
                    spec: spec.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { fields })
    }

    /// Output column headers, in field order
    pub fn columns(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| f.spec.column_name().to_string())
            .collect()
    }

    /// Field names, in field order
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.spec.name.clone()).collect()
    }

    /// Extracts every field from the page currently loaded in `renderer`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(fields))` - name/value pairs in field order; missing optional
    ///   fields are empty strings
    /// * `Ok(None)` - a required field was missing, the record is discarded
    /// * `Err(ExtractError)` - the renderer failed
    pub async fn extract(
        &self,
        renderer: &mut dyn PageRenderer,
    ) -> Result<Option<Vec<(String, String)>>, ExtractError> {
        let mut values = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            let name = &field.spec.name;
            let value = read_field(renderer, field)
                .await
                .map_err(|source| ExtractError::Render {
                    field: name.clone(),
                    source,
                })?;

            match value {
                Some(value) => values.push((name.clone(), value)),
                None if field.spec.required => {
                    tracing::debug!("Required field '{}' missing, discarding record", name);
                    return Ok(None);
                }
                None => values.push((name.clone(), String::new())),
            }
        }

        Ok(Some(values))
    }
}

async fn read_field(
    renderer: &mut dyn PageRenderer,
    field: &CompiledField,
) -> RenderResult<Option<String>> {
    let element = match &field.spec.rule {
        SelectorRule::Css(selector) => renderer.query_selector(None, selector).await?,
        SelectorRule::Labeled(rule) => locate_labeled(renderer, rule).await?,
    };

    let Some(element) = element else {
        return Ok(None);
    };

    read_value(renderer, element, &field.read).await
}

/// Reads an element's text or attribute and runs it through `read`
pub(crate) async fn read_value(
    renderer: &mut dyn PageRenderer,
    element: ElementHandle,
    read: &CompiledRead,
) -> RenderResult<Option<String>> {
    let raw = match &read.attribute {
        Some(attribute) => match renderer.element_attribute(element, attribute).await? {
            Some(raw) => raw,
            None => return Ok(None),
        },
        None => renderer.element_text(element).await?,
    };
    Ok(read.apply(&raw))
}

async fn locate_labeled(
    renderer: &mut dyn PageRenderer,
    rule: &LabelRule,
) -> RenderResult<Option<ElementHandle>> {
    let scope = match &rule.scope {
        Some(scope) => match renderer.query_selector(None, scope).await? {
            Some(scope) => Some(scope),
            None => return Ok(None),
        },
        None => None,
    };

    let labels = renderer.query_selector_all(scope, &rule.label).await?;
    let values = renderer.query_selector_all(scope, &rule.value).await?;

    for (label, value) in labels.into_iter().zip(values) {
        let text = renderer.element_text(label).await?;
        if text.contains(&rule.contains) {
            return match &rule.inner {
                Some(inner) => renderer.query_selector(Some(value), inner).await,
                None => Ok(Some(value)),
            };
        }
    }

    Ok(None)
}
