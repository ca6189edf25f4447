//! Page rendering capability
//!
//! The crawl core never touches HTTP or HTML directly. It drives a
//! [`PageRenderer`]: something that can navigate to a URL, report when the page
//! is ready, and answer selector queries against the rendered content.
//!
//! - [`HttpRenderer`] fetches pages with reqwest and queries them with scraper
//! - browser-driven renderers can implement the same trait out of tree

mod document;
mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use document::PageSnapshot;
pub use http::{build_http_client, fetch_page, HttpRenderer};

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a renderer. All but [`RenderError::Unsupported`] are
/// recoverable at the scope of one page or one record.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("No page has been loaded")]
    NoPage,

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Element handle belongs to a previous page")]
    StaleHandle,

    #[error("Element handle does not resolve to an element")]
    UnknownHandle,

    #[error("Script evaluation is not supported by this renderer: {0}")]
    Unsupported(String),

    #[error("Script failed: {0}")]
    Script(String),
}

impl RenderError {
    /// False when retrying cannot help: the renderer lacks the capability
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Opaque reference to an element of the currently loaded page
///
/// Handles are invalidated by the next navigation or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    generation: u64,
    ordinal: usize,
}

impl ElementHandle {
    pub(crate) fn new(generation: u64, ordinal: usize) -> Self {
        Self {
            generation,
            ordinal,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// A controllable page-rendering agent
///
/// One renderer holds one page context. Walkers borrow it exclusively, so
/// implementations never see concurrent calls.
#[async_trait]
pub trait PageRenderer: Send {
    /// Loads `url`, replacing the current page
    async fn navigate(&mut self, url: &str) -> RenderResult<()>;

    /// Waits until the current page is ready to be queried
    async fn wait_until_ready(&mut self) -> RenderResult<()>;

    /// Re-reads the current page
    async fn refresh(&mut self) -> RenderResult<()>;

    /// URL of the current page, after redirects
    fn current_url(&self) -> Option<&str>;

    /// First element matching `selector`, searched under `scope` or the whole page
    async fn query_selector(
        &mut self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> RenderResult<Option<ElementHandle>>;

    /// All elements matching `selector` in document order
    async fn query_selector_all(
        &mut self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> RenderResult<Vec<ElementHandle>>;

    /// Text content of an element
    async fn element_text(&mut self, handle: ElementHandle) -> RenderResult<String>;

    /// Attribute value of an element, `None` when the attribute is absent
    async fn element_attribute(
        &mut self,
        handle: ElementHandle,
        name: &str,
    ) -> RenderResult<Option<String>>;

    /// Evaluates a script in the page context and returns its result as text
    async fn evaluate_script(&mut self, script: &str) -> RenderResult<String>;

    /// Whether [`PageRenderer::evaluate_script`] can succeed at all
    fn supports_scripts(&self) -> bool {
        true
    }
}
