//! HTTP-backed renderer
//!
//! Fetches pages with reqwest and answers selector queries from the static
//! HTML. Cookies persist for the lifetime of the renderer, so a session
//! established out-of-band (or through `login_url`) carries over.

use crate::config::HttpConfig;
use crate::render::{ElementHandle, PageRenderer, PageSnapshot, RenderError, RenderResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Builds an HTTP client with the configured user agent and timeouts
///
/// # Example
///
/// ```no_run
/// use pagewalk::config::HttpConfig;
/// use pagewalk::render::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_millis(config.timeout_ms))
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL and returns the final URL (after redirects) and the body
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx | `Ok((final_url, body))` |
/// | other status | `RenderError::Status` |
/// | timeout | `RenderError::Timeout` |
/// | connect/other failure | `RenderError::Navigation` |
pub async fn fetch_page(client: &Client, url: &str) -> RenderResult<(String, String)> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_error(url, e))?;

    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        return Err(RenderError::Status {
            url: final_url,
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(|e| classify_error(url, e))?;
    Ok((final_url, body))
}

fn classify_error(url: &str, error: reqwest::Error) -> RenderError {
    if error.is_timeout() {
        RenderError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        RenderError::Navigation {
            url: url.to_string(),
            message: "Connection refused".to_string(),
        }
    } else {
        RenderError::Navigation {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// Renderer that loads pages over plain HTTP
pub struct HttpRenderer {
    client: Client,
    page: Option<PageSnapshot>,
    generation: u64,
}

impl HttpRenderer {
    /// Creates a renderer with a client built from `config`
    pub fn new(config: &HttpConfig) -> RenderResult<Self> {
        let client = build_http_client(config).map_err(|e| RenderError::Navigation {
            url: String::new(),
            message: format!("Failed to build HTTP client: {}", e),
        })?;
        Ok(Self::with_client(client))
    }

    /// Creates a renderer around an existing client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            page: None,
            generation: 0,
        }
    }

    fn page(&self) -> RenderResult<&PageSnapshot> {
        self.page.as_ref().ok_or(RenderError::NoPage)
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn navigate(&mut self, url: &str) -> RenderResult<()> {
        tracing::debug!("GET {}", url);
        let (final_url, body) = fetch_page(&self.client, url).await?;
        self.generation += 1;
        self.page = Some(PageSnapshot::new(final_url, body, self.generation));
        Ok(())
    }

    async fn wait_until_ready(&mut self) -> RenderResult<()> {
        // A fetched body is already complete
        self.page().map(|_| ())
    }

    async fn refresh(&mut self) -> RenderResult<()> {
        let url = self.page()?.url().to_string();
        self.navigate(&url).await
    }

    fn current_url(&self) -> Option<&str> {
        self.page.as_ref().map(PageSnapshot::url)
    }

    async fn query_selector(
        &mut self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> RenderResult<Option<ElementHandle>> {
        Ok(self
            .page()?
            .select(scope, selector, true)?
            .into_iter()
            .next())
    }

    async fn query_selector_all(
        &mut self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> RenderResult<Vec<ElementHandle>> {
        self.page()?.select(scope, selector, false)
    }

    async fn element_text(&mut self, handle: ElementHandle) -> RenderResult<String> {
        self.page()?.text(handle)
    }

    async fn element_attribute(
        &mut self,
        handle: ElementHandle,
        name: &str,
    ) -> RenderResult<Option<String>> {
        self.page()?.attribute(handle, name)
    }

    async fn evaluate_script(&mut self, script: &str) -> RenderResult<String> {
        Err(RenderError::Unsupported(script.to_string()))
    }

    fn supports_scripts(&self) -> bool {
        false
    }
}
