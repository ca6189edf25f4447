//! Listing (phase 1) walker
//!
//! Drives a paginated listing page by page and yields one [`ListingRecord`]
//! per listing item. Pages are requested lazily: the next page is only loaded
//! once every item of the current one has been handed out.

use crate::config::{ListingConfig, SessionConfig};
use crate::crawler::challenge::{ChallengeGuard, GuardOutcome};
use crate::crawler::pacing::{sleep_or_cancel, Pacer};
use crate::crawler::StopReason;
use crate::extract::{read_value, CompiledRead, ValueRule};
use crate::render::{ElementHandle, PageRenderer, RenderResult};
use crate::state::{CrawlLimits, CrawlProgress};
use crate::storage::ListingRecord;
use crate::{ConfigError, CrawlError};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// How listing pages are reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    /// Each page has its own URL; `{page}` is replaced by the page index
    Template(String),

    /// The first page is opened at `start_url`; later pages are switched by
    /// evaluating `script` (with `{page}` replaced) on the open page
    Script { start_url: String, script: String },
}

impl PageSource {
    fn from_config(config: &ListingConfig) -> Result<Self, ConfigError> {
        match (&config.url_template, &config.start_url, &config.page_script) {
            (Some(template), _, _) => Ok(Self::Template(template.clone())),
            (None, Some(start_url), Some(script)) => Ok(Self::Script {
                start_url: start_url.clone(),
                script: script.clone(),
            }),
            _ => Err(ConfigError::Validation(
                "listing needs url-template, or start-url with page-script".to_string(),
            )),
        }
    }
}

struct CompiledValue {
    selector: Option<String>,
    read: CompiledRead,
}

impl CompiledValue {
    fn new(rule: &ValueRule) -> Result<Self, ConfigError> {
        Ok(Self {
            selector: rule.selector.clone(),
            read: rule.read.compile()?,
        })
    }

    async fn read(
        &self,
        renderer: &mut dyn PageRenderer,
        item: ElementHandle,
    ) -> RenderResult<Option<String>> {
        let element = match &self.selector {
            Some(selector) => match renderer.query_selector(Some(item), selector).await? {
                Some(element) => element,
                None => return Ok(None),
            },
            None => item,
        };
        read_value(renderer, element, &self.read).await
    }
}

enum PageLoad {
    Items(Vec<ListingRecord>),
    Terminal,
    Escalated,
    Cancelled,
}

/// Pull-based walker over a paginated listing
pub struct ListingWalker {
    source: PageSource,
    container: String,
    item: String,
    key: CompiledValue,
    detail_ref: CompiledValue,
    limits: CrawlLimits,
    start_page: u32,
    max_pages: Option<u32>,
    page: u32,
    retries: u32,
    retry_delay: Duration,
    pacer: Pacer,
    pending: VecDeque<ListingRecord>,
    stop: Option<StopReason>,
}

impl ListingWalker {
    pub fn new(
        config: &ListingConfig,
        session: &SessionConfig,
        limits: CrawlLimits,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            source: PageSource::from_config(config)?,
            container: config.container.clone(),
            item: config.item.clone(),
            key: CompiledValue::new(&config.key)?,
            detail_ref: CompiledValue::new(&config.detail_ref)?,
            limits,
            start_page: config.start_page,
            max_pages: config.max_pages,
            page: config.start_page,
            retries: session.retries,
            retry_delay: Duration::from_millis(session.retry_delay_ms),
            pacer: Pacer::from_millis(session.pacing_ms),
            pending: VecDeque::new(),
            stop: None,
        })
    }

    /// URL of the first listing page
    pub fn first_url(&self) -> String {
        match &self.source {
            PageSource::Template(template) => page_url(template, self.start_page),
            PageSource::Script { start_url, .. } => start_url.clone(),
        }
    }

    /// True when pages past the first are reached by evaluating a script
    pub fn needs_scripts(&self) -> bool {
        matches!(self.source, PageSource::Script { .. })
    }

    /// Index of the next page to load
    pub fn current_page(&self) -> u32 {
        self.page
    }

    /// Why the walk ended, once it has
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Gives up on the page that just failed and moves on to the next one
    pub fn skip_page(&mut self) {
        self.page += 1;
    }

    /// Yields the next listing record
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - the next item, in page-then-item order
    /// * `Ok(None)` - the walk is over; see [`ListingWalker::stop_reason`]
    /// * `Err(CrawlError::PageFailed)` - a page failed every attempt; call
    ///   [`ListingWalker::skip_page`] to continue past it
    /// * `Err(CrawlError::Render)` - the renderer cannot load pages of this
    ///   listing at all; retrying will not help
    pub async fn next(
        &mut self,
        renderer: &mut dyn PageRenderer,
        progress: &mut CrawlProgress,
        guard: &mut ChallengeGuard,
        cancel: &CancellationToken,
    ) -> Result<Option<ListingRecord>, CrawlError> {
        loop {
            if self.stop.is_some() {
                return Ok(None);
            }

            if progress.listing_cap_reached(&self.limits) {
                if self.limits.max_listing_items == 0 {
                    tracing::warn!("max-listing-items is 0, nothing to collect");
                } else {
                    tracing::info!(
                        "Listing cap of {} items reached",
                        self.limits.max_listing_items
                    );
                }
                return self.finish(StopReason::ListingCapReached);
            }

            if let Some(record) = self.pending.pop_front() {
                progress.record_item();
                return Ok(Some(record));
            }

            if let Some(max_pages) = self.max_pages {
                if self.page - self.start_page >= max_pages {
                    tracing::info!("Page limit of {} reached", max_pages);
                    return self.finish(StopReason::PageLimitReached);
                }
            }

            if cancel.is_cancelled() || !self.pacer.wait(cancel).await {
                return self.finish(StopReason::Cancelled);
            }

            match self.load_page(renderer, progress, guard, cancel).await? {
                PageLoad::Items(records) => {
                    tracing::debug!("Page {} yielded {} items", self.page, records.len());
                    self.pending.extend(records);
                    self.page += 1;
                }
                PageLoad::Terminal => return self.finish(StopReason::Exhausted),
                PageLoad::Escalated => return self.finish(StopReason::ChallengeEscalated),
                PageLoad::Cancelled => return self.finish(StopReason::Cancelled),
            }
        }
    }

    fn finish(&mut self, reason: StopReason) -> Result<Option<ListingRecord>, CrawlError> {
        self.stop = Some(reason);
        self.pending.clear();
        Ok(None)
    }

    async fn load_page(
        &mut self,
        renderer: &mut dyn PageRenderer,
        progress: &mut CrawlProgress,
        guard: &mut ChallengeGuard,
        cancel: &CancellationToken,
    ) -> Result<PageLoad, CrawlError> {
        let attempts = self.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self
                .try_load(renderer, progress, guard, cancel, attempt > 1)
                .await
            {
                Ok(load) => return Ok(load),
                Err(CrawlError::Render(source)) if !source.is_retryable() => {
                    tracing::error!("Listing page {} cannot be loaded: {}", self.page, source);
                    return Err(CrawlError::Render(source));
                }
                Err(CrawlError::Render(source)) => {
                    if attempt >= attempts {
                        return Err(CrawlError::PageFailed {
                            page: self.page,
                            attempts,
                            source,
                        });
                    }
                    tracing::warn!(
                        "Listing page {} failed (attempt {}/{}): {}, retrying",
                        self.page,
                        attempt,
                        attempts,
                        source
                    );
                    if !sleep_or_cancel(self.retry_delay, cancel).await {
                        return Ok(PageLoad::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_load(
        &mut self,
        renderer: &mut dyn PageRenderer,
        progress: &mut CrawlProgress,
        guard: &mut ChallengeGuard,
        cancel: &CancellationToken,
        reopen: bool,
    ) -> Result<PageLoad, CrawlError> {
        let page = self.page;
        // Only a page with its own URL can be returned to after a challenge
        let target = match &self.source {
            PageSource::Template(template) => {
                let url = page_url(template, page);
                tracing::debug!("Loading listing page {}: {}", page, url);
                renderer.navigate(&url).await?;
                Some(url)
            }
            PageSource::Script { start_url, script } => {
                if page == self.start_page || reopen {
                    tracing::debug!("Opening listing at {}", start_url);
                    renderer.navigate(start_url).await?;
                }
                if page == self.start_page {
                    Some(start_url.clone())
                } else {
                    let script = script.replace("{page}", &page.to_string());
                    tracing::debug!("Switching to listing page {}: {}", page, script);
                    renderer.evaluate_script(&script).await?;
                    None
                }
            }
        };
        renderer.wait_until_ready().await?;

        if guard.guards_listing() {
            match guard
                .check(renderer, target.as_deref(), progress, cancel)
                .await?
            {
                GuardOutcome::Clear => {}
                GuardOutcome::Escalated => return Ok(PageLoad::Escalated),
                GuardOutcome::Cancelled => return Ok(PageLoad::Cancelled),
            }
        }

        progress.record_page();

        let Some(container) = renderer.query_selector(None, &self.container).await? else {
            tracing::info!("No listing container on page {}, listing exhausted", page);
            return Ok(PageLoad::Terminal);
        };

        let items = renderer
            .query_selector_all(Some(container), &self.item)
            .await?;
        if items.is_empty() {
            tracing::info!("Page {} has no items, listing exhausted", page);
            return Ok(PageLoad::Terminal);
        }

        let base = renderer.current_url().map(str::to_string);
        let mut records = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            match self.read_item(renderer, item, base.as_deref()).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => tracing::warn!(
                    "Skipping item {} on page {}: key or reference missing",
                    position + 1,
                    page
                ),
                Err(e) => tracing::warn!(
                    "Skipping item {} on page {}: {}",
                    position + 1,
                    page,
                    e
                ),
            }
        }

        Ok(PageLoad::Items(records))
    }

    async fn read_item(
        &self,
        renderer: &mut dyn PageRenderer,
        item: ElementHandle,
        base: Option<&str>,
    ) -> RenderResult<Option<ListingRecord>> {
        let Some(key) = self.key.read(renderer, item).await? else {
            return Ok(None);
        };
        let Some(raw_ref) = self.detail_ref.read(renderer, item).await? else {
            return Ok(None);
        };
        Ok(resolve_ref(base, &raw_ref).map(|detail_ref| ListingRecord::new(key, detail_ref)))
    }
}

fn page_url(template: &str, page: u32) -> String {
    template.replace("{page}", &page.to_string())
}

/// Resolves a possibly relative reference against the page it was found on
fn resolve_ref(base: Option<&str>, raw: &str) -> Option<String> {
    if let Ok(url) = Url::parse(raw) {
        return Some(url.to_string());
    }
    let joined = base
        .and_then(|base| Url::parse(base).ok())
        .and_then(|base| base.join(raw).ok());
    if joined.is_none() {
        tracing::debug!("Cannot resolve reference '{}' against {:?}", raw, base);
    }
    joined.map(|url| url.to_string())
}
