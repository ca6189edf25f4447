//! Interstitial challenge detection and recovery
//!
//! After every guarded navigation the guard looks for the configured marker
//! text. When it is present the guard suspends the crawl and re-reads the page
//! on a fixed interval until the marker disappears, the wait budget runs out,
//! or the crawl is cancelled.
//!
//! An interstitial is often reached through a redirect. Once it clears, the
//! guard goes back to the page that was asked for, so the caller never reads
//! the interstitial's own URL by mistake.

use crate::config::ChallengeConfig;
use crate::crawler::pacing::sleep_or_cancel;
use crate::render::{PageRenderer, RenderResult};
use crate::state::{ChallengeState, CrawlProgress};
use crate::CrawlError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Result of passing a page through the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// No challenge, or the challenge cleared; the caller may read the page
    Clear,

    /// The challenge outlasted `max-wait-ms`
    Escalated,

    /// Cancellation arrived while waiting
    Cancelled,
}

/// Guards page reads against interstitial challenge pages
#[derive(Debug)]
pub struct ChallengeGuard {
    config: Option<ChallengeConfig>,
    state: ChallengeState,
}

impl ChallengeGuard {
    /// Creates a guard; without a config every check passes immediately
    pub fn new(config: Option<ChallengeConfig>) -> Self {
        Self {
            config,
            state: ChallengeState::Clear,
        }
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    /// True when listing navigations should also be guarded
    pub fn guards_listing(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.guard_listing)
    }

    /// True when the marker text is present on the current page
    pub async fn is_challenged(&self, renderer: &mut dyn PageRenderer) -> RenderResult<bool> {
        let Some(config) = &self.config else {
            return Ok(false);
        };

        for element in renderer
            .query_selector_all(None, &config.marker_selector)
            .await?
        {
            if renderer
                .element_text(element)
                .await?
                .contains(&config.marker_text)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Checks the page just navigated to, waiting out any challenge
    ///
    /// Call this right after navigation and before reading the page. `target`
    /// is the URL that was requested; when the cleared page sits elsewhere the
    /// guard navigates back to it. On [`GuardOutcome::Clear`] the renderer
    /// holds the requested page.
    pub async fn check(
        &mut self,
        renderer: &mut dyn PageRenderer,
        target: Option<&str>,
        progress: &mut CrawlProgress,
        cancel: &CancellationToken,
    ) -> Result<GuardOutcome, CrawlError> {
        let Some(config) = self.config.clone() else {
            return Ok(GuardOutcome::Clear);
        };

        if self.state.is_terminal() {
            self.transition(ChallengeState::Clear)?;
        }

        if !self.is_challenged(renderer).await? {
            self.transition(ChallengeState::Clear)?;
            return Ok(GuardOutcome::Clear);
        }

        self.transition(ChallengeState::Challenged)?;
        progress.record_challenge();
        let url = renderer.current_url().unwrap_or("<unknown>").to_string();
        tracing::warn!(
            "Challenge page detected at {}; waiting up to {}s for it to clear",
            url,
            config.max_wait_ms / 1000
        );

        let started = Instant::now();
        let max_wait = Duration::from_millis(config.max_wait_ms);
        let mut delay = Duration::from_millis(config.initial_wait_ms);

        loop {
            if !sleep_or_cancel(delay, cancel).await {
                tracing::info!("Cancelled while waiting on challenge at {}", url);
                return Ok(GuardOutcome::Cancelled);
            }

            renderer.refresh().await?;
            renderer.wait_until_ready().await?;

            if self.is_cleared(renderer, target).await? {
                self.transition(ChallengeState::Clear)?;
                tracing::info!(
                    "Challenge cleared at {} after {:.1}s",
                    url,
                    started.elapsed().as_secs_f64()
                );
                return Ok(GuardOutcome::Clear);
            }

            let elapsed = started.elapsed();
            if elapsed >= max_wait {
                self.transition(ChallengeState::Escalated)?;
                tracing::error!(
                    "Challenge at {} still present after {:.1}s, giving up",
                    url,
                    elapsed.as_secs_f64()
                );
                return Ok(GuardOutcome::Escalated);
            }

            self.transition(ChallengeState::Challenged)?;
            tracing::warn!(
                "Challenge still present at {} ({:.1}s elapsed)",
                url,
                elapsed.as_secs_f64()
            );
            delay = Duration::from_millis(config.poll_interval_ms);
        }
    }

    /// True once the marker is gone and the renderer is back on `target`
    async fn is_cleared(
        &self,
        renderer: &mut dyn PageRenderer,
        target: Option<&str>,
    ) -> RenderResult<bool> {
        if self.is_challenged(renderer).await? {
            return Ok(false);
        }
        let Some(target) = target else {
            return Ok(true);
        };
        if same_page(renderer.current_url(), target) {
            return Ok(true);
        }

        tracing::debug!(
            "Challenge gone from {}, returning to {}",
            renderer.current_url().unwrap_or("<unknown>"),
            target
        );
        renderer.navigate(target).await?;
        renderer.wait_until_ready().await?;
        Ok(!self.is_challenged(renderer).await?)
    }

    fn transition(&mut self, next: ChallengeState) -> Result<(), CrawlError> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if self.state != next {
            tracing::debug!("Challenge guard: {} -> {}", self.state, next);
        }
        self.state = next;
        Ok(())
    }
}

fn same_page(current: Option<&str>, target: &str) -> bool {
    let Some(current) = current else {
        return false;
    };
    match (Url::parse(current), Url::parse(target)) {
        (Ok(current), Ok(target)) => current == target,
        _ => current == target,
    }
}
