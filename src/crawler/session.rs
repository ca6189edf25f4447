//! Crawl session - top-level orchestration of one phase
//!
//! A session owns the progress counters and the result store for a single run
//! of either phase. It handles:
//! - Waiting for the operator to log in
//! - Driving the phase's walker until it stops
//! - Checkpointing on a fixed cadence and finalizing the output
//! - Turning cancellation into a clean, persisted stop

use crate::config::Config;
use crate::crawler::challenge::ChallengeGuard;
use crate::crawler::detail::{DetailStep, DetailWalker};
use crate::crawler::listing::ListingWalker;
use crate::crawler::pacing::sleep_or_cancel;
use crate::crawler::{CrawlReport, Phase, StopReason};
use crate::extract::FieldExtractor;
use crate::output::{timestamped_path, CsvLayout, CsvSink, RecordWriter};
use crate::render::PageRenderer;
use crate::state::{percent, CrawlLimits, CrawlProgress};
use crate::storage::{ListingRecord, ResultStore};
use crate::{ConfigError, CrawlError};
use chrono::{DateTime, Local};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// One crawl run of one phase
pub struct CrawlSession {
    config: Config,
    limits: CrawlLimits,
    cancel: CancellationToken,
    config_hash: String,
    progress: CrawlProgress,
    store: ResultStore,
    started_at: DateTime<Local>,
}

impl CrawlSession {
    /// Creates a session
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `limits` - Effective caps (config caps with CLI overrides applied)
    /// * `cancel` - Token that stops the run at the next suspension point
    /// * `config_hash` - Fingerprint of the configuration file, for the report
    pub fn new(
        config: Config,
        limits: CrawlLimits,
        cancel: CancellationToken,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            config,
            limits,
            cancel,
            config_hash: config_hash.into(),
            progress: CrawlProgress::new(),
            store: ResultStore::new(),
            started_at: Local::now(),
        }
    }

    pub fn progress(&self) -> &CrawlProgress {
        &self.progress
    }

    /// Output file of the listing phase for this run
    pub fn listing_output(&self) -> std::path::PathBuf {
        timestamped_path(
            Path::new(&self.config.output.directory),
            &self.config.output.listing_prefix,
            self.started_at,
        )
    }

    /// Output file of the detail phase for this run
    pub fn detail_output(&self) -> std::path::PathBuf {
        timestamped_path(
            Path::new(&self.config.output.directory),
            &self.config.output.detail_prefix,
            self.started_at,
        )
    }

    /// Runs phase 1: walks the listing and persists `key, reference` pairs
    pub async fn run_listing(
        mut self,
        renderer: &mut dyn PageRenderer,
    ) -> Result<CrawlReport, CrawlError> {
        let listing = self.config.listing.clone().ok_or_else(|| {
            ConfigError::Validation("the listing phase needs a [listing] section".to_string())
        })?;
        let mut walker = ListingWalker::new(&listing, &self.config.session, self.limits)?;
        if walker.needs_scripts() && !renderer.supports_scripts() {
            return Err(ConfigError::Validation(
                "page-script pagination needs a renderer that can evaluate scripts; \
                 use url-template with the HTTP renderer"
                    .to_string(),
            )
            .into());
        }
        let mut guard = ChallengeGuard::new(self.config.challenge.clone());
        let mut sink = CsvSink::new(
            self.listing_output(),
            CsvLayout::Listing {
                key_column: self.config.output.key_column.clone(),
                ref_column: self.config.output.ref_column.clone(),
            },
        );

        tracing::info!(
            "Starting listing crawl: up to {} items from {}",
            self.limits.max_listing_items,
            walker.first_url()
        );

        if !self.wait_for_login(renderer, &walker.first_url()).await {
            return self.finish(Phase::Listing, StopReason::Cancelled, &mut sink);
        }

        let checkpoint_every = self.config.session.checkpoint_every;
        let max_failures = self.config.session.max_consecutive_page_failures;
        let mut next_checkpoint = checkpoint_every;
        let mut logged_pages = 0;
        let mut consecutive_failures = 0;
        let mut last_failed_page: Option<u32> = None;

        let stop = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let next = walker
                .next(renderer, &mut self.progress, &mut guard, &self.cancel)
                .await;

            match next {
                Ok(Some(record)) => {
                    self.add_listing(record);
                }
                Ok(None) => break walker.stop_reason().unwrap_or(StopReason::Exhausted),
                Err(CrawlError::PageFailed {
                    page,
                    attempts,
                    source,
                }) => {
                    // Failed pages are skipped, so a run of failures has adjacent indexes
                    if last_failed_page.is_some_and(|last| last + 1 == page) {
                        consecutive_failures += 1;
                    } else {
                        consecutive_failures = 1;
                    }
                    last_failed_page = Some(page);
                    tracing::warn!(
                        "Skipping listing page {} after {} attempts: {}",
                        page,
                        attempts,
                        source
                    );
                    if consecutive_failures >= max_failures {
                        tracing::error!(
                            "{} listing pages failed in a row, stopping",
                            consecutive_failures
                        );
                        break StopReason::PageFailures;
                    }
                    walker.skip_page();
                }
                Err(e) => return Err(self.abort(e, &mut sink)),
            }

            let pages = self.progress.pages_visited();
            if pages > logged_pages {
                logged_pages = pages;
                tracing::info!(
                    "Progress: page {}, {}/{} items ({:.1}%)",
                    pages,
                    self.progress.items_collected(),
                    self.limits.max_listing_items,
                    percent(self.progress.items_collected(), self.limits.max_listing_items)
                );
            }
            if pages >= next_checkpoint {
                next_checkpoint = pages + checkpoint_every;
                if let Err(e) = self.store.checkpoint(&mut sink) {
                    return Err(self.abort(e.into(), &mut sink));
                }
            }
        };

        self.finish(Phase::Listing, stop, &mut sink)
    }

    /// Runs phase 2: visits each record's detail page and persists fields
    pub async fn run_detail(
        mut self,
        renderer: &mut dyn PageRenderer,
        records: Vec<ListingRecord>,
    ) -> Result<CrawlReport, CrawlError> {
        let detail = self.config.detail.clone().ok_or_else(|| {
            ConfigError::Validation("the detail phase needs a [detail] section".to_string())
        })?;
        let extractor = FieldExtractor::new(&detail.fields)?;
        let mut sink = CsvSink::new(
            self.detail_output(),
            CsvLayout::Detail {
                key_column: self.config.output.key_column.clone(),
                columns: extractor.columns(),
                field_names: extractor.names(),
            },
        );

        tracing::info!(
            "Starting detail crawl: {} input records, up to {} results from {} visits",
            records.len(),
            self.limits.max_results,
            self.limits.max_records_to_visit
        );

        let login_url = records
            .first()
            .map(|r| r.detail_ref.clone())
            .unwrap_or_default();
        let mut walker = DetailWalker::new(records, extractor, &self.config.session, self.limits);
        let mut guard = ChallengeGuard::new(self.config.challenge.clone());

        if !self.wait_for_login(renderer, &login_url).await {
            return self.finish(Phase::Detail, StopReason::Cancelled, &mut sink);
        }

        let checkpoint_every = self.config.session.checkpoint_every;
        let mut next_checkpoint = checkpoint_every;

        let stop = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let step = match walker
                .next(renderer, &mut guard, &mut self.progress, &self.cancel)
                .await
            {
                Ok(Some(step)) => step,
                Ok(None) => break walker.stop_reason().unwrap_or(StopReason::Exhausted),
                Err(e) => return Err(self.abort(e, &mut sink)),
            };

            match step {
                DetailStep::Record(record) => {
                    tracing::info!(
                        "Collected '{}' ({}/{})",
                        record.source_key,
                        self.progress.results_collected(),
                        self.limits.max_results
                    );
                    self.store.add_detail(record);
                }
                DetailStep::Dropped { .. } | DetailStep::Skipped { .. } => {}
                DetailStep::Escalated { key, detail_ref } => {
                    tracing::error!(
                        "Challenge did not clear while visiting '{}' ({}), stopping",
                        key,
                        detail_ref
                    );
                    break StopReason::ChallengeEscalated;
                }
            }

            let visited = self.progress.records_visited();
            if visited >= next_checkpoint {
                next_checkpoint = visited + checkpoint_every;
                if let Err(e) = self.store.checkpoint(&mut sink) {
                    return Err(self.abort(e.into(), &mut sink));
                }
            }

            tracing::info!(
                "Progress: {}/{} records visited ({:.1}%), {}/{} results ({:.1}%)",
                self.progress.records_visited(),
                self.limits.max_records_to_visit,
                percent(
                    self.progress.records_visited(),
                    self.limits.max_records_to_visit
                ),
                self.progress.results_collected(),
                self.limits.max_results,
                percent(self.progress.results_collected(), self.limits.max_results)
            );
        };

        self.finish(Phase::Detail, stop, &mut sink)
    }

    fn add_listing(&mut self, record: ListingRecord) {
        tracing::debug!("Listing item '{}': {}", record.key, record.detail_ref);
        let key = record.key.clone();
        let detail_ref = record.detail_ref.clone();
        if let Some(previous) = self.store.add_listing(record) {
            if previous.detail_ref != detail_ref {
                tracing::warn!(
                    "Duplicate key '{}': {} replaces {}",
                    key,
                    detail_ref,
                    previous.detail_ref
                );
            }
        }
    }

    /// Opens the login page and waits for the operator
    ///
    /// Returns `false` when cancelled during the wait.
    async fn wait_for_login(&self, renderer: &mut dyn PageRenderer, default_url: &str) -> bool {
        let session = &self.config.session;
        if !session.login_prompt && session.login_wait_ms == 0 {
            return true;
        }

        let url = session.login_url.as_deref().unwrap_or(default_url);
        if !url.is_empty() {
            if let Err(e) = renderer.navigate(url).await {
                tracing::warn!("Could not open login page {}: {}", url, e);
            }
        }

        if session.login_prompt {
            tracing::info!("Log in if needed, then press Enter to start crawling");
            let mut line = String::new();
            let mut stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                _ = self.cancel.cancelled() => false,
                read = stdin.read_line(&mut line) => {
                    if let Err(e) = read {
                        tracing::warn!("Could not read from stdin: {}", e);
                    }
                    true
                }
            }
        } else {
            tracing::info!(
                "Waiting {}s for login before crawling",
                session.login_wait_ms / 1000
            );
            sleep_or_cancel(Duration::from_millis(session.login_wait_ms), &self.cancel).await
        }
    }

    /// Best-effort final write before surfacing a fatal error
    fn abort(&mut self, error: CrawlError, sink: &mut dyn RecordWriter) -> CrawlError {
        tracing::error!("Crawl failed: {}", error);
        if let Err(e) = self.store.finalize(sink) {
            tracing::error!(
                "Final write to {} also failed: {}",
                sink.location().display(),
                e
            );
        } else {
            tracing::info!("Partial results saved to {}", sink.location().display());
        }
        error
    }

    fn finish(
        mut self,
        phase: Phase,
        stop_reason: StopReason,
        sink: &mut dyn RecordWriter,
    ) -> Result<CrawlReport, CrawlError> {
        self.store.finalize(sink)?;

        let rows_written = match phase {
            Phase::Listing => self.store.listings().len(),
            Phase::Detail => self.store.details().len(),
        };
        tracing::info!(
            "{} crawl finished ({}): {} rows written to {}",
            phase,
            stop_reason,
            rows_written,
            sink.location().display()
        );

        Ok(CrawlReport {
            phase,
            stop_reason,
            progress: self.progress,
            limits: self.limits,
            rows_written,
            checkpoints: self.store.checkpoints(),
            output: Some(sink.location().to_path_buf()),
            config_hash: self.config_hash,
        })
    }
}
