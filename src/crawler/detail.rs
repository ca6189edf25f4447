//! Detail (phase 2) walker
//!
//! Visits each listing record's detail page in input order, passes the page
//! through the challenge guard and extracts fields. The results cap and the
//! records-visited cap are enforced independently.

use crate::config::SessionConfig;
use crate::crawler::challenge::{ChallengeGuard, GuardOutcome};
use crate::crawler::pacing::{sleep_or_cancel, Pacer};
use crate::crawler::StopReason;
use crate::extract::{DetailRecord, FieldExtractor};
use crate::render::PageRenderer;
use crate::state::{CrawlLimits, CrawlProgress};
use crate::storage::ListingRecord;
use crate::CrawlError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What happened to one input record
#[derive(Debug)]
pub enum DetailStep {
    /// Fields were extracted
    Record(DetailRecord),

    /// A required field was missing; no record was produced
    Dropped { key: String, detail_ref: String },

    /// Every attempt failed
    Skipped {
        key: String,
        detail_ref: String,
        error: CrawlError,
    },

    /// The challenge guard gave up on this record
    Escalated { key: String, detail_ref: String },
}

enum Visit {
    Extracted(Option<Vec<(String, String)>>),
    Escalated,
    Cancelled,
}

/// Pull-based walker over a list of detail references
pub struct DetailWalker {
    records: VecDeque<ListingRecord>,
    extractor: FieldExtractor,
    limits: CrawlLimits,
    retries: u32,
    retry_delay: Duration,
    pacer: Pacer,
    stop: Option<StopReason>,
}

impl DetailWalker {
    pub fn new(
        records: Vec<ListingRecord>,
        extractor: FieldExtractor,
        session: &SessionConfig,
        limits: CrawlLimits,
    ) -> Self {
        Self {
            records: records.into(),
            extractor,
            limits,
            retries: session.retries,
            retry_delay: Duration::from_millis(session.retry_delay_ms),
            pacer: Pacer::from_millis(session.pacing_ms),
            stop: None,
        }
    }

    /// Input records not yet visited
    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    /// Why the walk ended, once it has
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Processes the next input record
    ///
    /// Returns `Ok(None)` once the walk is over. Only a broken guard state
    /// machine or a renderer lacking a needed capability is an error;
    /// per-record failures come back as [`DetailStep::Skipped`].
    pub async fn next(
        &mut self,
        renderer: &mut dyn PageRenderer,
        guard: &mut ChallengeGuard,
        progress: &mut CrawlProgress,
        cancel: &CancellationToken,
    ) -> Result<Option<DetailStep>, CrawlError> {
        if self.stop.is_some() {
            return Ok(None);
        }

        if progress.results_cap_reached(&self.limits) {
            if self.limits.max_results == 0 {
                tracing::warn!("max-results is 0, nothing to collect");
            } else {
                tracing::info!("Results cap of {} reached", self.limits.max_results);
            }
            return self.finish(StopReason::ResultCapReached);
        }
        if progress.visit_cap_reached(&self.limits) {
            if self.limits.max_records_to_visit == 0 {
                tracing::warn!("max-records-to-visit is 0, nothing to visit");
            } else {
                tracing::info!(
                    "Visit cap of {} records reached",
                    self.limits.max_records_to_visit
                );
            }
            return self.finish(StopReason::VisitCapReached);
        }

        if self.records.is_empty() {
            tracing::info!("All input records visited");
            return self.finish(StopReason::Exhausted);
        }

        if cancel.is_cancelled() || !self.pacer.wait(cancel).await {
            return self.finish(StopReason::Cancelled);
        }

        let Some(record) = self.records.pop_front() else {
            return self.finish(StopReason::Exhausted);
        };
        progress.record_visit();

        let attempts = self.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.visit(renderer, guard, progress, cancel, &record).await {
                Ok(Visit::Extracted(Some(fields))) => {
                    progress.record_result();
                    return Ok(Some(DetailStep::Record(DetailRecord::new(
                        record.key, fields,
                    ))));
                }
                Ok(Visit::Extracted(None)) => {
                    progress.record_skip();
                    tracing::info!(
                        "Dropping '{}' ({}): required field missing",
                        record.key,
                        record.detail_ref
                    );
                    return Ok(Some(DetailStep::Dropped {
                        key: record.key,
                        detail_ref: record.detail_ref,
                    }));
                }
                Ok(Visit::Escalated) => {
                    self.stop = Some(StopReason::ChallengeEscalated);
                    return Ok(Some(DetailStep::Escalated {
                        key: record.key,
                        detail_ref: record.detail_ref,
                    }));
                }
                Ok(Visit::Cancelled) => return self.finish(StopReason::Cancelled),
                Err(e @ CrawlError::InvalidTransition { .. }) => return Err(e),
                Err(CrawlError::Render(e)) if !e.is_retryable() => {
                    return Err(CrawlError::Render(e));
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "Visiting '{}' ({}) failed (attempt {}/{}): {}, retrying",
                        record.key,
                        record.detail_ref,
                        attempt,
                        attempts,
                        e
                    );
                    if !sleep_or_cancel(self.retry_delay, cancel).await {
                        return self.finish(StopReason::Cancelled);
                    }
                }
                Err(error) => {
                    progress.record_skip();
                    tracing::warn!(
                        "Skipping '{}' ({}) after {} attempts: {}",
                        record.key,
                        record.detail_ref,
                        attempts,
                        error
                    );
                    return Ok(Some(DetailStep::Skipped {
                        key: record.key,
                        detail_ref: record.detail_ref,
                        error,
                    }));
                }
            }
        }
    }

    fn finish(&mut self, reason: StopReason) -> Result<Option<DetailStep>, CrawlError> {
        self.stop = Some(reason);
        Ok(None)
    }

    async fn visit(
        &self,
        renderer: &mut dyn PageRenderer,
        guard: &mut ChallengeGuard,
        progress: &mut CrawlProgress,
        cancel: &CancellationToken,
        record: &ListingRecord,
    ) -> Result<Visit, CrawlError> {
        tracing::debug!("Visiting '{}': {}", record.key, record.detail_ref);
        renderer.navigate(&record.detail_ref).await?;
        renderer.wait_until_ready().await?;

        match guard
            .check(renderer, Some(record.detail_ref.as_str()), progress, cancel)
            .await?
        {
            GuardOutcome::Clear => {}
            GuardOutcome::Escalated => return Ok(Visit::Escalated),
            GuardOutcome::Cancelled => return Ok(Visit::Cancelled),
        }

        let fields = self.extractor.extract(renderer).await?;
        Ok(Visit::Extracted(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::challenge::tests::{challenge_config, CHALLENGE};
    use crate::extract::{FieldSpec, ReadRule, SelectorRule, Transform};
    use crate::render::fake::FakeRenderer;

    fn detail_url(n: u32) -> String {
        format!("https://jobs.example.com/detail/{n}")
    }

    fn detail_html(company: &str, email: Option<&str>) -> String {
        let email = email
            .map(|e| format!("<a class=\"devChargeEmail\">Contact: {e}</a>"))
            .unwrap_or_default();
        format!("<html><body><h3 class=\"hd_3\">{company}</h3>{email}</body></html>")
    }

    fn specs(email_required: bool) -> Vec<FieldSpec> {
        vec![
            FieldSpec {
                name: "company".to_string(),
                column: Some("Company".to_string()),
                required: false,
                rule: SelectorRule::Css("h3.hd_3".to_string()),
                read: ReadRule {
                    transforms: vec![Transform::Trim],
                    ..Default::default()
                },
            },
            FieldSpec {
                name: "email".to_string(),
                column: None,
                required: email_required,
                rule: SelectorRule::Css("a.devChargeEmail".to_string()),
                read: ReadRule {
                    transforms: vec![Transform::Email],
                    ..Default::default()
                },
            },
        ]
    }

    fn inputs(n: u32) -> Vec<ListingRecord> {
        (1..=n)
            .map(|i| ListingRecord::new(format!("Company {i}"), detail_url(i)))
            .collect()
    }

    fn walker(records: Vec<ListingRecord>, limits: CrawlLimits, email_required: bool) -> DetailWalker {
        let session = SessionConfig {
            pacing_ms: 0,
            retry_delay_ms: 0,
            ..Default::default()
        };
        let extractor = FieldExtractor::new(&specs(email_required)).unwrap();
        DetailWalker::new(records, extractor, &session, limits)
    }

    fn five_details() -> FakeRenderer {
        (1..=5).fold(FakeRenderer::new(), |renderer, i| {
            renderer.page(
                &detail_url(i),
                &detail_html(&format!("Company {i}"), Some(&format!("hr{i}@example.com"))),
            )
        })
    }

    async fn run(
        walker: &mut DetailWalker,
        renderer: &mut FakeRenderer,
        guard: &mut ChallengeGuard,
        progress: &mut CrawlProgress,
    ) -> Vec<DetailStep> {
        let cancel = CancellationToken::new();
        let mut steps = Vec::new();
        while let Some(step) = walker
            .next(renderer, guard, progress, &cancel)
            .await
            .unwrap()
        {
            assert!(progress.results_collected() <= walker.limits.max_results);
            assert!(progress.records_visited() <= walker.limits.max_records_to_visit);
            steps.push(step);
        }
        steps
    }

    fn record_keys(steps: &[DetailStep]) -> Vec<&str> {
        steps
            .iter()
            .filter_map(|step| match step {
                DetailStep::Record(record) => Some(record.source_key.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_visits_all_records_in_order() {
        let mut renderer = five_details();
        let mut walker = walker(inputs(5), CrawlLimits::default(), false);
        let mut progress = CrawlProgress::new();

        let steps = run(
            &mut walker,
            &mut renderer,
            &mut ChallengeGuard::new(None),
            &mut progress,
        )
        .await;

        assert_eq!(
            record_keys(&steps),
            vec!["Company 1", "Company 2", "Company 3", "Company 4", "Company 5"]
        );
        match &steps[1] {
            DetailStep::Record(record) => {
                assert_eq!(record.get("company"), Some("Company 2"));
                assert_eq!(record.get("email"), Some("hr2@example.com"));
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(walker.stop_reason(), Some(StopReason::Exhausted));
        assert_eq!(progress.records_visited(), 5);
        assert_eq!(progress.results_collected(), 5);
    }

    #[tokio::test]
    async fn test_challenged_record_extracted_after_clear() {
        let third = detail_url(3);
        let mut renderer = FakeRenderer::new()
            .page(&detail_url(1), &detail_html("Company 1", None))
            .page(&detail_url(2), &detail_html("Company 2", None))
            .page(&third, CHALLENGE)
            .page(&third, CHALLENGE)
            .page(&third, &detail_html("Company 3", Some("ceo@three.example")))
            .page(&detail_url(4), &detail_html("Company 4", None))
            .page(&detail_url(5), &detail_html("Company 5", None));
        let mut guard = ChallengeGuard::new(Some(challenge_config(60_000)));
        let mut walker = walker(inputs(5), CrawlLimits::default(), false);
        let mut progress = CrawlProgress::new();

        let steps = run(&mut walker, &mut renderer, &mut guard, &mut progress).await;

        assert_eq!(record_keys(&steps).len(), 5);
        match &steps[2] {
            DetailStep::Record(record) => {
                assert_eq!(record.get("company"), Some("Company 3"));
                assert_eq!(record.get("email"), Some("ceo@three.example"));
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(
            renderer.log,
            vec![
                format!("navigate {}", detail_url(1)),
                format!("navigate {}", detail_url(2)),
                format!("navigate {third}"),
                format!("refresh {third}"),
                format!("refresh {third}"),
                format!("navigate {}", detail_url(4)),
                format!("navigate {}", detail_url(5)),
            ]
        );
        assert_eq!(progress.challenges_seen(), 1);
    }

    #[tokio::test]
    async fn test_redirect_to_interstitial_reads_requested_page() {
        let verify = "https://jobs.example.com/verify";
        let mut renderer = FakeRenderer::new()
            .redirect(&detail_url(1), verify, 1)
            .page(verify, CHALLENGE)
            .page(verify, "<html><body><p>Verified</p></body></html>")
            .page(
                &detail_url(1),
                &detail_html("Company 1", Some("hr@one.example")),
            );
        let mut guard = ChallengeGuard::new(Some(challenge_config(60_000)));
        let mut walker = walker(inputs(1), CrawlLimits::default(), true);
        let mut progress = CrawlProgress::new();

        let steps = run(&mut walker, &mut renderer, &mut guard, &mut progress).await;

        assert_eq!(record_keys(&steps), vec!["Company 1"]);
        match &steps[0] {
            DetailStep::Record(record) => {
                assert_eq!(record.get("email"), Some("hr@one.example"));
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(progress.challenges_seen(), 1);
        assert_eq!(progress.records_skipped(), 0);
        let first = detail_url(1);
        assert_eq!(renderer.navigations(), vec![first.as_str(), first.as_str()]);
    }

    #[tokio::test]
    async fn test_results_cap() {
        let mut renderer = five_details();
        let limits = CrawlLimits {
            max_results: 2,
            ..Default::default()
        };
        let mut walker = walker(inputs(5), limits, false);
        let mut progress = CrawlProgress::new();

        let steps = run(
            &mut walker,
            &mut renderer,
            &mut ChallengeGuard::new(None),
            &mut progress,
        )
        .await;
        assert_eq!(record_keys(&steps), vec!["Company 1", "Company 2"]);
        assert_eq!(walker.stop_reason(), Some(StopReason::ResultCapReached));
        assert_eq!(renderer.navigations().len(), 2);
        assert_eq!(walker.remaining(), 3);
    }

    #[tokio::test]
    async fn test_visit_cap_counts_dropped_records() {
        let mut renderer = FakeRenderer::new()
            .page(&detail_url(1), &detail_html("Company 1", None))
            .page(&detail_url(2), &detail_html("Company 2", Some("a@two.example")))
            .page(&detail_url(3), &detail_html("Company 3", None))
            .page(&detail_url(4), &detail_html("Company 4", Some("a@four.example")));
        let limits = CrawlLimits {
            max_records_to_visit: 3,
            ..Default::default()
        };
        let mut walker = walker(inputs(4), limits, true);
        let mut progress = CrawlProgress::new();

        let steps = run(
            &mut walker,
            &mut renderer,
            &mut ChallengeGuard::new(None),
            &mut progress,
        )
        .await;

        assert_eq!(steps.len(), 3);
        assert!(matches!(&steps[0], DetailStep::Dropped { key, .. } if key == "Company 1"));
        assert_eq!(record_keys(&steps), vec!["Company 2"]);
        assert_eq!(walker.stop_reason(), Some(StopReason::VisitCapReached));
        assert_eq!(progress.records_visited(), 3);
        assert_eq!(progress.records_skipped(), 2);
    }

    #[tokio::test]
    async fn test_failed_record_is_skipped_after_retry() {
        let mut renderer = five_details().failing(&detail_url(2), 2);
        let mut walker = walker(inputs(3), CrawlLimits::default(), false);
        let mut progress = CrawlProgress::new();

        let steps = run(
            &mut walker,
            &mut renderer,
            &mut ChallengeGuard::new(None),
            &mut progress,
        )
        .await;

        assert_eq!(steps.len(), 3);
        assert!(matches!(
            &steps[1],
            DetailStep::Skipped { key, error: CrawlError::Render(_), .. } if key == "Company 2"
        ));
        assert_eq!(record_keys(&steps), vec!["Company 1", "Company 3"]);
        assert_eq!(progress.records_visited(), 3);
        assert_eq!(progress.records_skipped(), 1);
    }

    #[tokio::test]
    async fn test_escalation_stops_walk() {
        let mut renderer = FakeRenderer::new()
            .page(&detail_url(1), &detail_html("Company 1", None))
            .page(&detail_url(2), CHALLENGE)
            .page(&detail_url(3), &detail_html("Company 3", None));
        let mut guard = ChallengeGuard::new(Some(challenge_config(10)));
        let mut walker = walker(inputs(3), CrawlLimits::default(), false);
        let mut progress = CrawlProgress::new();

        let steps = run(&mut walker, &mut renderer, &mut guard, &mut progress).await;

        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[1], DetailStep::Escalated { key, .. } if key == "Company 2"));
        assert_eq!(walker.stop_reason(), Some(StopReason::ChallengeEscalated));
        assert!(!renderer.navigations().contains(&detail_url(3).as_str()));
    }

    #[tokio::test]
    async fn test_zero_visit_cap_makes_no_requests() {
        let mut renderer = five_details();
        let limits = CrawlLimits {
            max_records_to_visit: 0,
            ..Default::default()
        };
        let mut walker = walker(inputs(5), limits, false);

        let steps = run(
            &mut walker,
            &mut renderer,
            &mut ChallengeGuard::new(None),
            &mut CrawlProgress::new(),
        )
        .await;
        assert!(steps.is_empty());
        assert!(renderer.log.is_empty());
        assert_eq!(walker.stop_reason(), Some(StopReason::VisitCapReached));
    }
}
