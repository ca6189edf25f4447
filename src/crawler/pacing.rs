//! Cancellable delays and request pacing
//!
//! Every suspension point in a crawl (login wait, pacing, retry delay,
//! challenge polling) goes through [`sleep_or_cancel`] so that a cancellation
//! request is honored within one tick.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless `cancel` fires first
///
/// # Returns
///
/// * `true` - the full duration elapsed
/// * `false` - the token was cancelled
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Enforces a minimum interval between consecutive requests
///
/// The first request is never delayed. Later requests wait for whatever is
/// left of the interval since the previous one.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_request: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Time left before the next request may go out
    pub fn remaining(&self) -> Duration {
        match self.last_request {
            Some(last) => (last + self.interval).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Waits out the interval, then marks a request as started
    ///
    /// Returns `false` when cancelled; the request is then not recorded.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            tracing::trace!("Pacing: waiting {:?} before next request", remaining);
        }
        if !sleep_or_cancel(remaining, cancel).await {
            return false;
        }
        self.last_request = Some(Instant::now());
        true
    }
}
