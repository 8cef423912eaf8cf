//! Background token refresh
//!
//! Spawns a periodic task that keeps the session's pair fresh. The default
//! policy refreshes unconditionally every hour. The expiry-aware policy
//! refreshes only when the access token is close to expiring, and retries
//! failures after a jittered backoff.

use std::sync::Arc;
use std::time::Duration;

use rand::RngExt;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::session::{RefreshOutcome, Session};

/// Interval of the unconditional refresh (3 600 000 ms).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(3_600_000);

/// Ceiling for a single retry backoff before jitter.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// When and how the background task refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Refresh on every tick regardless of token lifetime. No retry.
    Fixed { interval: Duration },
    /// Check on every tick, refresh when the access token expires within
    /// `threshold`, retry up to `max_retries` times on transient failure.
    ExpiryAware {
        check_interval: Duration,
        threshold: Duration,
        retry_base: Duration,
        max_retries: u32,
    },
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        RefreshPolicy::Fixed {
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl RefreshPolicy {
    fn period(&self) -> Duration {
        match self {
            RefreshPolicy::Fixed { interval } => *interval,
            RefreshPolicy::ExpiryAware { check_interval, .. } => *check_interval,
        }
    }
}

/// Spawn the background refresh task for the lifetime of the process.
///
/// The first tick fires one period after spawn. Returns a `JoinHandle` so
/// the caller can abort it on shutdown.
pub fn spawn_refresh_task(
    session: Arc<Session>,
    policy: RefreshPolicy,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = policy.period();
        info!(period_secs = period.as_secs(), ?policy, "token refresh task started");
        let mut ticker = tokio::time::interval(period);
        // Skip the immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match &policy {
                RefreshPolicy::Fixed { .. } => {
                    if refresh_once(&session).await == Attempt::Retryable {
                        debug!("fixed policy does not retry, waiting for next tick");
                    }
                }
                RefreshPolicy::ExpiryAware {
                    threshold,
                    retry_base,
                    max_retries,
                    ..
                } => {
                    if !session.expires_within(*threshold).await {
                        debug!("access token not near expiry, skipping refresh");
                        continue;
                    }
                    refresh_with_retry(&session, *retry_base, *max_retries).await;
                }
            }
        }
    })
}

/// How a single refresh attempt ended, from the scheduler's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Refreshed, skipped, or rejected for good. Nothing to retry.
    Settled,
    /// Transient failure (transport, timeout, 5xx).
    Retryable,
}

/// Run one refresh, log the result and count it.
async fn refresh_once(session: &Session) -> Attempt {
    match session.refresh().await {
        Ok(RefreshOutcome::Refreshed) => {
            record_refresh("refreshed");
            Attempt::Settled
        }
        Ok(RefreshOutcome::Skipped) => {
            record_refresh("skipped");
            Attempt::Settled
        }
        Err(Error::RefreshRejected(msg)) => {
            record_refresh("rejected");
            warn!(error = %msg, "refresh token rejected, re-authorization required");
            Attempt::Settled
        }
        Err(e) => {
            record_refresh("failed");
            warn!(error = %e, "background token refresh failed");
            Attempt::Retryable
        }
    }
}

async fn refresh_with_retry(session: &Session, retry_base: Duration, max_retries: u32) {
    for attempt in 0..=max_retries {
        if refresh_once(session).await == Attempt::Settled {
            return;
        }
        if attempt < max_retries {
            let delay = jittered_delay(retry_base, attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying token refresh");
            tokio::time::sleep(delay).await;
        }
    }
    warn!(max_retries, "token refresh retries exhausted, waiting for next check");
}

/// Exponential backoff with ±25% jitter: `base * 2^attempt * U(0.75, 1.25)`.
///
/// The nominal delay is capped at `MAX_RETRY_DELAY` before jitter.
pub fn jittered_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base
        .checked_mul(1u32 << attempt.min(16))
        .map_or(MAX_RETRY_DELAY, |d| d.min(MAX_RETRY_DELAY));
    let factor: f64 = rand::rng().random_range(0.75..=1.25);
    Duration::try_from_secs_f64(exp.as_secs_f64() * factor).unwrap_or(MAX_RETRY_DELAY)
}

fn record_refresh(outcome: &'static str) {
    metrics::counter!("gateway_token_refresh_total", "outcome" => outcome).increment(1);
}
