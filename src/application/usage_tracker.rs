//! Per-adapter usage accounting, quota enforcement and throttling.
//!
//! Counters are atomics so concurrent calls never lose increments. The rate
//! window is a fixed window that opens with the first admitted request.
//! Callers over budget wait on a fair async mutex until the window rolls
//! over, so they are admitted in arrival order. Waiting honors cancellation.

use chrono::DateTime;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::foundation::{ProviderId, Timestamp};
use crate::domain::provider::{ProviderError, UsageStats};

const RATE_WINDOW: Duration = Duration::from_secs(60);
const NO_WINDOW: i64 = i64::MIN;

/// State for the current rate window.
#[derive(Debug, Default)]
struct WindowState {
    /// Requests admitted in the current window.
    count: u32,
    /// When the current window opened.
    started: Option<Instant>,
}

/// Tracks tokens, requests and the request-rate window for one adapter.
#[derive(Debug)]
pub struct UsageTracker {
    provider: ProviderId,
    total_tokens: AtomicU64,
    request_count: AtomicU64,
    failed_request_count: AtomicU64,
    quota_limit: Option<u64>,
    requests_per_window: Option<u32>,
    window: Mutex<WindowState>,
    // Lock-free mirror of the window for `stats()`.
    window_count: AtomicU32,
    window_started_ms: AtomicI64,
}

impl UsageTracker {
    /// Creates a tracker with no quota and no rate limit.
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            total_tokens: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
            failed_request_count: AtomicU64::new(0),
            quota_limit: None,
            requests_per_window: None,
            window: Mutex::new(WindowState::default()),
            window_count: AtomicU32::new(0),
            window_started_ms: AtomicI64::new(NO_WINDOW),
        }
    }

    /// Sets the cumulative token ceiling.
    pub fn with_quota_limit(mut self, limit: Option<u64>) -> Self {
        self.quota_limit = limit;
        self
    }

    /// Sets the number of requests admitted per minute.
    pub fn with_requests_per_minute(mut self, rpm: Option<u32>) -> Self {
        self.requests_per_window = rpm;
        self
    }

    /// Fails with `QuotaExceeded` if the quota is used up, or if `max_tokens`
    /// would take usage past it.
    pub fn check_quota(&self, max_tokens: Option<u32>) -> Result<(), ProviderError> {
        let Some(limit) = self.quota_limit else {
            return Ok(());
        };

        let used = self.total_tokens.load(Ordering::SeqCst);
        if used >= limit {
            return Err(ProviderError::QuotaExceeded { used, limit });
        }

        if let Some(max) = max_tokens {
            let projected = used.saturating_add(u64::from(max));
            if projected > limit {
                return Err(ProviderError::QuotaExceeded {
                    used: projected,
                    limit,
                });
            }
        }
        Ok(())
    }

    /// Waits for a slot in the rate window.
    ///
    /// Returns `Cancelled` if the token fires while waiting; in that case no
    /// slot is consumed.
    pub async fn acquire_slot(&self, cancel: &CancellationToken) -> Result<(), ProviderError> {
        let Some(limit) = self.requests_per_window else {
            return Ok(());
        };

        let mut window = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            guard = self.window.lock() => guard,
        };

        loop {
            let now = Instant::now();
            let expired = window
                .started
                .map(|started| now.duration_since(started) >= RATE_WINDOW)
                .unwrap_or(true);
            if expired {
                window.count = 0;
                window.started = Some(now);
                self.window_started_ms
                    .store(Timestamp::now().as_datetime().timestamp_millis(), Ordering::SeqCst);
            }

            if window.count < limit {
                window.count += 1;
                self.window_count.store(window.count, Ordering::SeqCst);
                return Ok(());
            }

            let reopens_at = window.started.unwrap_or(now) + RATE_WINDOW;
            debug!(
                provider = %self.provider,
                wait_ms = reopens_at.saturating_duration_since(now).as_millis() as u64,
                "request rate exhausted, waiting for next window"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = sleep_until(reopens_at) => {}
            }
        }
    }

    /// Records a completed call.
    pub fn record_success(&self, tokens: u32) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.total_tokens.fetch_add(u64::from(tokens), Ordering::SeqCst);
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.failed_request_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> UsageStats {
        let started_ms = self.window_started_ms.load(Ordering::SeqCst);
        let window_started_at = (started_ms != NO_WINDOW)
            .then(|| DateTime::from_timestamp_millis(started_ms))
            .flatten()
            .map(Timestamp::from_datetime);

        UsageStats {
            total_tokens: self.total_tokens.load(Ordering::SeqCst),
            request_count: self.request_count.load(Ordering::SeqCst),
            failed_request_count: self.failed_request_count.load(Ordering::SeqCst),
            window_request_count: self.window_count.load(Ordering::SeqCst),
            window_started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tracker() -> UsageTracker {
        UsageTracker::new(ProviderId::new("openai"))
    }

    #[test]
    fn records_successes_and_failures() {
        let tracker = tracker();
        tracker.record_success(10);
        tracker.record_success(5);
        tracker.record_failure();

        let stats = tracker.stats();
        assert_eq!(stats.total_tokens, 15);
        assert_eq!(stats.request_count, 3);
        assert_eq!(stats.failed_request_count, 1);
        assert!(stats.window_started_at.is_none());
    }

    #[test]
    fn quota_rejects_when_used_up() {
        let tracker = tracker().with_quota_limit(Some(100));
        tracker.record_success(100);

        assert_eq!(
            tracker.check_quota(None),
            Err(ProviderError::QuotaExceeded { used: 100, limit: 100 })
        );
    }

    #[test]
    fn quota_projects_max_tokens() {
        let tracker = tracker().with_quota_limit(Some(1000));
        tracker.record_success(950);

        assert!(tracker.check_quota(Some(50)).is_ok());
        assert_eq!(
            tracker.check_quota(Some(100)),
            Err(ProviderError::QuotaExceeded { used: 1050, limit: 1000 })
        );
    }

    #[test]
    fn no_quota_means_unlimited() {
        let tracker = tracker();
        tracker.record_success(u32::MAX);
        assert!(tracker.check_quota(Some(u32::MAX)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_then_waits_for_next_window() {
        let tracker = tracker().with_requests_per_minute(Some(2));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        tracker.acquire_slot(&cancel).await.unwrap();
        tracker.acquire_slot(&cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(tracker.stats().window_request_count, 2);

        tracker.acquire_slot(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(tracker.stats().window_request_count, 1);
        assert!(tracker.stats().window_started_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_is_cancellable() {
        let tracker = tracker().with_requests_per_minute(Some(1));
        let cancel = CancellationToken::new();
        tracker.acquire_slot(&cancel).await.unwrap();

        let waiter_token = cancel.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            waiter_token.cancel();
        });

        let start = Instant::now();
        let result = tracker.acquire_slot(&cancel).await;
        canceller.await.unwrap();

        assert_eq!(result, Err(ProviderError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_admitted_in_arrival_order() {
        let tracker = Arc::new(tracker().with_requests_per_minute(Some(1)));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        tracker.acquire_slot(&CancellationToken::new()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..3 {
            let tracker = tracker.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                tracker.acquire_slot(&CancellationToken::new()).await.unwrap();
                order.lock().unwrap().push(i);
            }));
            // Let each waiter queue up before spawning the next.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn concurrent_records_are_not_lost() {
        let tracker = Arc::new(tracker());
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.record_success(3) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = tracker.stats();
        assert_eq!(stats.request_count, 50);
        assert_eq!(stats.total_tokens, 150);
    }
}
