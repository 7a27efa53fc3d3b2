//! Health monitor - classifies adapters as healthy or degraded.
//!
//! An adapter degrades once `failure_threshold` failures land inside
//! `failure_window`, and becomes eligible again when `cooldown` has passed
//! since its last failure or when a call succeeds. Operators can force
//! either state; the override holds until the next recorded outcome.

use tokio::time::Instant;
use tracing::{info, warn};

use super::provider_adapter::ProviderAdapter;
use crate::domain::provider::{HealthPolicy, HealthState, HealthStatus, ProviderError};

/// Applies a [`HealthPolicy`] to adapters' health records.
#[derive(Debug, Clone, Default)]
pub struct HealthMonitor {
    policy: HealthPolicy,
}

impl HealthMonitor {
    pub fn new(policy: HealthPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Records a failed call against the adapter.
    ///
    /// Errors that say nothing about the provider (cancellation, quota,
    /// missing capability) are ignored.
    pub fn record_failure(&self, adapter: &ProviderAdapter, error: &ProviderError) {
        if !error.counts_against_health() {
            return;
        }

        let now = Instant::now();
        let (before, after, failures) = adapter.with_health(|record| {
            let before = record.state(&self.policy, now);
            record.record_failure(&self.policy, now);
            let after = record.state(&self.policy, now);
            (before, after, record.snapshot(adapter.id().clone(), &self.policy, now).failure_count)
        });

        if before.is_healthy() && !after.is_healthy() {
            warn!(
                provider = %adapter.id(),
                failure_count = failures,
                error = %error,
                "provider marked degraded"
            );
        }
    }

    /// Records a successful call. Resets the failure count.
    pub fn record_success(&self, adapter: &ProviderAdapter) {
        let now = Instant::now();
        let before = adapter.with_health(|record| {
            let before = record.state(&self.policy, now);
            record.record_success();
            before
        });

        if !before.is_healthy() {
            info!(provider = %adapter.id(), "provider recovered");
        }
    }

    /// Forces the adapter into the degraded state.
    pub fn mark_degraded(&self, adapter: &ProviderAdapter) {
        adapter.with_health(|record| record.set_override(HealthState::Degraded));
        warn!(provider = %adapter.id(), "provider manually marked degraded");
    }

    /// Forces the adapter back into the healthy state.
    pub fn mark_healthy(&self, adapter: &ProviderAdapter) {
        adapter.with_health(|record| record.set_override(HealthState::Healthy));
        info!(provider = %adapter.id(), "provider manually marked healthy");
    }

    /// Current state of the adapter.
    pub fn state(&self, adapter: &ProviderAdapter) -> HealthState {
        let now = Instant::now();
        adapter.with_health(|record| record.state(&self.policy, now))
    }

    /// Snapshot of the adapter's health.
    pub fn health(&self, adapter: &ProviderAdapter) -> HealthStatus {
        let now = Instant::now();
        adapter.with_health(|record| record.snapshot(adapter.id().clone(), &self.policy, now))
    }
}
