//! Health classification for a single provider.
//!
//! A provider is Healthy until failures inside the rolling window reach the
//! threshold. It stays Degraded until a success is recorded or the cool-down
//! passes without another failure. Manual overrides win until the next
//! recorded outcome.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::foundation::{ProviderId, Timestamp};

/// Coarse health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
}

impl HealthState {
    /// Returns true for `Healthy`.
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

/// Thresholds that drive the Healthy/Degraded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Failures inside the window that flip a provider to Degraded.
    pub failure_threshold: u32,
    /// Rolling window for counting failures.
    pub failure_window: Duration,
    /// Quiet period after the last failure before a provider recovers on its own.
    pub cooldown: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Read-only health snapshot handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub provider: ProviderId,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    pub last_failure_at: Option<Timestamp>,
    pub state: HealthState,
    /// Operator override in effect, if any.
    pub manual_override: Option<HealthState>,
}

#[derive(Debug, Clone, Copy)]
struct LastFailure {
    at: Timestamp,
    instant: Instant,
}

/// Mutable health record for one provider.
#[derive(Debug, Clone, Default)]
pub struct HealthRecord {
    failure_count: u32,
    recent_failures: VecDeque<Instant>,
    last_failure: Option<LastFailure>,
    manual_override: Option<HealthState>,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed call.
    pub fn record_failure(&mut self, policy: &HealthPolicy, now: Instant) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.prune(policy, now);
        self.recent_failures.push_back(now);
        self.last_failure = Some(LastFailure {
            at: Timestamp::now(),
            instant: now,
        });
        self.manual_override = None;
    }

    /// Records a successful call. Clears the failure history.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.recent_failures.clear();
        self.manual_override = None;
    }

    /// Forces the state until the next recorded outcome.
    pub fn set_override(&mut self, state: HealthState) {
        if state.is_healthy() {
            self.recent_failures.clear();
        }
        self.manual_override = Some(state);
    }

    /// Computes the current state.
    pub fn state(&self, policy: &HealthPolicy, now: Instant) -> HealthState {
        if let Some(state) = self.manual_override {
            return state;
        }

        let recent = self
            .recent_failures
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= policy.failure_window)
            .count();

        let cooling = self
            .last_failure
            .map(|last| now.saturating_duration_since(last.instant) < policy.cooldown)
            .unwrap_or(false);

        if recent >= policy.failure_threshold as usize && cooling {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        }
    }

    /// Returns the wall-clock time of the last failure.
    pub fn last_failure_at(&self) -> Option<Timestamp> {
        self.last_failure.map(|last| last.at)
    }

    /// Builds a snapshot for callers.
    pub fn snapshot(&self, provider: ProviderId, policy: &HealthPolicy, now: Instant) -> HealthStatus {
        HealthStatus {
            provider,
            failure_count: self.failure_count,
            last_failure_at: self.last_failure_at(),
            state: self.state(policy, now),
            manual_override: self.manual_override,
        }
    }

    fn prune(&mut self, policy: &HealthPolicy, now: Instant) {
        while let Some(oldest) = self.recent_failures.front() {
            if now.saturating_duration_since(*oldest) > policy.failure_window {
                self.recent_failures.pop_front();
            } else {
                break;
            }
        }
    }
}
