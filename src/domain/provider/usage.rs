//! Usage counters reported per provider.

use serde::Serialize;

use crate::domain::foundation::Timestamp;

/// Snapshot of a provider's consumption.
///
/// `total_tokens` and `request_count` never reset; only the rate window rolls over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub total_tokens: u64,
    pub request_count: u64,
    pub failed_request_count: u64,
    /// Requests admitted in the current rate window.
    pub window_request_count: u32,
    /// Start of the current rate window, once one has opened.
    pub window_started_at: Option<Timestamp>,
}

impl UsageStats {
    /// Requests that completed successfully.
    pub fn successful_request_count(&self) -> u64 {
        self.request_count.saturating_sub(self.failed_request_count)
    }
}
