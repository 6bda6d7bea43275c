//! State owned by the reconcile loop.

use chrono::{DateTime, Utc};

use crate::config::ValidatedConfig;

/// Last-known-good configuration and failure bookkeeping.
///
/// Only a fully successful iteration updates `last_applied_config` and
/// `last_success`.
#[derive(Debug, Clone, Default)]
pub struct ReconcileState {
    pub last_applied_config: Option<ValidatedConfig>,
    pub last_success: Option<DateTime<Utc>>,
    /// Consecutive failed iterations.
    pub failure_count: u32,
}

impl ReconcileState {
    pub fn record_success(&mut self, config: ValidatedConfig, at: DateTime<Utc>) {
        self.last_applied_config = Some(config);
        self.last_success = Some(at);
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
    }

    pub fn has_succeeded(&self) -> bool {
        self.last_success.is_some()
    }
}
