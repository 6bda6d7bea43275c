//! Coalescing reconcile trigger.
//!
//! Any number of `fire` calls between two iterations collapse into a single
//! pending rerun.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TriggerState {
    pending: AtomicBool,
    notify: Notify,
}

/// A cloneable handle used to request a reconcile iteration.
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    state: Arc<TriggerState>,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an iteration. Never blocks.
    pub fn fire(&self) {
        self.state.pending.store(true, Ordering::Release);
        self.state.notify.notify_one();
    }

    /// Consumes the pending flag, returning whether it was set.
    pub fn take_pending(&self) -> bool {
        self.state.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Resolves once a trigger is pending, consuming it.
    pub async fn fired(&self) {
        loop {
            if self.take_pending() {
                return;
            }
            // A wakeup can outlive its flag if `take_pending` already ran.
            self.state.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_triggers_coalesce() {
        let trigger = Trigger::new();
        trigger.fire();
        trigger.fire();
        trigger.fire();
        assert!(trigger.take_pending());
        assert!(!trigger.take_pending());
    }

    #[tokio::test]
    async fn test_fired_resolves_after_fire() {
        let trigger = Trigger::new();
        let remote = trigger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.fire();
        });

        tokio::time::timeout(Duration::from_secs(1), trigger.fired())
            .await
            .unwrap();
        assert!(!trigger.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_wakeup_is_ignored() {
        let trigger = Trigger::new();
        trigger.fire();
        assert!(trigger.take_pending());

        let result = tokio::time::timeout(Duration::from_millis(100), trigger.fired()).await;
        assert!(result.is_err());
    }
}
