//! The reconcile loop driver.
//!
//! Runs iterations back to back on a single task. Triggers that arrive while
//! an iteration is in flight coalesce into one rerun right after it.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::reconciler::Reconciler;
use super::trigger::Trigger;
use crate::status::StatusReporter;

pub struct ReconcileLoop {
    reconciler: Reconciler,
    trigger: Trigger,
    cancel: CancellationToken,
}

impl ReconcileLoop {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            trigger: Trigger::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses an existing trigger, e.g. one already handed to a
    /// [`ConfigWatcher`](crate::config::ConfigWatcher).
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Handle for requesting an immediate iteration.
    pub fn trigger(&self) -> Trigger {
        self.trigger.clone()
    }

    /// Token that stops the loop and cancels any in-flight platform call.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> Arc<StatusReporter> {
        self.reconciler.status()
    }

    /// Runs until cancelled, then hands the reconciler back.
    pub async fn run(mut self) -> Reconciler {
        log::info!(
            "Starting reconcile loop (resync every {:?})",
            self.reconciler.settings().loop_config.resync_interval()
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // This iteration covers every trigger fired so far.
            self.trigger.take_pending();
            let delay = self.reconciler.reconcile_once(&self.cancel).await.next_delay;

            if self.cancel.is_cancelled() {
                break;
            }
            if self.trigger.is_pending() {
                log::debug!("Change arrived during iteration, rerunning");
                continue;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.trigger.fired() => {
                    log::info!("Reconcile triggered by configuration change");
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        log::info!("Reconcile loop stopped");
        self.reconciler
    }

    /// Runs the loop on the current tokio runtime.
    pub fn spawn(self) -> (JoinHandle<Reconciler>, CancellationToken) {
        let cancel = self.cancel_token();
        (tokio::spawn(self.run()), cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InMemoryConfigSource;
    use crate::platform::{InMemoryPlatform, ObjectKind, ObjectRef};
    use crate::settings::OperatorSettings;
    use crate::status::{cluster_operator_ref, ConditionType};
    use crate::tasks::TaskRegistry;
    use std::time::Duration;

    fn reconcile_loop(source: Arc<InMemoryConfigSource>) -> ReconcileLoop {
        reconcile_loop_on(source, Arc::new(InMemoryPlatform::new()))
    }

    fn reconcile_loop_on(
        source: Arc<InMemoryConfigSource>,
        platform: Arc<InMemoryPlatform>,
    ) -> ReconcileLoop {
        let reconciler = Reconciler::new(
            source,
            platform,
            TaskRegistry::standard().unwrap(),
            OperatorSettings::default(),
        );
        ReconcileLoop::new(reconciler)
    }

    fn status_writes(platform: &InMemoryPlatform) -> usize {
        let status_ref = cluster_operator_ref();
        platform
            .apply_requests()
            .iter()
            .filter(|object| **object == status_ref)
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_cancel() {
        let source = Arc::new(InMemoryConfigSource::new(""));
        let (handle, cancel) = reconcile_loop(source).spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let reconciler = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(reconciler.state().has_succeeded());
        assert!(reconciler.status().get(ConditionType::Available).unwrap().is_true());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_runs_iteration_before_resync() {
        let source = Arc::new(InMemoryConfigSource::new(""));
        let reconcile_loop = reconcile_loop(source.clone());
        let trigger = reconcile_loop.trigger();
        let (handle, cancel) = reconcile_loop.spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        source.set_base("prometheusK8s: {logLevel: verbose}");
        trigger.fire();
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let reconciler = handle.await.unwrap();
        // Well before the 15 minute resync, the rejected change is visible.
        assert_eq!(reconciler.state().failure_count, 1);
        assert!(reconciler.status().get(ConditionType::Degraded).unwrap().is_true());
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_during_iteration_coalesce_into_one_rerun() {
        let source = Arc::new(InMemoryConfigSource::new(""));
        let platform = Arc::new(InMemoryPlatform::new());
        let querier = ObjectRef::new(ObjectKind::Deployment, "openshift-monitoring", "thanos-querier");
        platform.stall(querier.clone());

        let reconcile_loop = reconcile_loop_on(source, platform.clone());
        let trigger = reconcile_loop.trigger();
        let (handle, cancel) = reconcile_loop.spawn();

        // The first iteration is now blocked waiting on thanos-querier.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(status_writes(&platform), 0);
        for _ in 0..5 {
            trigger.fire();
        }

        platform.resume(&querier);
        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();

        let reconciler = handle.await.unwrap();
        assert_eq!(status_writes(&platform), 2);
        assert_eq!(reconciler.state().failure_count, 0);
        assert!(!reconciler.status().get(ConditionType::Degraded).unwrap().is_true());
    }
}
