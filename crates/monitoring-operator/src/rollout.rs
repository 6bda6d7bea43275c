//! Polls platform workloads until they finish rolling out.
//!
//! Polling is fixed-interval rather than event driven. Transient
//! observation errors are retried until the deadline; only errors that
//! cannot heal on their own (the target disappeared, the request was
//! refused) end the wait early.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::platform::{ObjectRef, PlatformClient, PlatformError, WorkloadStatus};

/// Delay between two status reads of the same target.
pub const ROLLOUT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest time a single rollout is waited for.
pub const ROLLOUT_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// A workload whose readiness must be confirmed before an iteration counts
/// as successful.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RolloutTarget {
    pub object: ObjectRef,
    pub desired_generation: u64,
}

impl RolloutTarget {
    pub fn new(object: ObjectRef, desired_generation: u64) -> Self {
        Self {
            object,
            desired_generation,
        }
    }
}

impl fmt::Display for RolloutTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.object, self.desired_generation)
    }
}

/// Reasons a rollout wait did not end in readiness.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RolloutError {
    #[error(
        "{target} did not finish rolling out before the deadline{}",
        .last_status.map(|s| format!(" (last status: {s})")).unwrap_or_default()
    )]
    Timeout {
        target: ObjectRef,
        last_status: Option<WorkloadStatus>,
    },

    #[error("Failed to observe {target}: {source}")]
    Observation {
        target: ObjectRef,
        #[source]
        source: PlatformError,
    },

    #[error("Rollout wait cancelled")]
    Cancelled,
}

impl RolloutError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RolloutError::Timeout { .. })
    }
}

/// Result type for rollout waits.
pub type Result<T> = std::result::Result<T, RolloutError>;

/// Waits for rollout targets to become ready.
#[derive(Clone)]
pub struct RolloutWaiter {
    client: Arc<dyn PlatformClient>,
    poll_interval: Duration,
}

impl RolloutWaiter {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self {
            client,
            poll_interval: ROLLOUT_POLL_INTERVAL,
        }
    }

    /// Polls `target` until it is rolled out, `deadline` passes or `cancel`
    /// fires.
    pub async fn wait(
        &self,
        target: &RolloutTarget,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut last_status = None;

        loop {
            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RolloutError::Cancelled),
                observed = tokio::time::timeout_at(deadline, self.client.workload_status(&target.object)) => observed,
            };

            match observed {
                Ok(Ok(status)) => {
                    if status.is_rolled_out(target.desired_generation) {
                        log::debug!("Rollout of {} complete", target);
                        return Ok(());
                    }
                    log::debug!("Rollout of {} in progress: {}", target, status);
                    last_status = Some(status);
                }
                Ok(Err(e)) if e.is_retryable() => {
                    log::warn!("Transient error observing {}: {}", target.object, e);
                }
                Ok(Err(source)) => {
                    return Err(RolloutError::Observation {
                        target: target.object.clone(),
                        source,
                    });
                }
                Err(_elapsed) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RolloutError::Timeout {
                    target: target.object.clone(),
                    last_status,
                });
            }

            let wake = (now + self.poll_interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RolloutError::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Waits for every target concurrently and returns their results in
    /// input order.
    pub async fn wait_all(
        &self,
        targets: &[RolloutTarget],
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<Result<()>> {
        join_all(
            targets
                .iter()
                .map(|target| self.wait(target, deadline, cancel)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DesiredObject, InMemoryPlatform, ObjectKind};
    use serde_json::json;

    async fn setup(name: &str) -> (Arc<InMemoryPlatform>, RolloutTarget) {
        let platform = Arc::new(InMemoryPlatform::new());
        let object = ObjectRef::new(ObjectKind::Deployment, "ns", name);
        let applied = platform
            .apply(&DesiredObject::new(object, json!({"replicas": 2})))
            .await
            .unwrap();
        (platform, RolloutTarget::new(applied.object_ref, applied.generation))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_target() {
        let (platform, target) = setup("a").await;
        let waiter = RolloutWaiter::new(platform);
        let deadline = Instant::now() + ROLLOUT_DEADLINE;

        let result = waiter.wait(&target, deadline, &CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_target_times_out() {
        let (platform, target) = setup("a").await;
        platform.stall(target.object.clone());
        let waiter = RolloutWaiter::new(platform);
        let start = Instant::now();
        let deadline = start + Duration::from_secs(10);

        let err = waiter
            .wait(&target, deadline, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(Instant::now() >= deadline);
        match err {
            RolloutError::Timeout { last_status, .. } => {
                assert_eq!(last_status.map(|s| s.ready_replicas), Some(0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_observation_errors_are_retried() {
        let (platform, target) = setup("a").await;
        platform.fail_observations(target.object.clone(), 3);
        let waiter = RolloutWaiter::new(platform);
        let deadline = Instant::now() + Duration::from_secs(10);

        let result = waiter.wait(&target, deadline, &CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_is_observation_error() {
        let platform = Arc::new(InMemoryPlatform::new());
        let waiter = RolloutWaiter::new(platform);
        let target = RolloutTarget::new(ObjectRef::new(ObjectKind::Deployment, "ns", "gone"), 1);

        let err = waiter
            .wait(&target, Instant::now() + ROLLOUT_DEADLINE, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::Observation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_wait() {
        let (platform, target) = setup("a").await;
        platform.stall(target.object.clone());
        let waiter = RolloutWaiter::new(platform);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = waiter
            .wait(&target, Instant::now() + ROLLOUT_DEADLINE, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, RolloutError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_stalled_wait() {
        let (platform, target) = setup("a").await;
        platform.stall(target.object.clone());
        let waiter = RolloutWaiter::new(platform);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = waiter
            .wait(&target, start + ROLLOUT_DEADLINE, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, RolloutError::Cancelled);
        assert!(start.elapsed() < Duration::from_millis(2500) + ROLLOUT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_all_keeps_input_order() {
        let (platform, ready) = setup("ready").await;
        let stalled_ref = ObjectRef::new(ObjectKind::Deployment, "ns", "stalled");
        platform.stall(stalled_ref.clone());
        let applied = platform
            .apply(&DesiredObject::new(stalled_ref, json!({})))
            .await
            .unwrap();
        let stalled = RolloutTarget::new(applied.object_ref, applied.generation);

        let waiter = RolloutWaiter::new(platform);
        let results = waiter
            .wait_all(
                &[stalled, ready],
                Instant::now() + Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await;
        assert!(results[0].as_ref().unwrap_err().is_timeout());
        assert!(results[1].is_ok());
    }
}
