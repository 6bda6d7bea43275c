//! One reconcile iteration: Validate → Apply → Wait → Report.
//!
//! The reconciler owns [`ReconcileState`]; nothing else mutates it. Config
//! errors short-circuit before any object is touched, so a bad document
//! never disturbs what an earlier iteration rolled out. Apply is fail-fast
//! but keeps whatever earlier tasks already submitted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::backoff::Backoff;
use super::state::ReconcileState;
use crate::config::{ConfigLoader, ConfigSource, ValidatedConfig};
use crate::platform::{PlatformClient, PlatformError};
use crate::rollout::{RolloutError, RolloutTarget, RolloutWaiter, ROLLOUT_DEADLINE};
use crate::settings::OperatorSettings;
use crate::status::{cluster_operator_object, Condition, IterationOutcome, StatusReporter};
use crate::tasks::{ComponentTask, TaskContext, TaskRegistry};

/// Retries of a single platform call after a retryable error.
pub const APPLY_MAX_RETRIES: u32 = 3;
/// Delay before the first retry; doubles on each further attempt.
pub const APPLY_RETRY_BASE: Duration = Duration::from_millis(200);

/// Where the reconciler currently is within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Validating,
    Applying,
    Waiting,
    Reporting,
}

/// Summary of one finished iteration.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub id: Uuid,
    pub outcome: IterationOutcome,
    /// Platform objects created, changed or deleted by this iteration.
    pub mutations: usize,
    /// How long the loop should wait before the next periodic iteration.
    pub next_delay: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Rollout targets collected during Applying, tagged with their task.
type PendingRollouts = Vec<(String, RolloutTarget)>;

pub struct Reconciler {
    source: Arc<dyn ConfigSource>,
    client: Arc<dyn PlatformClient>,
    loader: ConfigLoader,
    registry: TaskRegistry,
    waiter: RolloutWaiter,
    status: Arc<StatusReporter>,
    settings: OperatorSettings,
    state: ReconcileState,
    backoff: Backoff,
    phase: Phase,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn ConfigSource>,
        client: Arc<dyn PlatformClient>,
        registry: TaskRegistry,
        settings: OperatorSettings,
    ) -> Self {
        let backoff = Backoff::new(
            settings.loop_config.min_backoff(),
            settings.loop_config.max_backoff(),
        );
        Self {
            source,
            waiter: RolloutWaiter::new(Arc::clone(&client)),
            client,
            loader: ConfigLoader::new(),
            registry,
            status: Arc::new(StatusReporter::new()),
            settings,
            state: ReconcileState::default(),
            backoff,
            phase: Phase::Idle,
        }
    }

    /// Shared handle to the condition set.
    pub fn status(&self) -> Arc<StatusReporter> {
        Arc::clone(&self.status)
    }

    pub fn state(&self) -> &ReconcileState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.settings
    }

    /// Runs one full iteration. Never returns an error: every failure ends
    /// up in the report's outcome and in the condition set.
    pub async fn reconcile_once(&mut self, cancel: &CancellationToken) -> IterationReport {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("reconcile", iteration = %id, phase = tracing::field::Empty);
        self.run_iteration(id, cancel).instrument(span).await
    }

    async fn run_iteration(&mut self, id: Uuid, cancel: &CancellationToken) -> IterationReport {
        let started_at = Utc::now();
        let mut mutations = 0;

        let outcome = match self.validate(cancel).await {
            Err(outcome) => outcome,
            Ok(config) => match self.apply_tasks(&config, cancel, &mut mutations).await {
                Err(outcome) => outcome,
                Ok(pending) => match self.wait_for_rollouts(pending, cancel).await {
                    Err(outcome) => outcome,
                    Ok(()) => {
                        self.state.record_success(config, Utc::now());
                        IterationOutcome::Succeeded
                    }
                },
            },
        };

        self.enter(Phase::Reporting);
        let next_delay = if outcome.is_success() {
            self.backoff.reset();
            self.settings.loop_config.resync_interval()
        } else {
            self.state.record_failure();
            self.backoff.next_delay()
        };

        let conditions = self.status.report(&outcome);
        self.publish_status(&conditions, cancel).await;

        match &outcome {
            IterationOutcome::Succeeded => log::info!(
                "Reconcile iteration succeeded ({} mutations), next resync in {:?}",
                mutations,
                next_delay
            ),
            IterationOutcome::Cancelled => log::info!("Reconcile iteration cancelled"),
            failed => log::warn!(
                "Reconcile iteration failed ({} consecutive): {}; retrying in {:?}",
                self.state.failure_count,
                failed.message(),
                next_delay
            ),
        }

        self.enter(Phase::Idle);
        IterationReport {
            id,
            outcome,
            mutations,
            next_delay,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn enter(&mut self, phase: Phase) {
        log::debug!("Reconcile phase {:?} -> {:?}", self.phase, phase);
        tracing::Span::current().record("phase", tracing::field::debug(phase));
        self.phase = phase;
    }

    async fn validate(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<ValidatedConfig, IterationOutcome> {
        self.enter(Phase::Validating);

        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IterationOutcome::Cancelled),
            snapshot = self.source.fetch() => snapshot,
        };

        let config = snapshot
            .and_then(|s| self.loader.load(&s.base, s.overlay.as_ref()))
            .map_err(|e| {
                log::warn!("Rejecting configuration: {}", e);
                IterationOutcome::InvalidConfig {
                    reason: e.to_string(),
                }
            })?;

        if let Some(previous) = &self.state.last_applied_config {
            if previous.same_settings(&config) {
                log::debug!("Configuration unchanged since last success ({})", config.revision());
            } else {
                log::info!(
                    "Configuration changed: {} -> {}",
                    previous.revision(),
                    config.revision()
                );
            }
        }
        Ok(config)
    }

    async fn apply_tasks(
        &mut self,
        config: &ValidatedConfig,
        cancel: &CancellationToken,
        mutations: &mut usize,
    ) -> Result<PendingRollouts, IterationOutcome> {
        self.enter(Phase::Applying);

        let ctx = TaskContext {
            config,
            namespace: &self.settings.namespace,
            user_workload_namespace: &self.settings.user_workload_namespace,
        };
        let mut pending = Vec::new();
        let mut progressing = false;

        for task in self.registry.tasks() {
            let span = tracing::info_span!("task", name = task.name());
            let changed = apply_task(
                self.client.as_ref(),
                task,
                &ctx,
                cancel,
                &mut pending,
            )
            .instrument(span)
            .await?;

            if changed > 0 && !progressing {
                self.status.progressing("Rolling out the stack.");
                progressing = true;
            }
            *mutations += changed;
        }

        Ok(pending)
    }

    async fn wait_for_rollouts(
        &mut self,
        pending: PendingRollouts,
        cancel: &CancellationToken,
    ) -> Result<(), IterationOutcome> {
        self.enter(Phase::Waiting);
        if pending.is_empty() {
            return Ok(());
        }

        let deadline = Instant::now()
            + self
                .settings
                .loop_config
                .iteration_deadline()
                .min(ROLLOUT_DEADLINE);
        let targets: Vec<RolloutTarget> = pending.iter().map(|(_, t)| t.clone()).collect();
        log::debug!("Waiting for {} rollouts", targets.len());

        let results = self.waiter.wait_all(&targets, deadline, cancel).await;

        for ((task, _), result) in pending.iter().zip(results) {
            match result {
                Ok(()) => {}
                Err(RolloutError::Cancelled) => return Err(IterationOutcome::Cancelled),
                Err(e @ RolloutError::Timeout { .. }) => {
                    return Err(IterationOutcome::RolloutTimeout {
                        task: task.clone(),
                        reason: e.to_string(),
                    })
                }
                Err(e) => {
                    return Err(IterationOutcome::TaskFailed {
                        task: task.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    async fn publish_status(&self, conditions: &[Condition], cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            log::debug!("Skipping status publish during shutdown");
            return;
        }
        let object = cluster_operator_object(conditions);
        match with_retry("status update", cancel, || self.client.apply(&object)).await {
            Ok(applied) if applied.outcome.is_mutation() => {
                log::debug!("Published operator status to {}", applied.object_ref)
            }
            Ok(_) => {}
            Err(e) => log::warn!("Failed to publish operator status: {}", e),
        }
    }
}

/// Submits one task's desired state. Returns the number of mutations.
async fn apply_task(
    client: &dyn PlatformClient,
    task: &dyn ComponentTask,
    ctx: &TaskContext<'_>,
    cancel: &CancellationToken,
    pending: &mut PendingRollouts,
) -> Result<usize, IterationOutcome> {
    let output = task.apply(ctx);
    let failed = |e: PlatformError| match e {
        PlatformError::Cancelled => IterationOutcome::Cancelled,
        other => IterationOutcome::TaskFailed {
            task: task.name().to_string(),
            reason: other.to_string(),
        },
    };
    let mut changed = 0;

    for desired in &output.apply {
        let what = desired.object_ref.to_string();
        let applied = with_retry(&what, cancel, || client.apply(desired))
            .await
            .map_err(failed)?;
        if applied.outcome.is_mutation() {
            log::info!("{} {:?}", applied.object_ref, applied.outcome);
            changed += 1;
        }
        if let Some(target) = task.rollout_target(&applied) {
            pending.push((task.name().to_string(), target));
        }
    }

    for object in &output.delete {
        let what = object.to_string();
        let existed = with_retry(&what, cancel, || client.delete(object))
            .await
            .map_err(failed)?;
        if existed {
            log::info!("{} deleted", object);
            changed += 1;
        }
    }

    Ok(changed)
}

/// Runs a platform call, retrying retryable errors with exponential backoff.
/// Cancellation aborts both the call and the wait between attempts.
async fn with_retry<T, F, Fut>(
    what: &str,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let mut attempt = 0;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PlatformError::Cancelled),
            result = call() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < APPLY_MAX_RETRIES => {
                attempt += 1;
                let delay = APPLY_RETRY_BASE * (1u32 << (attempt - 1));
                log::warn!(
                    "{} failed with retryable error (attempt {}/{}), retrying in {:?}: {}",
                    what,
                    attempt,
                    APPLY_MAX_RETRIES + 1,
                    delay,
                    e
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PlatformError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}
