//! Aggregates iteration outcomes into the operator's condition set.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use super::condition::{Condition, ConditionStatus, ConditionType};

const REASON_DONE: &str = "RollOutDone";
const REASON_AS_EXPECTED: &str = "AsExpected";
const REASON_IN_PROGRESS: &str = "RollOutInProgress";

/// How a reconcile iteration ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum IterationOutcome {
    /// Every task applied and every rollout finished.
    Succeeded,
    /// The configuration could not be fetched, parsed or validated.
    InvalidConfig { reason: String },
    /// A task's objects could not be applied.
    TaskFailed { task: String, reason: String },
    /// A task's workload did not become ready in time.
    RolloutTimeout { task: String, reason: String },
    /// Shutdown interrupted the iteration.
    Cancelled,
}

impl IterationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, IterationOutcome::Succeeded)
    }

    /// Machine-readable reason for a failed iteration.
    pub fn reason(&self) -> &'static str {
        match self {
            IterationOutcome::Succeeded => REASON_DONE,
            IterationOutcome::InvalidConfig { .. } => "InvalidConfiguration",
            IterationOutcome::TaskFailed { .. } => "UpdatingComponentFailed",
            IterationOutcome::RolloutTimeout { .. } => "RolloutTimeout",
            IterationOutcome::Cancelled => "ReconcileInterrupted",
        }
    }

    /// Human-readable message naming the failing component and cause.
    pub fn message(&self) -> String {
        match self {
            IterationOutcome::Succeeded => "Successfully rolled out the stack.".to_string(),
            IterationOutcome::InvalidConfig { reason } => {
                format!("Invalid configuration: {reason}")
            }
            IterationOutcome::TaskFailed { task, reason } => {
                format!("Failed to rollout the stack. Error: updating {task}: {reason}")
            }
            IterationOutcome::RolloutTimeout { task, reason } => {
                format!("Failed to rollout the stack. Error: waiting for {task} rollout: {reason}")
            }
            IterationOutcome::Cancelled => {
                "Reconciliation was interrupted before it completed.".to_string()
            }
        }
    }
}

/// Holds the current condition set and publishes every change.
///
/// Queries return copies; callers never see a live reference.
pub struct StatusReporter {
    conditions: RwLock<BTreeMap<ConditionType, Condition>>,
    sender: broadcast::Sender<Vec<Condition>>,
}

impl StatusReporter {
    /// Creates a reporter with every condition `Unknown`.
    pub fn new() -> Self {
        let now = Utc::now();
        let conditions = ConditionType::all()
            .iter()
            .map(|t| (*t, Condition::unknown(*t, now)))
            .collect();
        let (sender, _) = broadcast::channel(64);
        Self {
            conditions: RwLock::new(conditions),
            sender,
        }
    }

    /// Receives the full condition set after every change.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Condition>> {
        self.sender.subscribe()
    }

    /// Marks a rollout as underway.
    pub fn progressing(&self, message: &str) {
        self.update(|conditions, now| {
            set(
                conditions,
                ConditionType::Progressing,
                ConditionStatus::True,
                REASON_IN_PROGRESS,
                message,
                now,
            )
        });
    }

    /// Folds an iteration outcome into the condition set and returns the
    /// resulting snapshot.
    pub fn report(&self, outcome: &IterationOutcome) -> Vec<Condition> {
        self.update(|conditions, now| {
            use ConditionStatus::{False, True};
            use ConditionType::{Available, Degraded, Progressing, Upgradeable};

            let message = outcome.message();
            let reason = outcome.reason();

            // Available is only ever raised by a success and is otherwise
            // left as it was.
            let updates = if outcome.is_success() {
                vec![
                    (Available, True, REASON_DONE, message.as_str()),
                    (Degraded, False, REASON_AS_EXPECTED, ""),
                    (Progressing, False, REASON_DONE, ""),
                    (Upgradeable, True, REASON_AS_EXPECTED, ""),
                ]
            } else {
                vec![
                    (Degraded, True, reason, message.as_str()),
                    (Progressing, False, reason, ""),
                ]
            };

            updates
                .into_iter()
                .fold(false, |changed, (condition_type, status, reason, message)| {
                    set(conditions, condition_type, status, reason, message, now) || changed
                })
        });
        self.snapshot()
    }

    /// Copy of the full condition set, ordered by type.
    pub fn snapshot(&self) -> Vec<Condition> {
        match self.conditions.read() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(poisoned) => {
                log::warn!("Status lock was poisoned, recovering");
                poisoned.into_inner().values().cloned().collect()
            }
        }
    }

    /// Copy of a single condition.
    pub fn get(&self, condition_type: ConditionType) -> Option<Condition> {
        self.snapshot()
            .into_iter()
            .find(|c| c.condition_type == condition_type)
    }

    fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut BTreeMap<ConditionType, Condition>, chrono::DateTime<Utc>) -> bool,
    {
        let now = Utc::now();
        let snapshot = {
            let mut guard = match self.conditions.write() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    log::warn!("Status lock was poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            if !apply(&mut *guard, now) {
                return;
            }
            guard.values().cloned().collect::<Vec<_>>()
        };

        for condition in &snapshot {
            log::debug!(
                "Condition {}={} ({})",
                condition.condition_type,
                condition.status,
                condition.reason
            );
        }
        // No subscribers is fine.
        let _ = self.sender.send(snapshot);
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn set(
    conditions: &mut BTreeMap<ConditionType, Condition>,
    condition_type: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: chrono::DateTime<Utc>,
) -> bool {
    conditions
        .entry(condition_type)
        .or_insert_with(|| Condition::unknown(condition_type, now))
        .transition(status, reason, message, now)
}
