//! Operator health conditions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionType {
    Available,
    Degraded,
    Progressing,
    Upgradeable,
}

impl ConditionType {
    pub fn all() -> &'static [ConditionType] {
        &[
            ConditionType::Available,
            ConditionType::Degraded,
            ConditionType::Progressing,
            ConditionType::Upgradeable,
        ]
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionType::Available => "Available",
            ConditionType::Degraded => "Degraded",
            ConditionType::Progressing => "Progressing",
            ConditionType::Upgradeable => "Upgradeable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// One health condition as reported on the operator status object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// Changes only when `status` changes.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn unknown(condition_type: ConditionType, now: DateTime<Utc>) -> Self {
        Self {
            condition_type,
            status: ConditionStatus::Unknown,
            reason: String::new(),
            message: String::new(),
            last_transition_time: now,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Moves the condition to `status`, bumping the transition time only if
    /// the status actually changes.
    pub(crate) fn transition(
        &mut self,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let status_changed = self.status != status;
        if status_changed {
            self.last_transition_time = now;
        }
        let changed = status_changed || self.reason != reason || self.message != message;
        self.status = status;
        self.reason = reason.to_string();
        self.message = message.to_string();
        changed
    }
}
