//! Component tasks: per-component appliers that map validated configuration
//! to desired platform objects.

pub mod components;
pub mod manifests;
pub mod registry;

use crate::config::ValidatedConfig;
use crate::platform::{AppliedObject, DesiredObject, ObjectRef};
use crate::rollout::RolloutTarget;

pub use components::{standard_tasks, DelegatedTask, WorkloadTask};
pub use registry::{RegistryError, TaskRegistry};

/// Inputs available to every task.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub config: &'a ValidatedConfig,
    pub namespace: &'a str,
    pub user_workload_namespace: &'a str,
}

/// Objects a task wants present and objects it wants gone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub apply: Vec<DesiredObject>,
    pub delete: Vec<ObjectRef>,
}

impl TaskOutput {
    pub fn apply(objects: Vec<DesiredObject>) -> Self {
        Self {
            apply: objects,
            delete: Vec::new(),
        }
    }

    /// Keeps `objects` when `enabled`, otherwise asks for their removal.
    pub fn gated(enabled: bool, objects: Vec<DesiredObject>) -> Self {
        if enabled {
            Self::apply(objects)
        } else {
            Self {
                apply: Vec::new(),
                delete: objects.into_iter().map(|o| o.object_ref).collect(),
            }
        }
    }
}

/// A per-component applier.
///
/// `apply` must be a pure function of the context: the same configuration
/// always yields the same desired objects, which is what makes resubmitting
/// an unchanged configuration a no-op on the platform.
pub trait ComponentTask: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the tasks whose objects must be submitted first.
    fn dependencies(&self) -> &[&'static str];

    fn apply(&self, ctx: &TaskContext<'_>) -> TaskOutput;

    /// Returns the readiness check for an object this task applied, if the
    /// object needs one.
    fn rollout_target(&self, applied: &AppliedObject) -> Option<RolloutTarget> {
        applied
            .object_ref
            .kind
            .reports_rollout()
            .then(|| RolloutTarget::new(applied.object_ref.clone(), applied.generation))
    }
}
