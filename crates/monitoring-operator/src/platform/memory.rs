//! In-memory platform used for dry runs and tests.
//!
//! Behaves like a real API server for the operations the operator uses:
//! upserts bump the generation only when the spec or labels change, and
//! workloads report themselves rolled out right away unless stalled. Every
//! state change is appended to a mutation log so callers can assert on
//! ordering and idempotence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::client::PlatformClient;
use super::error::{PlatformError, Result};
use super::object::{
    AppliedObject, ApplyOutcome, DesiredObject, ObjectKind, ObjectRef, PlatformObject,
    WorkloadStatus,
};

/// The kind of state change recorded in the mutation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// One entry in the mutation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub sequence: u64,
    pub kind: MutationKind,
    pub object: ObjectRef,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct PlatformState {
    objects: BTreeMap<ObjectRef, PlatformObject>,
    mutations: Vec<Mutation>,
    apply_requests: Vec<ObjectRef>,
    next_sequence: u64,
    rejections: HashMap<ObjectRef, String>,
    transient_apply_failures: HashMap<ObjectRef, u32>,
    observation_failures: HashMap<ObjectRef, u32>,
    stalled: HashSet<ObjectRef>,
}

impl PlatformState {
    fn record(&mut self, kind: MutationKind, object: &ObjectRef) {
        self.next_sequence += 1;
        self.mutations.push(Mutation {
            sequence: self.next_sequence,
            kind,
            object: object.clone(),
            at: Utc::now(),
        });
    }

    /// Takes one pending failure from `counter`, returning true if there was one.
    fn take_failure(counter: &mut HashMap<ObjectRef, u32>, object: &ObjectRef) -> bool {
        match counter.get_mut(object) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn rollout_status(&self, object: &ObjectRef, spec: &Value, generation: u64) -> Value {
        if !object.kind.reports_rollout() {
            return Value::Null;
        }
        let replicas = desired_replicas(spec);
        let status = if self.stalled.contains(object) {
            WorkloadStatus {
                observed_generation: generation,
                replicas,
                updated_replicas: 0,
                ready_replicas: 0,
            }
        } else {
            WorkloadStatus::rolled_out(generation, replicas)
        };
        serde_json::to_value(status).unwrap_or(Value::Null)
    }
}

fn desired_replicas(spec: &Value) -> u32 {
    spec.get("replicas")
        .and_then(Value::as_u64)
        .and_then(|r| u32::try_from(r).ok())
        .unwrap_or(1)
}

/// A thread-safe in-memory implementation of [`PlatformClient`].
#[derive(Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("In-memory platform lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Makes every apply of `object` fail with a non-retryable rejection.
    pub fn reject(&self, object: ObjectRef, reason: impl Into<String>) {
        self.lock().rejections.insert(object, reason.into());
    }

    /// Makes the next `times` applies of `object` fail with a retryable error.
    pub fn fail_applies(&self, object: ObjectRef, times: u32) {
        self.lock().transient_apply_failures.insert(object, times);
    }

    /// Makes the next `times` status reads of `object` fail with a
    /// retryable error.
    pub fn fail_observations(&self, object: ObjectRef, times: u32) {
        self.lock().observation_failures.insert(object, times);
    }

    /// Keeps `object` from ever finishing its rollout.
    pub fn stall(&self, object: ObjectRef) {
        let mut state = self.lock();
        if let Some(existing) = state.objects.get(&object) {
            let replicas = desired_replicas(&existing.spec);
            let generation = existing.generation;
            let status = WorkloadStatus {
                observed_generation: generation,
                replicas,
                updated_replicas: 0,
                ready_replicas: 0,
            };
            if let Some(existing) = state.objects.get_mut(&object) {
                existing.status = serde_json::to_value(status).unwrap_or(Value::Null);
            }
        }
        state.stalled.insert(object);
    }

    /// Lets a stalled object finish its rollout.
    pub fn resume(&self, object: &ObjectRef) {
        let mut state = self.lock();
        state.stalled.remove(object);
        if let Some(existing) = state.objects.get_mut(object) {
            let status =
                WorkloadStatus::rolled_out(existing.generation, desired_replicas(&existing.spec));
            existing.status = serde_json::to_value(status).unwrap_or(Value::Null);
        }
    }

    /// Stores an object on behalf of another controller. Not recorded in the
    /// mutation log.
    pub fn materialize(&self, object: PlatformObject) {
        self.lock()
            .objects
            .insert(object.object_ref.clone(), object);
    }

    /// Returns a copy of a stored object.
    pub fn object(&self, object: &ObjectRef) -> Option<PlatformObject> {
        self.lock().objects.get(object).cloned()
    }

    /// Returns copies of every stored object of `kind`.
    pub fn objects_of(&self, kind: ObjectKind) -> Vec<PlatformObject> {
        self.lock()
            .objects
            .values()
            .filter(|o| o.object_ref.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the mutation log.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().mutations.len()
    }

    /// Every object passed to `apply`, in call order, whether or not it
    /// changed anything.
    pub fn apply_requests(&self) -> Vec<ObjectRef> {
        self.lock().apply_requests.clone()
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn apply(&self, desired: &DesiredObject) -> Result<AppliedObject> {
        let mut state = self.lock();
        let object_ref = desired.object_ref.clone();
        state.apply_requests.push(object_ref.clone());

        if let Some(reason) = state.rejections.get(&object_ref) {
            return Err(PlatformError::Rejected {
                object: object_ref.to_string(),
                reason: reason.clone(),
            });
        }
        if PlatformState::take_failure(&mut state.transient_apply_failures, &object_ref) {
            return Err(PlatformError::Unavailable(format!(
                "temporarily unable to apply {object_ref}"
            )));
        }

        let current = state
            .objects
            .get(&object_ref)
            .map(|o| (o.generation, o.spec == desired.spec && o.labels == desired.labels));

        let (generation, outcome) = match current {
            Some((generation, true)) => (generation, ApplyOutcome::Unchanged),
            Some((generation, false)) => (generation + 1, ApplyOutcome::Configured),
            None => (1, ApplyOutcome::Created),
        };

        if outcome.is_mutation() {
            let status = state.rollout_status(&object_ref, &desired.spec, generation);
            state.objects.insert(
                object_ref.clone(),
                PlatformObject {
                    object_ref: object_ref.clone(),
                    labels: desired.labels.clone(),
                    spec: desired.spec.clone(),
                    status,
                    generation,
                },
            );
            let kind = if outcome == ApplyOutcome::Created {
                MutationKind::Create
            } else {
                MutationKind::Update
            };
            state.record(kind, &object_ref);
        }

        Ok(AppliedObject {
            object_ref,
            generation,
            outcome,
        })
    }

    async fn delete(&self, object: &ObjectRef) -> Result<bool> {
        let mut state = self.lock();
        if state.objects.remove(object).is_some() {
            state.record(MutationKind::Delete, object);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn get(&self, object: &ObjectRef) -> Result<Option<PlatformObject>> {
        Ok(self.lock().objects.get(object).cloned())
    }

    async fn list(&self, kind: ObjectKind, namespace: &str) -> Result<Vec<PlatformObject>> {
        Ok(self
            .lock()
            .objects
            .values()
            .filter(|o| o.object_ref.kind == kind && o.object_ref.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn workload_status(&self, object: &ObjectRef) -> Result<WorkloadStatus> {
        let mut state = self.lock();
        if PlatformState::take_failure(&mut state.observation_failures, object) {
            return Err(PlatformError::Unavailable(format!(
                "temporarily unable to read {object}"
            )));
        }
        let existing = state
            .objects
            .get(object)
            .ok_or_else(|| PlatformError::NotFound(object.to_string()))?;
        Ok(existing.workload_status().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(name: &str, replicas: u64) -> DesiredObject {
        DesiredObject::new(
            ObjectRef::new(ObjectKind::Deployment, "ns", name),
            json!({"replicas": replicas}),
        )
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let platform = InMemoryPlatform::new();
        let first = platform.apply(&deployment("a", 1)).await.unwrap();
        let second = platform.apply(&deployment("a", 1)).await.unwrap();

        assert_eq!(first.outcome, ApplyOutcome::Created);
        assert_eq!(second.outcome, ApplyOutcome::Unchanged);
        assert_eq!(second.generation, 1);
        assert_eq!(platform.mutation_count(), 1);
        assert_eq!(platform.apply_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_spec_change_bumps_generation() {
        let platform = InMemoryPlatform::new();
        platform.apply(&deployment("a", 1)).await.unwrap();
        let applied = platform.apply(&deployment("a", 2)).await.unwrap();

        assert_eq!(applied.outcome, ApplyOutcome::Configured);
        assert_eq!(applied.generation, 2);
        let status = platform.workload_status(&applied.object_ref).await.unwrap();
        assert!(status.is_rolled_out(2));
        assert_eq!(status.replicas, 2);
    }

    #[tokio::test]
    async fn test_stalled_workload_never_rolls_out() {
        let platform = InMemoryPlatform::new();
        let object = ObjectRef::new(ObjectKind::Deployment, "ns", "a");
        platform.stall(object.clone());
        platform.apply(&deployment("a", 1)).await.unwrap();

        assert!(!platform.workload_status(&object).await.unwrap().is_rolled_out(1));

        platform.resume(&object);
        assert!(platform.workload_status(&object).await.unwrap().is_rolled_out(1));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let platform = InMemoryPlatform::new();
        let object = ObjectRef::new(ObjectKind::Deployment, "ns", "a");

        platform.fail_applies(object.clone(), 1);
        let err = platform.apply(&deployment("a", 1)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(platform.apply(&deployment("a", 1)).await.is_ok());

        platform.fail_observations(object.clone(), 1);
        assert!(platform.workload_status(&object).await.is_err());
        assert!(platform.workload_status(&object).await.is_ok());

        platform.reject(object.clone(), "forbidden");
        let err = platform.apply(&deployment("a", 3)).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_absent_object_is_noop() {
        let platform = InMemoryPlatform::new();
        let object = ObjectRef::new(ObjectKind::Service, "ns", "a");
        assert!(!platform.delete(&object).await.unwrap());
        assert_eq!(platform.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_materialize_is_not_a_mutation() {
        let platform = InMemoryPlatform::new();
        let object = ObjectRef::new(ObjectKind::Pod, "ns", "p-0");
        platform.materialize(PlatformObject::new(object.clone(), json!({})));

        assert!(platform.get(&object).await.unwrap().is_some());
        assert_eq!(platform.list(ObjectKind::Pod, "ns").await.unwrap().len(), 1);
        assert_eq!(platform.mutation_count(), 0);
    }
}
