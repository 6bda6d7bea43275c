//! Platform object model: references, desired state and observed state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of platform objects the operator produces or observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Service,
    ServiceMonitor,
    Prometheus,
    Alertmanager,
    ThanosRuler,
    PersistentVolumeClaim,
    Pod,
    ClusterOperator,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Deployment => "Deployment",
            ObjectKind::StatefulSet => "StatefulSet",
            ObjectKind::DaemonSet => "DaemonSet",
            ObjectKind::Service => "Service",
            ObjectKind::ServiceMonitor => "ServiceMonitor",
            ObjectKind::Prometheus => "Prometheus",
            ObjectKind::Alertmanager => "Alertmanager",
            ObjectKind::ThanosRuler => "ThanosRuler",
            ObjectKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ObjectKind::Pod => "Pod",
            ObjectKind::ClusterOperator => "ClusterOperator",
        }
    }

    /// Replicated workloads managed directly by the platform.
    pub fn is_workload(&self) -> bool {
        matches!(
            self,
            ObjectKind::Deployment | ObjectKind::StatefulSet | ObjectKind::DaemonSet
        )
    }

    /// Custom resources turned into workloads by a downstream operator.
    pub fn is_delegated(&self) -> bool {
        matches!(
            self,
            ObjectKind::Prometheus | ObjectKind::Alertmanager | ObjectKind::ThanosRuler
        )
    }

    /// Returns true if the platform reports rollout progress for this kind.
    pub fn reports_rollout(&self) -> bool {
        self.is_workload() || self.is_delegated()
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a platform object. Cluster-scoped objects use an empty
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::new(kind, "", name)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Desired state of one object, as submitted by a component task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredObject {
    pub object_ref: ObjectRef,
    pub labels: BTreeMap<String, String>,
    pub spec: Value,
}

impl DesiredObject {
    pub fn new(object_ref: ObjectRef, spec: Value) -> Self {
        Self {
            object_ref,
            labels: BTreeMap::new(),
            spec,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Observed state of one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformObject {
    pub object_ref: ObjectRef,
    pub labels: BTreeMap<String, String>,
    pub spec: Value,
    pub status: Value,
    /// Bumped by the platform on every spec change.
    pub generation: u64,
}

impl PlatformObject {
    /// An object that exists with the given spec and no status yet.
    pub fn new(object_ref: ObjectRef, spec: Value) -> Self {
        Self {
            object_ref,
            labels: BTreeMap::new(),
            spec,
            status: Value::Null,
            generation: 1,
        }
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = status;
        self
    }

    /// Rollout status, if the object carries one.
    pub fn workload_status(&self) -> Option<WorkloadStatus> {
        if self.status.is_null() {
            return None;
        }
        serde_json::from_value(self.status.clone()).ok()
    }
}

/// What an apply did to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOutcome {
    Created,
    Configured,
    Unchanged,
}

impl ApplyOutcome {
    /// Returns true if the platform state changed.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ApplyOutcome::Unchanged)
    }
}

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedObject {
    pub object_ref: ObjectRef,
    pub generation: u64,
    pub outcome: ApplyOutcome,
}

/// Replica counts reported for a rolling workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub observed_generation: u64,
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub updated_replicas: u32,
    #[serde(default)]
    pub ready_replicas: u32,
}

impl WorkloadStatus {
    /// A workload whose replicas are all updated and ready at `generation`.
    pub fn rolled_out(generation: u64, replicas: u32) -> Self {
        Self {
            observed_generation: generation,
            replicas,
            updated_replicas: replicas,
            ready_replicas: replicas,
        }
    }

    /// Returns true once the platform has observed `desired_generation` and
    /// every desired replica is updated and ready.
    pub fn is_rolled_out(&self, desired_generation: u64) -> bool {
        self.observed_generation >= desired_generation
            && self.updated_replicas == self.replicas
            && self.ready_replicas == self.replicas
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "observedGeneration={} replicas={} updated={} ready={}",
            self.observed_generation, self.replicas, self.updated_replicas, self.ready_replicas
        )
    }
}
