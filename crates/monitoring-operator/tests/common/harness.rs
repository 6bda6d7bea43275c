//! Test harness for isolated reconcile runs.
//!
//! Every `TestHarness` owns a fresh in-memory platform, config source and
//! reconciler, so tests never share operator state.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use monitoring_operator::config::InMemoryConfigSource;
use monitoring_operator::controller::{IterationReport, Reconciler};
use monitoring_operator::platform::{InMemoryPlatform, ObjectKind, ObjectRef, PlatformObject};
use monitoring_operator::settings::OperatorSettings;
use monitoring_operator::status::{Condition, ConditionStatus, ConditionType};
use monitoring_operator::tasks::manifests::COMPONENT_LABEL;
use monitoring_operator::tasks::TaskRegistry;

pub const NAMESPACE: &str = "openshift-monitoring";
pub const USER_WORKLOAD_NAMESPACE: &str = "openshift-user-workload-monitoring";

/// Stand-in for the operators that consume delegated resources.
///
/// For each Prometheus, Alertmanager and ThanosRuler resource it creates a
/// StatefulSet, a first pod carrying the rendered flags and, when storage is
/// configured, a bound volume claim.
pub struct DownstreamOperators {
    platform: Arc<InMemoryPlatform>,
}

impl DownstreamOperators {
    pub fn new(platform: Arc<InMemoryPlatform>) -> Self {
        Self { platform }
    }

    /// Brings derived objects in line with the current delegated resources.
    pub fn sync(&self) {
        for kind in [
            ObjectKind::Prometheus,
            ObjectKind::Alertmanager,
            ObjectKind::ThanosRuler,
        ] {
            for resource in self.platform.objects_of(kind) {
                self.materialize(&resource);
            }
        }
    }

    fn materialize(&self, resource: &PlatformObject) {
        let (prefix, container, retention_flag, volume) = match resource.object_ref.kind {
            ObjectKind::Prometheus => (
                "prometheus",
                "prometheus",
                "--storage.tsdb.retention.time",
                "db",
            ),
            ObjectKind::Alertmanager => {
                ("alertmanager", "alertmanager", "--data.retention", "db")
            }
            _ => ("thanos-ruler", "thanos-ruler", "--tsdb.retention", "data"),
        };
        let namespace = resource.object_ref.namespace.as_str();
        let set_name = format!("{prefix}-{}", resource.object_ref.name);
        let spec = &resource.spec;

        let mut args = vec![format!(
            "--log.level={}",
            spec["logLevel"].as_str().unwrap_or("info")
        )];
        if let Some(retention) = spec["retention"].as_str() {
            args.push(format!("{retention_flag}={retention}"));
        }

        let pod_spec = json!({
            "containers": [{
                "name": container,
                "args": args,
                "resources": spec["resources"].clone(),
            }],
            "tolerations": spec["tolerations"].clone(),
        });

        let mut stateful_set = PlatformObject::new(
            ObjectRef::new(ObjectKind::StatefulSet, namespace, &set_name),
            json!({
                "replicas": spec["replicas"].clone(),
                "template": { "spec": pod_spec.clone() },
            }),
        );
        if let Some(component) = resource.labels.get(COMPONENT_LABEL) {
            stateful_set
                .labels
                .insert(COMPONENT_LABEL.to_string(), component.clone());
        }
        self.platform.materialize(stateful_set);
        self.platform.materialize(
            PlatformObject::new(
                ObjectRef::new(ObjectKind::Pod, namespace, format!("{set_name}-0")),
                pod_spec,
            )
            .with_status(json!({ "phase": "Running" })),
        );

        let claim = &spec["storage"]["volumeClaimTemplate"]["spec"];
        if !claim.is_null() {
            self.platform.materialize(
                PlatformObject::new(
                    ObjectRef::new(
                        ObjectKind::PersistentVolumeClaim,
                        namespace,
                        format!("{set_name}-{volume}-{set_name}-0"),
                    ),
                    claim.clone(),
                )
                .with_status(json!({
                    "phase": "Bound",
                    "capacity": { "storage": claim["resources"]["requests"]["storage"].clone() },
                })),
            );
        }
    }
}

/// Test harness providing an isolated reconciler for integration tests.
pub struct TestHarness {
    pub source: Arc<InMemoryConfigSource>,
    pub platform: Arc<InMemoryPlatform>,
    pub reconciler: Reconciler,
    pub downstream: DownstreamOperators,
    pub cancel: CancellationToken,
}

impl TestHarness {
    /// Creates a harness with the given base document and no overlay.
    pub fn new(base: &str) -> Self {
        Self::with_registry(base, TaskRegistry::standard().expect("standard registry"))
    }

    pub fn with_overlay(base: &str, overlay: &str) -> Self {
        let harness = Self::new(base);
        harness.source.set_overlay(Some(overlay.to_string()));
        harness
    }

    pub fn with_registry(base: &str, registry: TaskRegistry) -> Self {
        let source = Arc::new(InMemoryConfigSource::new(base));
        let platform = Arc::new(InMemoryPlatform::new());
        let reconciler = Reconciler::new(
            source.clone(),
            platform.clone(),
            registry,
            OperatorSettings::default(),
        );
        Self {
            downstream: DownstreamOperators::new(platform.clone()),
            source,
            platform,
            reconciler,
            cancel: CancellationToken::new(),
        }
    }

    /// Runs one iteration, then lets the downstream operators catch up.
    pub async fn reconcile(&mut self) -> IterationReport {
        let report = self.reconciler.reconcile_once(&self.cancel).await;
        self.downstream.sync();
        report
    }

    pub fn condition(&self, condition_type: ConditionType) -> Condition {
        self.reconciler
            .status()
            .get(condition_type)
            .expect("every condition type is always present")
    }

    pub fn condition_status(&self, condition_type: ConditionType) -> ConditionStatus {
        self.condition(condition_type).status
    }

    /// Returns an object, panicking with a readable message if it is absent.
    pub fn object(&self, kind: ObjectKind, namespace: &str, name: &str) -> PlatformObject {
        let object_ref = ObjectRef::new(kind, namespace, name);
        self.platform
            .object(&object_ref)
            .unwrap_or_else(|| panic!("{object_ref} does not exist"))
    }

    pub fn exists(&self, kind: ObjectKind, namespace: &str, name: &str) -> bool {
        self.platform
            .object(&ObjectRef::new(kind, namespace, name))
            .is_some()
    }

    /// Arguments of the first container of a pod.
    pub fn pod_args(&self, namespace: &str, pod: &str) -> Vec<String> {
        let pod = self.object(ObjectKind::Pod, namespace, pod);
        pod.spec["containers"][0]["args"]
            .as_array()
            .map(|args| {
                args.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
