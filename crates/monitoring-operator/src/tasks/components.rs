//! The fixed set of component tasks.

use crate::config::ComponentName;
use crate::platform::{DesiredObject, ObjectKind};

use super::manifests::{self, ContainerSpec};
use super::{ComponentTask, TaskContext, TaskOutput};

const IMAGE_REGISTRY: &str = "quay.io/openshift";

fn namespace_for<'a>(component: ComponentName, ctx: &TaskContext<'a>) -> &'a str {
    if component.is_user_workload() {
        ctx.user_workload_namespace
    } else {
        ctx.namespace
    }
}

fn gate(component: ComponentName, ctx: &TaskContext<'_>, objects: Vec<DesiredObject>) -> TaskOutput {
    if component.is_user_workload() {
        TaskOutput::gated(ctx.config.enable_user_workload, objects)
    } else {
        TaskOutput::apply(objects)
    }
}

/// A component the operator runs directly as a Deployment or DaemonSet,
/// together with its Service and ServiceMonitor.
#[derive(Debug, Clone)]
pub struct WorkloadTask {
    component: ComponentName,
    kind: ObjectKind,
    workload_name: &'static str,
    image: String,
    port: u16,
    replicas: u32,
    log_flag: Option<&'static str>,
    dependencies: &'static [&'static str],
}

impl WorkloadTask {
    pub fn deployment(component: ComponentName, workload_name: &'static str, port: u16) -> Self {
        Self {
            component,
            kind: ObjectKind::Deployment,
            workload_name,
            image: format!("{IMAGE_REGISTRY}/{workload_name}:latest"),
            port,
            replicas: 1,
            log_flag: None,
            dependencies: &[],
        }
    }

    pub fn daemon_set(component: ComponentName, workload_name: &'static str, port: u16) -> Self {
        Self {
            kind: ObjectKind::DaemonSet,
            ..Self::deployment(component, workload_name, port)
        }
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Passes the configured log level to the container as `<flag>=<level>`.
    pub fn with_log_flag(mut self, flag: &'static str) -> Self {
        self.log_flag = Some(flag);
        self
    }

    pub fn depends_on(mut self, dependencies: &'static [&'static str]) -> Self {
        self.dependencies = dependencies;
        self
    }

    fn args(&self, ctx: &TaskContext<'_>) -> Vec<String> {
        let options = ctx.config.component(self.component);
        self.log_flag
            .map(|flag| format!("{flag}={}", options.log_level()))
            .into_iter()
            .collect()
    }
}

impl ComponentTask for WorkloadTask {
    fn name(&self) -> &str {
        self.component.as_str()
    }

    fn dependencies(&self) -> &[&'static str] {
        self.dependencies
    }

    fn apply(&self, ctx: &TaskContext<'_>) -> TaskOutput {
        let namespace = namespace_for(self.component, ctx);
        let options = ctx.config.component(self.component);
        let container = ContainerSpec {
            name: self.workload_name,
            image: &self.image,
            args: self.args(ctx),
            port: self.port,
        };
        let component = self.name();

        let workload = match self.kind {
            ObjectKind::DaemonSet => manifests::daemon_set(namespace, component, &container, options),
            _ => manifests::deployment(namespace, component, self.replicas, &container, options),
        };

        gate(
            self.component,
            ctx,
            vec![
                workload,
                manifests::service(namespace, component, self.workload_name, self.port),
                manifests::service_monitor(namespace, component, self.workload_name),
            ],
        )
    }
}

/// A component run by a downstream operator from a custom resource.
#[derive(Debug, Clone)]
pub struct DelegatedTask {
    component: ComponentName,
    kind: ObjectKind,
    resource_name: &'static str,
    service_name: &'static str,
    port: u16,
    replicas: u32,
    default_retention: Option<&'static str>,
    dependencies: &'static [&'static str],
}

impl DelegatedTask {
    pub fn new(
        component: ComponentName,
        kind: ObjectKind,
        resource_name: &'static str,
        service_name: &'static str,
        port: u16,
    ) -> Self {
        Self {
            component,
            kind,
            resource_name,
            service_name,
            port,
            replicas: 1,
            default_retention: None,
            dependencies: &[],
        }
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Retention used when the configuration does not set one.
    pub fn with_default_retention(mut self, retention: &'static str) -> Self {
        self.default_retention = Some(retention);
        self
    }

    pub fn depends_on(mut self, dependencies: &'static [&'static str]) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl ComponentTask for DelegatedTask {
    fn name(&self) -> &str {
        self.component.as_str()
    }

    fn dependencies(&self) -> &[&'static str] {
        self.dependencies
    }

    fn apply(&self, ctx: &TaskContext<'_>) -> TaskOutput {
        let namespace = namespace_for(self.component, ctx);
        let component = self.name();
        let resource = manifests::delegated_resource(
            self.kind,
            namespace,
            component,
            self.resource_name,
            self.replicas,
            ctx.config.component(self.component),
            self.default_retention,
        );

        gate(
            self.component,
            ctx,
            vec![
                resource,
                manifests::service(namespace, component, self.service_name, self.port),
                manifests::service_monitor(namespace, component, self.service_name),
            ],
        )
    }
}

/// The tasks that make up the monitoring stack.
pub fn standard_tasks() -> Vec<Box<dyn ComponentTask>> {
    use ComponentName::*;

    vec![
        Box::new(
            WorkloadTask::deployment(PrometheusOperator, "prometheus-operator", 8080)
                .with_log_flag("--log-level"),
        ),
        Box::new(
            DelegatedTask::new(PrometheusK8s, ObjectKind::Prometheus, "k8s", "prometheus-k8s", 9090)
                .with_replicas(2)
                .with_default_retention("15d")
                .depends_on(&["prometheus-operator"]),
        ),
        Box::new(
            DelegatedTask::new(
                AlertmanagerMain,
                ObjectKind::Alertmanager,
                "main",
                "alertmanager-main",
                9093,
            )
            .with_replicas(3)
            .depends_on(&["prometheus-operator"]),
        ),
        Box::new(WorkloadTask::deployment(KubeStateMetrics, "kube-state-metrics", 8443)),
        Box::new(WorkloadTask::deployment(
            OpenshiftStateMetrics,
            "openshift-state-metrics",
            8443,
        )),
        Box::new(WorkloadTask::daemon_set(NodeExporter, "node-exporter", 9100)),
        Box::new(
            WorkloadTask::deployment(ThanosQuerier, "thanos-querier", 9091)
                .with_replicas(2)
                .with_log_flag("--log.level")
                .depends_on(&["prometheus-k8s"]),
        ),
        Box::new(WorkloadTask::deployment(Grafana, "grafana", 3000).depends_on(&["thanos-querier"])),
        Box::new(
            WorkloadTask::deployment(TelemeterClient, "telemeter-client", 8443)
                .depends_on(&["prometheus-k8s"]),
        ),
        Box::new(
            WorkloadTask::deployment(PrometheusAdapter, "prometheus-adapter", 6443)
                .with_replicas(2)
                .depends_on(&["prometheus-k8s"]),
        ),
        Box::new(
            WorkloadTask::deployment(UserWorkloadPrometheusOperator, "prometheus-operator", 8080)
                .with_log_flag("--log-level")
                .depends_on(&["prometheus-operator"]),
        ),
        Box::new(
            DelegatedTask::new(
                UserWorkloadPrometheus,
                ObjectKind::Prometheus,
                "user-workload",
                "prometheus-user-workload",
                9090,
            )
            .with_replicas(2)
            .with_default_retention("24h")
            .depends_on(&["prometheus-operator-user-workload"]),
        ),
        Box::new(
            DelegatedTask::new(
                UserWorkloadThanosRuler,
                ObjectKind::ThanosRuler,
                "user-workload",
                "thanos-ruler",
                9091,
            )
            .with_replicas(2)
            .depends_on(&["prometheus-operator-user-workload"]),
        ),
    ]
}
