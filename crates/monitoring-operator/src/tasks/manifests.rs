//! Minimal object skeletons filled with validated configuration values.

use serde_json::{json, Map, Value};

use crate::config::{ComponentOptions, ResourceRequests, Toleration, TolerationOperator};
use crate::platform::{DesiredObject, ObjectKind, ObjectRef};

/// Label carrying the component name on every rendered object.
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
/// Label marking objects owned by the operator.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "monitoring-operator";

/// A single-container pod template.
#[derive(Debug, Clone)]
pub struct ContainerSpec<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub args: Vec<String>,
    pub port: u16,
}

pub fn requests_value(requests: &ResourceRequests) -> Value {
    let mut map = Map::new();
    if let Some(cpu) = &requests.cpu {
        map.insert("cpu".to_string(), json!(cpu));
    }
    if let Some(memory) = &requests.memory {
        map.insert("memory".to_string(), json!(memory));
    }
    json!({ "requests": map })
}

pub fn toleration_value(toleration: &Toleration) -> Value {
    let mut map = Map::new();
    if let Some(key) = &toleration.key {
        map.insert("key".to_string(), json!(key));
    }
    let operator = match toleration.operator {
        TolerationOperator::Exists => "Exists",
        TolerationOperator::Equal => "Equal",
    };
    map.insert("operator".to_string(), json!(operator));
    if let Some(value) = &toleration.value {
        map.insert("value".to_string(), json!(value));
    }
    if let Some(effect) = &toleration.effect {
        map.insert("effect".to_string(), json!(effect));
    }
    if let Some(seconds) = toleration.toleration_seconds.as_deref().and_then(|s| s.parse::<i64>().ok()) {
        map.insert("tolerationSeconds".to_string(), json!(seconds));
    }
    Value::Object(map)
}

pub fn tolerations_value(tolerations: &[Toleration]) -> Value {
    Value::Array(tolerations.iter().map(toleration_value).collect())
}

fn selector_labels(name: &str) -> Value {
    json!({ "app.kubernetes.io/name": name })
}

fn pod_template(container: &ContainerSpec<'_>, options: &ComponentOptions) -> Value {
    json!({
        "metadata": { "labels": selector_labels(container.name) },
        "spec": {
            "containers": [{
                "name": container.name,
                "image": container.image,
                "args": container.args,
                "ports": [{ "name": "metrics", "containerPort": container.port }],
                "resources": requests_value(&options.requests()),
            }],
            "tolerations": tolerations_value(&options.tolerations),
        }
    })
}

fn labelled(object: DesiredObject, component: &str) -> DesiredObject {
    object
        .with_label(COMPONENT_LABEL, component)
        .with_label(MANAGED_BY_LABEL, MANAGED_BY)
}

/// Renders a Deployment running a single container.
pub fn deployment(
    namespace: &str,
    component: &str,
    replicas: u32,
    container: &ContainerSpec<'_>,
    options: &ComponentOptions,
) -> DesiredObject {
    let spec = json!({
        "replicas": replicas,
        "selector": { "matchLabels": selector_labels(container.name) },
        "template": pod_template(container, options),
    });
    labelled(
        DesiredObject::new(
            ObjectRef::new(ObjectKind::Deployment, namespace, container.name),
            spec,
        ),
        component,
    )
}

/// Renders a DaemonSet running a single container on every node.
pub fn daemon_set(
    namespace: &str,
    component: &str,
    container: &ContainerSpec<'_>,
    options: &ComponentOptions,
) -> DesiredObject {
    let spec = json!({
        "selector": { "matchLabels": selector_labels(container.name) },
        "template": pod_template(container, options),
    });
    labelled(
        DesiredObject::new(
            ObjectRef::new(ObjectKind::DaemonSet, namespace, container.name),
            spec,
        ),
        component,
    )
}

/// Renders a Service exposing the metrics port of `name`.
pub fn service(namespace: &str, component: &str, name: &str, port: u16) -> DesiredObject {
    let spec = json!({
        "selector": selector_labels(name),
        "ports": [{ "name": "metrics", "port": port, "targetPort": "metrics" }],
    });
    labelled(
        DesiredObject::new(ObjectRef::new(ObjectKind::Service, namespace, name), spec),
        component,
    )
}

/// Renders a ServiceMonitor scraping the Service of the same name.
pub fn service_monitor(namespace: &str, component: &str, name: &str) -> DesiredObject {
    let spec = json!({
        "selector": { "matchLabels": selector_labels(name) },
        "endpoints": [{ "port": "metrics", "interval": "30s" }],
    });
    labelled(
        DesiredObject::new(
            ObjectRef::new(ObjectKind::ServiceMonitor, namespace, name),
            spec,
        ),
        component,
    )
}

/// Renders a custom resource for a downstream operator, carrying every
/// configured option.
pub fn delegated_resource(
    kind: ObjectKind,
    namespace: &str,
    component: &str,
    name: &str,
    replicas: u32,
    options: &ComponentOptions,
    default_retention: Option<&str>,
) -> DesiredObject {
    let mut spec = Map::new();
    spec.insert("replicas".to_string(), json!(replicas));
    spec.insert("logLevel".to_string(), json!(options.log_level().as_str()));

    if let Some(retention) = options.retention.as_deref().or(default_retention) {
        spec.insert("retention".to_string(), json!(retention));
    }
    if !options.external_labels.is_empty() {
        spec.insert("externalLabels".to_string(), json!(options.external_labels));
    }
    if !options.remote_write.is_empty() {
        let endpoints: Vec<Value> = options
            .remote_write
            .iter()
            .map(|r| json!({ "url": r.url }))
            .collect();
        spec.insert("remoteWrite".to_string(), Value::Array(endpoints));
    }
    spec.insert("resources".to_string(), requests_value(&options.requests()));
    spec.insert(
        "tolerations".to_string(),
        tolerations_value(&options.tolerations),
    );
    if let Some(template) = &options.volume_claim_template {
        let mut claim = Map::new();
        if let Some(class) = &template.spec.storage_class_name {
            claim.insert("storageClassName".to_string(), json!(class));
        }
        if let Some(storage) = template.storage() {
            claim.insert(
                "resources".to_string(),
                json!({ "requests": { "storage": storage } }),
            );
        }
        spec.insert(
            "storage".to_string(),
            json!({ "volumeClaimTemplate": { "spec": claim } }),
        );
    }

    labelled(
        DesiredObject::new(ObjectRef::new(kind, namespace, name), Value::Object(spec)),
        component,
    )
}
