//! Typed configuration tree for the monitoring stack.
//!
//! Both configuration documents share one option-group type,
//! [`ComponentOptions`]. Which option fields a component accepts, and which
//! document may configure it, is described by [`ComponentName`] and checked
//! by the loader before deserialization.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DocumentKind;

/// Top-level key that enables the user-workload subsystem.
pub const ENABLE_USER_WORKLOAD_KEY: &str = "enableUserWorkload";

/// Every component the operator manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentName {
    PrometheusOperator,
    PrometheusK8s,
    AlertmanagerMain,
    KubeStateMetrics,
    OpenshiftStateMetrics,
    NodeExporter,
    ThanosQuerier,
    Grafana,
    TelemeterClient,
    PrometheusAdapter,
    UserWorkloadPrometheusOperator,
    UserWorkloadPrometheus,
    UserWorkloadThanosRuler,
}

impl ComponentName {
    /// Returns all components.
    pub fn all() -> &'static [ComponentName] {
        &[
            ComponentName::PrometheusOperator,
            ComponentName::PrometheusK8s,
            ComponentName::AlertmanagerMain,
            ComponentName::KubeStateMetrics,
            ComponentName::OpenshiftStateMetrics,
            ComponentName::NodeExporter,
            ComponentName::ThanosQuerier,
            ComponentName::Grafana,
            ComponentName::TelemeterClient,
            ComponentName::PrometheusAdapter,
            ComponentName::UserWorkloadPrometheusOperator,
            ComponentName::UserWorkloadPrometheus,
            ComponentName::UserWorkloadThanosRuler,
        ]
    }

    /// The component's task name, also used in status messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentName::PrometheusOperator => "prometheus-operator",
            ComponentName::PrometheusK8s => "prometheus-k8s",
            ComponentName::AlertmanagerMain => "alertmanager-main",
            ComponentName::KubeStateMetrics => "kube-state-metrics",
            ComponentName::OpenshiftStateMetrics => "openshift-state-metrics",
            ComponentName::NodeExporter => "node-exporter",
            ComponentName::ThanosQuerier => "thanos-querier",
            ComponentName::Grafana => "grafana",
            ComponentName::TelemeterClient => "telemeter-client",
            ComponentName::PrometheusAdapter => "prometheus-adapter",
            ComponentName::UserWorkloadPrometheusOperator => "prometheus-operator-user-workload",
            ComponentName::UserWorkloadPrometheus => "prometheus-user-workload",
            ComponentName::UserWorkloadThanosRuler => "thanos-ruler-user-workload",
        }
    }

    /// The key under which the component is configured in its document.
    pub fn config_key(&self) -> &'static str {
        match self {
            ComponentName::PrometheusOperator => "prometheusOperator",
            ComponentName::PrometheusK8s => "prometheusK8s",
            ComponentName::AlertmanagerMain => "alertmanagerMain",
            ComponentName::KubeStateMetrics => "kubeStateMetrics",
            ComponentName::OpenshiftStateMetrics => "openshiftStateMetrics",
            ComponentName::NodeExporter => "nodeExporter",
            ComponentName::ThanosQuerier => "thanosQuerier",
            ComponentName::Grafana => "grafana",
            ComponentName::TelemeterClient => "telemeterClient",
            ComponentName::PrometheusAdapter => "k8sPrometheusAdapter",
            ComponentName::UserWorkloadPrometheusOperator => "prometheusOperator",
            ComponentName::UserWorkloadPrometheus => "prometheus",
            ComponentName::UserWorkloadThanosRuler => "thanosRuler",
        }
    }

    /// The document that configures this component.
    pub fn document(&self) -> DocumentKind {
        match self {
            ComponentName::UserWorkloadPrometheusOperator
            | ComponentName::UserWorkloadPrometheus
            | ComponentName::UserWorkloadThanosRuler => DocumentKind::Overlay,
            _ => DocumentKind::Base,
        }
    }

    /// Returns true if the component belongs to the user-workload subsystem.
    pub fn is_user_workload(&self) -> bool {
        self.document() == DocumentKind::Overlay
    }

    /// Finds the component configured by `key` in `document`.
    pub fn from_config_key(document: DocumentKind, key: &str) -> Option<ComponentName> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.document() == document && c.config_key() == key)
    }

    /// The option fields this component accepts.
    pub fn options(&self) -> &'static [OptionField] {
        use OptionField::*;
        match self {
            ComponentName::PrometheusK8s | ComponentName::UserWorkloadPrometheus => &[
                LogLevel,
                Resources,
                Tolerations,
                Retention,
                ExternalLabels,
                RemoteWrite,
                VolumeClaimTemplate,
            ],
            ComponentName::AlertmanagerMain => {
                &[LogLevel, Resources, Tolerations, VolumeClaimTemplate]
            }
            ComponentName::UserWorkloadThanosRuler => &[
                LogLevel,
                Resources,
                Tolerations,
                Retention,
                VolumeClaimTemplate,
            ],
            ComponentName::PrometheusOperator
            | ComponentName::UserWorkloadPrometheusOperator
            | ComponentName::ThanosQuerier => &[LogLevel, Resources, Tolerations],
            ComponentName::KubeStateMetrics
            | ComponentName::OpenshiftStateMetrics
            | ComponentName::NodeExporter
            | ComponentName::Grafana
            | ComponentName::TelemeterClient
            | ComponentName::PrometheusAdapter => &[Resources, Tolerations],
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized option inside a component section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionField {
    LogLevel,
    Resources,
    Tolerations,
    Retention,
    ExternalLabels,
    RemoteWrite,
    VolumeClaimTemplate,
}

impl OptionField {
    pub fn all() -> &'static [OptionField] {
        &[
            OptionField::LogLevel,
            OptionField::Resources,
            OptionField::Tolerations,
            OptionField::Retention,
            OptionField::ExternalLabels,
            OptionField::RemoteWrite,
            OptionField::VolumeClaimTemplate,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            OptionField::LogLevel => "logLevel",
            OptionField::Resources => "resources",
            OptionField::Tolerations => "tolerations",
            OptionField::Retention => "retention",
            OptionField::ExternalLabels => "externalLabels",
            OptionField::RemoteWrite => "remoteWrite",
            OptionField::VolumeClaimTemplate => "volumeClaimTemplate",
        }
    }

    pub fn from_key(key: &str) -> Option<OptionField> {
        Self::all().iter().copied().find(|f| f.key() == key)
    }

    /// The structural shape the field's value must have.
    pub fn shape(&self) -> &'static Shape {
        match self {
            OptionField::LogLevel => &LOG_LEVEL_SHAPE,
            OptionField::Resources => &RESOURCES_SHAPE,
            OptionField::Tolerations => &TOLERATIONS_SHAPE,
            OptionField::Retention => &Shape::Scalar,
            OptionField::ExternalLabels => &Shape::StringMap,
            OptionField::RemoteWrite => &REMOTE_WRITE_SHAPE,
            OptionField::VolumeClaimTemplate => &VOLUME_CLAIM_SHAPE,
        }
    }
}

/// Structural description of a configuration value.
#[derive(Debug)]
pub enum Shape {
    /// A string or a number; numbers are normalized to strings.
    Scalar,
    /// A string restricted to a fixed set of values.
    OneOf(&'static [&'static str]),
    /// Free-form string to string mapping.
    StringMap,
    /// Mapping with a closed set of keys.
    Object(&'static [(&'static str, Shape)]),
    /// Sequence of values of one shape.
    List(&'static Shape),
}

const LOG_LEVEL_SHAPE: Shape = Shape::OneOf(&["error", "warn", "info", "debug"]);

const RESOURCES_SHAPE: Shape = Shape::Object(&[(
    "requests",
    Shape::Object(&[("cpu", Shape::Scalar), ("memory", Shape::Scalar)]),
)]);

const TOLERATION_SHAPE: Shape = Shape::Object(&[
    ("key", Shape::Scalar),
    ("operator", Shape::OneOf(&["Exists", "Equal"])),
    ("value", Shape::Scalar),
    (
        "effect",
        Shape::OneOf(&["NoSchedule", "PreferNoSchedule", "NoExecute"]),
    ),
    ("tolerationSeconds", Shape::Scalar),
]);

const TOLERATIONS_SHAPE: Shape = Shape::List(&TOLERATION_SHAPE);

const REMOTE_WRITE_SHAPE: Shape = Shape::List(&Shape::Object(&[("url", Shape::Scalar)]));

const VOLUME_CLAIM_SHAPE: Shape = Shape::Object(&[(
    "spec",
    Shape::Object(&[
        ("storageClassName", Shape::Scalar),
        (
            "resources",
            Shape::Object(&[("requests", Shape::Object(&[("storage", Shape::Scalar)]))]),
        ),
    ]),
)]);

/// Log verbosity understood by every component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container resource requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceRequests,
}

/// Toleration operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TolerationOperator {
    Exists,
    #[default]
    Equal,
}

/// Pod toleration, copied verbatim into every pod template of a component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub operator: TolerationOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<String>,
}

/// Remote-write endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWriteSpec {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRequests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageResources {
    #[serde(default)]
    pub requests: StorageRequests,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(default)]
    pub resources: StorageResources,
}

/// Persistent volume claim template for stateful components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeClaimTemplate {
    #[serde(default)]
    pub spec: VolumeClaimSpec,
}

impl VolumeClaimTemplate {
    /// The requested storage size, if any.
    pub fn storage(&self) -> Option<&str> {
        self.spec.resources.requests.storage.as_deref()
    }
}

/// Option group for a single component. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_write: Vec<RemoteWriteSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<VolumeClaimTemplate>,
}

impl ComponentOptions {
    /// The configured log level, or `info`.
    pub fn log_level(&self) -> LogLevel {
        self.log_level.unwrap_or_default()
    }

    /// The configured resource requests, or none.
    pub fn requests(&self) -> ResourceRequests {
        self.resources
            .as_ref()
            .map(|r| r.requests.clone())
            .unwrap_or_default()
    }
}

/// Fully validated configuration, one option group per component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedConfig {
    /// Whether the user-workload subsystem is enabled. Only the base
    /// document may set this.
    pub enable_user_workload: bool,

    components: BTreeMap<ComponentName, ComponentOptions>,

    /// Revision of the base document this config was built from.
    pub base_revision: String,

    /// Revision of the overlay document, if one was merged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_revision: Option<String>,
}

impl ValidatedConfig {
    pub(crate) fn new(
        enable_user_workload: bool,
        mut components: BTreeMap<ComponentName, ComponentOptions>,
        base_revision: String,
        overlay_revision: Option<String>,
    ) -> Self {
        for component in ComponentName::all() {
            components.entry(*component).or_default();
        }
        Self {
            enable_user_workload,
            components,
            base_revision,
            overlay_revision,
        }
    }

    /// The all-defaults configuration produced by empty documents.
    pub fn defaults() -> Self {
        Self::new(false, BTreeMap::new(), String::new(), None)
    }

    /// Returns the option group for `component`. Absent sections hold defaults.
    pub fn component(&self, component: ComponentName) -> &ComponentOptions {
        static EMPTY: std::sync::LazyLock<ComponentOptions> =
            std::sync::LazyLock::new(ComponentOptions::default);
        self.components.get(&component).unwrap_or(&EMPTY)
    }

    /// Iterates over every component's options.
    pub fn components(&self) -> impl Iterator<Item = (ComponentName, &ComponentOptions)> {
        self.components.iter().map(|(name, opts)| (*name, opts))
    }

    /// Combined revision string for logging.
    pub fn revision(&self) -> String {
        match &self.overlay_revision {
            Some(overlay) => format!("{}+{}", self.base_revision, overlay),
            None => self.base_revision.clone(),
        }
    }

    /// Returns true if both configs would render the same desired state.
    pub fn same_settings(&self, other: &ValidatedConfig) -> bool {
        self.enable_user_workload == other.enable_user_workload
            && self.components == other.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_keys_are_unique_per_document() {
        for document in [DocumentKind::Base, DocumentKind::Overlay] {
            let mut seen = std::collections::HashSet::new();
            for component in ComponentName::all().iter().filter(|c| c.document() == document) {
                assert!(seen.insert(component.config_key()), "{}", component);
            }
        }
    }

    #[test]
    fn test_from_config_key_respects_document() {
        assert_eq!(
            ComponentName::from_config_key(DocumentKind::Base, "prometheusOperator"),
            Some(ComponentName::PrometheusOperator)
        );
        assert_eq!(
            ComponentName::from_config_key(DocumentKind::Overlay, "prometheusOperator"),
            Some(ComponentName::UserWorkloadPrometheusOperator)
        );
        assert_eq!(
            ComponentName::from_config_key(DocumentKind::Overlay, "prometheusK8s"),
            None
        );
    }

    #[test]
    fn test_defaults_cover_every_component() {
        let config = ValidatedConfig::defaults();
        assert!(!config.enable_user_workload);
        assert_eq!(config.components().count(), ComponentName::all().len());
        assert_eq!(
            config.component(ComponentName::Grafana).log_level(),
            LogLevel::Info
        );
    }

    #[test]
    fn test_retention_only_on_prometheus_backed_components() {
        assert!(ComponentName::PrometheusK8s
            .options()
            .contains(&OptionField::Retention));
        assert!(!ComponentName::AlertmanagerMain
            .options()
            .contains(&OptionField::Retention));
    }
}
