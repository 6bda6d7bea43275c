//! Parses and validates the base and overlay configuration documents.
//!
//! Loading is pure: the loader keeps no state between calls and has no
//! side effects. A document goes through three stages:
//!
//! 1. YAML parsing (errors carry a line/column position)
//! 2. Structural checking against the component schema (errors carry the
//!    dotted path of the offending field)
//! 3. Value validation via [`ConfigValidator`]

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use super::error::{ConfigError, DocumentKind, Result};
use super::schema::{
    ComponentName, ComponentOptions, OptionField, Shape, ValidatedConfig,
    ENABLE_USER_WORKLOAD_KEY,
};
use super::source::RawConfig;
use super::validation::ConfigValidator;

/// A single parsed and checked document.
#[derive(Debug, Clone, Default)]
struct ParsedDocument {
    enable_user_workload: Option<bool>,
    components: BTreeMap<ComponentName, ComponentOptions>,
}

/// Configuration loader for the monitoring stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Creates a new config loader.
    pub fn new() -> Self {
        Self
    }

    /// Loads the base document and, when the user-workload subsystem is
    /// enabled, merges the overlay document over it.
    ///
    /// The overlay is not read at all while the subsystem is disabled, so a
    /// broken overlay cannot degrade a cluster that does not use it.
    pub fn load(&self, base: &RawConfig, overlay: Option<&RawConfig>) -> Result<ValidatedConfig> {
        let base_doc = self.parse_document(DocumentKind::Base, &base.content)?;
        let enable_user_workload = base_doc.enable_user_workload.unwrap_or(false);

        let mut components = base_doc.components;
        let mut overlay_revision = None;

        if enable_user_workload {
            if let Some(overlay) = overlay {
                let overlay_doc = self.parse_document(DocumentKind::Overlay, &overlay.content)?;
                components.extend(overlay_doc.components);
                overlay_revision = Some(overlay.revision.clone());
            }
        } else if overlay.is_some() {
            log::debug!("User workload monitoring disabled, ignoring overlay configuration");
        }

        Ok(ValidatedConfig::new(
            enable_user_workload,
            components,
            base.revision.clone(),
            overlay_revision,
        ))
    }

    /// Loads a base document on its own.
    pub fn load_str(&self, base: &str) -> Result<ValidatedConfig> {
        self.load(&RawConfig::new(base, ""), None)
    }

    fn parse_document(&self, document: DocumentKind, content: &str) -> Result<ParsedDocument> {
        let root: Value = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::from_yaml(document, &e))?;

        let mapping = match root {
            Value::Null => return Ok(ParsedDocument::default()),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(ConfigError::TypeMismatch {
                    document,
                    path: "<root>".to_string(),
                    expected: "a mapping",
                })
            }
        };

        let mut parsed = ParsedDocument::default();

        for (key, value) in mapping {
            let key = key_string(document, "", &key)?;

            if key == ENABLE_USER_WORKLOAD_KEY {
                if document == DocumentKind::Overlay {
                    return Err(ConfigError::LockedField { path: key });
                }
                parsed.enable_user_workload = match value {
                    Value::Null => None,
                    Value::Bool(b) => Some(b),
                    _ => {
                        return Err(ConfigError::TypeMismatch {
                            document,
                            path: key,
                            expected: "a boolean",
                        })
                    }
                };
                continue;
            }

            let component = match ComponentName::from_config_key(document, &key) {
                Some(component) => component,
                None => return Err(unrecognized_top_level(document, key)),
            };

            let options = parse_component(document, component, value)?;
            parsed.components.insert(component, options);
        }

        let mut validator = ConfigValidator::new();
        validator.validate(document, &parsed.components)?;

        Ok(parsed)
    }
}

/// Distinguishes keys that belong to the other document from plain typos.
fn unrecognized_top_level(document: DocumentKind, key: String) -> ConfigError {
    let belongs_elsewhere = ComponentName::all()
        .iter()
        .any(|c| c.document() != document && c.config_key() == key);

    if belongs_elsewhere && document == DocumentKind::Overlay {
        ConfigError::NotEntitled {
            document,
            path: key,
        }
    } else {
        ConfigError::UnknownField {
            document,
            path: key,
        }
    }
}

fn parse_component(
    document: DocumentKind,
    component: ComponentName,
    value: Value,
) -> Result<ComponentOptions> {
    let prefix = component.config_key();

    let mapping = match value {
        Value::Null => return Ok(ComponentOptions::default()),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(ConfigError::TypeMismatch {
                document,
                path: prefix.to_string(),
                expected: "a mapping",
            })
        }
    };

    let mut normalized = Mapping::new();
    for (key, value) in mapping {
        let key = key_string(document, prefix, &key)?;
        let path = format!("{prefix}.{key}");

        let field = match OptionField::from_key(&key) {
            Some(field) if component.options().contains(&field) => field,
            Some(_) => return Err(ConfigError::NotEntitled { document, path }),
            None => return Err(ConfigError::UnknownField { document, path }),
        };

        let value = normalize(document, &path, field.shape(), value)?;
        if !value.is_null() {
            normalized.insert(Value::String(key), value);
        }
    }

    serde_yaml::from_value(Value::Mapping(normalized)).map_err(|e| ConfigError::ParseYaml {
        document,
        position: None,
        message: format!("{prefix}: {e}"),
    })
}

/// Checks `value` against `shape`, returning a copy with scalars normalized
/// to strings and nulls removed.
fn normalize(document: DocumentKind, path: &str, shape: &Shape, value: Value) -> Result<Value> {
    let mismatch = |expected: &'static str| ConfigError::TypeMismatch {
        document,
        path: path.to_string(),
        expected,
    };

    match (shape, value) {
        (_, Value::Null) => Ok(Value::Null),
        (Shape::Scalar, Value::String(s)) => Ok(Value::String(s)),
        (Shape::Scalar, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (Shape::Scalar, _) => Err(mismatch("a string")),
        (Shape::OneOf(allowed), Value::String(s)) => {
            if allowed.contains(&s.as_str()) {
                Ok(Value::String(s))
            } else {
                Err(mismatch(one_of_description(allowed)))
            }
        }
        (Shape::OneOf(allowed), _) => Err(mismatch(one_of_description(allowed))),
        (Shape::StringMap, Value::Mapping(mapping)) => {
            let mut out = Mapping::new();
            for (key, value) in mapping {
                let key = key_string(document, path, &key)?;
                let entry_path = format!("{path}.{key}");
                let value = normalize(document, &entry_path, &Shape::Scalar, value)?;
                if !value.is_null() {
                    out.insert(Value::String(key), value);
                }
            }
            Ok(Value::Mapping(out))
        }
        (Shape::StringMap, _) => Err(mismatch("a mapping of strings")),
        (Shape::Object(fields), Value::Mapping(mapping)) => {
            let mut out = Mapping::new();
            for (key, value) in mapping {
                let key = key_string(document, path, &key)?;
                let field_path = format!("{path}.{key}");
                let Some((_, field_shape)) = fields.iter().find(|(name, _)| *name == key) else {
                    return Err(ConfigError::UnknownField {
                        document,
                        path: field_path,
                    });
                };
                let value = normalize(document, &field_path, field_shape, value)?;
                if !value.is_null() {
                    out.insert(Value::String(key), value);
                }
            }
            Ok(Value::Mapping(out))
        }
        (Shape::Object(_), _) => Err(mismatch("a mapping")),
        (Shape::List(item), Value::Sequence(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item_value)| normalize(document, &format!("{path}[{i}]"), item, item_value))
            .collect::<Result<Vec<_>>>()
            .map(Value::Sequence),
        (Shape::List(_), _) => Err(mismatch("a list")),
    }
}

fn key_string(document: DocumentKind, parent: &str, key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        _ => Err(ConfigError::TypeMismatch {
            document,
            path: if parent.is_empty() {
                "<root>".to_string()
            } else {
                parent.to_string()
            },
            expected: "a mapping with string keys",
        }),
    }
}

fn one_of_description(allowed: &[&str]) -> &'static str {
    match allowed {
        ["error", "warn", "info", "debug"] => "one of error, warn, info, debug",
        ["Exists", "Equal"] => "one of Exists, Equal",
        _ => "one of NoSchedule, PreferNoSchedule, NoExecute",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogLevel, TolerationOperator};

    fn raw(content: &str) -> RawConfig {
        RawConfig::new(content, "1")
    }

    #[test]
    fn test_empty_documents_yield_defaults() {
        let loader = ConfigLoader::new();
        let config = loader.load(&raw(""), None).unwrap();
        assert!(!config.enable_user_workload);
        assert_eq!(
            config.component(ComponentName::PrometheusK8s),
            &ComponentOptions::default()
        );
    }

    #[test]
    fn test_full_prometheus_section() {
        let config = ConfigLoader::new()
            .load_str(
                r#"prometheusK8s:
  logLevel: debug
  retention: 10h
  tolerations:
    - operator: "Exists"
  externalLabels:
    datacenter: eu-west
  remoteWrite:
  - url: "https://test.remotewrite.com/api/write"
  volumeClaimTemplate:
    spec:
      resources:
        requests:
          storage: 2Gi
  resources:
    requests:
      cpu: 1m
      memory: 3Mi
"#,
            )
            .unwrap();

        let prom = config.component(ComponentName::PrometheusK8s);
        assert_eq!(prom.log_level(), LogLevel::Debug);
        assert_eq!(prom.retention.as_deref(), Some("10h"));
        assert_eq!(prom.tolerations[0].operator, TolerationOperator::Exists);
        assert_eq!(prom.external_labels["datacenter"], "eu-west");
        assert_eq!(prom.remote_write[0].url, "https://test.remotewrite.com/api/write");
        assert_eq!(
            prom.volume_claim_template.as_ref().and_then(|t| t.storage()),
            Some("2Gi")
        );
        assert_eq!(prom.requests().cpu.as_deref(), Some("1m"));
        assert_eq!(prom.requests().memory.as_deref(), Some("3Mi"));
    }

    #[test]
    fn test_numeric_quantities_are_normalized() {
        let config = ConfigLoader::new()
            .load_str("grafana:\n  resources:\n    requests:\n      cpu: 0.5\n")
            .unwrap();
        assert_eq!(
            config.component(ComponentName::Grafana).requests().cpu.as_deref(),
            Some("0.5")
        );
    }

    #[test]
    fn test_unparseable_document_reports_position() {
        let err = ConfigLoader::new()
            .load_str("prometheusK8s:\n  retention: [10h\n")
            .unwrap_err();
        assert!(err.is_parse_error());
        assert!(err.position().is_some());
    }

    #[test]
    fn test_plain_string_document_is_rejected() {
        let err = ConfigLoader::new()
            .load_str("cannot be deserialized")
            .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let err = ConfigLoader::new()
            .load_str("prometheusK8S:\n  retention: 1d\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { .. }));
        assert_eq!(err.field_path(), Some("prometheusK8S"));
    }

    #[test]
    fn test_unknown_nested_key_names_full_path() {
        let err = ConfigLoader::new()
            .load_str("prometheusK8s:\n  resources:\n    requests:\n      gpu: 1\n")
            .unwrap_err();
        assert_eq!(err.field_path(), Some("prometheusK8s.resources.requests.gpu"));
    }

    #[test]
    fn test_option_not_supported_by_component() {
        let err = ConfigLoader::new()
            .load_str("alertmanagerMain:\n  retention: 1d\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotEntitled { .. }));
        assert_eq!(err.field_path(), Some("alertmanagerMain.retention"));
    }

    #[test]
    fn test_invalid_log_level() {
        let err = ConfigLoader::new()
            .load_str("prometheusOperator:\n  logLevel: verbose\n")
            .unwrap_err();
        assert_eq!(err.field_path(), Some("prometheusOperator.logLevel"));
        assert!(err.to_string().contains("one of error, warn, info, debug"));
    }

    #[test]
    fn test_overlay_merged_when_enabled() {
        let config = ConfigLoader::new()
            .load(
                &raw("enableUserWorkload: true\n"),
                Some(&raw("prometheus:\n  logLevel: debug\n  retention: 10h\n")),
            )
            .unwrap();
        assert!(config.enable_user_workload);
        let prom = config.component(ComponentName::UserWorkloadPrometheus);
        assert_eq!(prom.log_level(), LogLevel::Debug);
        assert_eq!(prom.retention.as_deref(), Some("10h"));
        assert_eq!(config.overlay_revision.as_deref(), Some("1"));
    }

    #[test]
    fn test_overlay_ignored_when_disabled() {
        let config = ConfigLoader::new()
            .load(&raw(""), Some(&raw("not: [valid")))
            .unwrap();
        assert!(!config.enable_user_workload);
        assert!(config.overlay_revision.is_none());
    }

    #[test]
    fn test_overlay_cannot_enable_user_workload() {
        let err = ConfigLoader::new()
            .load(
                &raw("enableUserWorkload: true\n"),
                Some(&raw("enableUserWorkload: false\n")),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::LockedField { .. }));
        assert_eq!(err.field_path(), Some("enableUserWorkload"));
    }

    #[test]
    fn test_overlay_cannot_configure_cluster_components() {
        let err = ConfigLoader::new()
            .load(
                &raw("enableUserWorkload: true\n"),
                Some(&raw("prometheusK8s:\n  logLevel: debug\n")),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotEntitled { .. }));
        assert_eq!(err.field_path(), Some("prometheusK8s"));
    }

    #[test]
    fn test_overlay_prometheus_operator_rejects_retention() {
        let err = ConfigLoader::new()
            .load(
                &raw("enableUserWorkload: true\n"),
                Some(&raw("prometheusOperator:\n  retention: 1d\n")),
            )
            .unwrap_err();
        assert_eq!(err.field_path(), Some("prometheusOperator.retention"));
    }

    #[test]
    fn test_enable_user_workload_must_be_bool() {
        let err = ConfigLoader::new()
            .load_str("enableUserWorkload: sometimes\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }
}
