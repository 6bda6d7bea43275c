//! Value-level validation of component option groups.
//!
//! Structural checks (unknown keys, types, entitlement) happen in the
//! loader. This validator checks the values themselves and collects every
//! problem before reporting, so a user sees all mistakes at once.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::error::{ConfigError, DocumentKind, FieldError, Result};
use super::schema::{ComponentName, ComponentOptions, TolerationOperator};

// Platform resource quantities such as `100m`, `3Mi`, `2Gi` or `0.5`.
static RE_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(m|k|M|G|T|P|E|Ki|Mi|Gi|Ti|Pi|Ei)?$")
        .expect("quantity pattern is valid")
});

// Prometheus durations such as `10h`, `15d` or `1h30m`.
static RE_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(ms|s|m|h|d|w|y))+$").expect("duration pattern is valid")
});

static RE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.\-]+(:[0-9]+)?(/\S*)?$").expect("url pattern is valid")
});

// Label names follow the Prometheus data model.
static RE_LABEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label pattern is valid"));

/// Validator for component option values.
pub struct ConfigValidator {
    /// Collected validation errors.
    errors: Vec<FieldError>,
}

impl ConfigValidator {
    /// Creates a new validator.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Validates every component section of one document.
    pub fn validate(
        &mut self,
        document: DocumentKind,
        components: &BTreeMap<ComponentName, ComponentOptions>,
    ) -> Result<()> {
        self.errors.clear();

        for (component, options) in components {
            self.validate_component(*component, options);
        }

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation {
                document,
                errors: self.errors.clone(),
            })
        }
    }

    fn validate_component(&mut self, component: ComponentName, options: &ComponentOptions) {
        let prefix = component.config_key();

        if let Some(resources) = &options.resources {
            if let Some(cpu) = &resources.requests.cpu {
                self.check_quantity(&format!("{prefix}.resources.requests.cpu"), cpu);
            }
            if let Some(memory) = &resources.requests.memory {
                self.check_quantity(&format!("{prefix}.resources.requests.memory"), memory);
            }
        }

        for (i, toleration) in options.tolerations.iter().enumerate() {
            let path = format!("{prefix}.tolerations[{i}]");
            match toleration.operator {
                TolerationOperator::Exists if toleration.value.is_some() => {
                    self.push(format!("{path}.value"), "must be empty when operator is Exists");
                }
                TolerationOperator::Equal if toleration.key.is_none() => {
                    self.push(format!("{path}.key"), "is required when operator is Equal");
                }
                _ => {}
            }
            if let Some(seconds) = &toleration.toleration_seconds {
                if seconds.parse::<i64>().is_err() {
                    self.push(
                        format!("{path}.tolerationSeconds"),
                        format!("'{seconds}' is not an integer"),
                    );
                }
            }
        }

        if let Some(retention) = &options.retention {
            if !RE_DURATION.is_match(retention) {
                self.push(
                    format!("{prefix}.retention"),
                    format!("'{retention}' is not a valid duration (e.g. 10h, 15d)"),
                );
            }
        }

        for name in options.external_labels.keys() {
            if !RE_LABEL_NAME.is_match(name) {
                self.push(
                    format!("{prefix}.externalLabels.{name}"),
                    "is not a valid label name",
                );
            }
        }

        for (i, remote) in options.remote_write.iter().enumerate() {
            if !RE_URL.is_match(&remote.url) {
                self.push(
                    format!("{prefix}.remoteWrite[{i}].url"),
                    format!("'{}' is not an http(s) URL", remote.url),
                );
            }
        }

        if let Some(template) = &options.volume_claim_template {
            match template.storage() {
                Some(storage) => self.check_quantity(
                    &format!("{prefix}.volumeClaimTemplate.spec.resources.requests.storage"),
                    storage,
                ),
                None => self.push(
                    format!("{prefix}.volumeClaimTemplate.spec.resources.requests.storage"),
                    "is required when a volume claim template is set",
                ),
            }
        }
    }

    fn check_quantity(&mut self, path: &str, value: &str) {
        if !RE_QUANTITY.is_match(value) {
            self.push(path, format!("'{value}' is not a valid quantity"));
        }
    }

    fn push(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(FieldError::new(path, reason));
    }

    /// Returns the errors collected by the last validation.
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
