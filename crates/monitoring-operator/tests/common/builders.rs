//! Builders for configuration documents.
//!
//! Tests describe configuration as JSON values and render them to YAML, so
//! a typo in a test shows up as a config error rather than a YAML syntax
//! error.

#![allow(dead_code)]

use serde_json::{json, Map, Value};

/// Builder for a single component section.
#[derive(Debug, Clone, Default)]
pub struct ComponentBuilder {
    fields: Map<String, Value>,
}

impl ComponentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.fields.insert("logLevel".to_string(), json!(level));
        self
    }

    pub fn retention(mut self, retention: &str) -> Self {
        self.fields.insert("retention".to_string(), json!(retention));
        self
    }

    pub fn requests(mut self, cpu: &str, memory: &str) -> Self {
        self.fields.insert(
            "resources".to_string(),
            json!({ "requests": { "cpu": cpu, "memory": memory } }),
        );
        self
    }

    /// Adds a toleration with the given operator and no key.
    pub fn toleration(mut self, operator: &str) -> Self {
        let tolerations = self
            .fields
            .entry("tolerations".to_string())
            .or_insert_with(|| json!([]));
        if let Value::Array(items) = tolerations {
            items.push(json!({ "operator": operator }));
        }
        self
    }

    pub fn external_label(mut self, key: &str, value: &str) -> Self {
        let labels = self
            .fields
            .entry("externalLabels".to_string())
            .or_insert_with(|| json!({}));
        if let Value::Object(map) = labels {
            map.insert(key.to_string(), json!(value));
        }
        self
    }

    pub fn remote_write(mut self, url: &str) -> Self {
        let endpoints = self
            .fields
            .entry("remoteWrite".to_string())
            .or_insert_with(|| json!([]));
        if let Value::Array(items) = endpoints {
            items.push(json!({ "url": url }));
        }
        self
    }

    pub fn storage(mut self, size: &str) -> Self {
        self.fields.insert(
            "volumeClaimTemplate".to_string(),
            json!({ "spec": { "resources": { "requests": { "storage": size } } } }),
        );
        self
    }

    /// Sets an arbitrary field, for tests of invalid input.
    pub fn raw(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Builder for a base or overlay configuration document.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    root: Map<String, Value>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_user_workload(mut self, enabled: bool) -> Self {
        self.root
            .insert("enableUserWorkload".to_string(), json!(enabled));
        self
    }

    /// Sets the section for `key`, e.g. `prometheusK8s` or `prometheus`.
    pub fn component(mut self, key: &str, section: ComponentBuilder) -> Self {
        self.root.insert(key.to_string(), section.build());
        self
    }

    pub fn raw(mut self, key: &str, value: Value) -> Self {
        self.root.insert(key.to_string(), value);
        self
    }

    /// Renders the document as YAML text.
    pub fn to_yaml(&self) -> String {
        if self.root.is_empty() {
            return String::new();
        }
        serde_yaml::to_string(&self.root).expect("config document serializes")
    }
}
