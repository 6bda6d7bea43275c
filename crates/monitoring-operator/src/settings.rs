//! Operator process settings.
//!
//! These describe how the operator itself runs (namespaces, loop timing),
//! not the monitoring stack configuration it reconciles.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_NAMESPACE: &str = "MONITORING_OPERATOR_NAMESPACE";
pub const ENV_USER_WORKLOAD_NAMESPACE: &str = "MONITORING_OPERATOR_USER_WORKLOAD_NAMESPACE";
pub const ENV_RESYNC_SECS: &str = "MONITORING_OPERATOR_RESYNC_SECS";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

fn default_namespace() -> String {
    "openshift-monitoring".to_string()
}

fn default_user_workload_namespace() -> String {
    "openshift-user-workload-monitoring".to_string()
}

fn default_resync_interval_secs() -> u64 {
    15 * 60
}

fn default_min_backoff_secs() -> u64 {
    5
}

fn default_max_backoff_secs() -> u64 {
    5 * 60
}

fn default_iteration_deadline_secs() -> u64 {
    5 * 60
}

/// Timing of the reconcile loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    /// Delay between periodic resyncs after a successful iteration.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    /// First retry delay after a failed iteration.
    #[serde(default = "default_min_backoff_secs")]
    pub min_backoff_secs: u64,

    /// Upper bound for the retry delay.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Shared deadline for all rollout waits of one iteration.
    #[serde(default = "default_iteration_deadline_secs")]
    pub iteration_deadline_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval_secs(),
            min_backoff_secs: default_min_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            iteration_deadline_secs: default_iteration_deadline_secs(),
        }
    }
}

impl LoopConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn min_backoff(&self) -> Duration {
        Duration::from_secs(self.min_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn iteration_deadline(&self) -> Duration {
        Duration::from_secs(self.iteration_deadline_secs)
    }
}

/// Settings for one operator process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSettings {
    /// Namespace of the cluster monitoring stack.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Namespace of the user-workload monitoring stack.
    #[serde(default = "default_user_workload_namespace")]
    pub user_workload_namespace: String,

    #[serde(default, rename = "loop")]
    pub loop_config: LoopConfig,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            user_workload_namespace: default_user_workload_namespace(),
            loop_config: LoopConfig::default(),
        }
    }
}

impl OperatorSettings {
    /// Parses settings from YAML. Missing fields take their defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Applies overrides from `MONITORING_OPERATOR_*` environment variables.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(namespace) = env_value(ENV_NAMESPACE) {
            self.namespace = namespace;
        }
        if let Some(namespace) = env_value(ENV_USER_WORKLOAD_NAMESPACE) {
            self.user_workload_namespace = namespace;
        }
        if let Some(value) = env_value(ENV_RESYNC_SECS) {
            self.loop_config.resync_interval_secs =
                value.parse().map_err(|_| SettingsError::InvalidEnv {
                    name: ENV_RESYNC_SECS,
                    value: value.clone(),
                })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || self.user_workload_namespace.is_empty() {
            return Err(SettingsError::Invalid(
                "namespaces must not be empty".to_string(),
            ));
        }
        if self.namespace == self.user_workload_namespace {
            return Err(SettingsError::Invalid(
                "namespace and userWorkloadNamespace must differ".to_string(),
            ));
        }
        let timing = &self.loop_config;
        if timing.min_backoff_secs == 0 || timing.min_backoff_secs > timing.max_backoff_secs {
            return Err(SettingsError::Invalid(format!(
                "backoff bounds [{}s, {}s] are invalid",
                timing.min_backoff_secs, timing.max_backoff_secs
            )));
        }
        if timing.resync_interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "resyncIntervalSecs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
