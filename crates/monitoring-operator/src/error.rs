use thiserror::Error;

use crate::config::ConfigError;
use crate::platform::PlatformError;
use crate::rollout::RolloutError;
use crate::settings::SettingsError;
use crate::tasks::RegistryError;
use crate::telemetry::TelemetryError;

/// Any error surfaced by the operator's public entry points.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Task registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Rollout error: {0}")]
    Rollout(#[from] RolloutError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl OperatorError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OperatorError::Platform(e) => e.is_retryable(),
            OperatorError::Rollout(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let unavailable: OperatorError = PlatformError::Unavailable("api down".into()).into();
        assert!(unavailable.is_retryable());

        let cycle: OperatorError = RegistryError::Cycle("a".into()).into();
        assert!(!cycle.is_retryable());
        assert!(cycle.to_string().starts_with("Task registry error"));
    }
}
