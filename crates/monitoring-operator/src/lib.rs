//! Configuration reconciliation engine for a cluster monitoring stack.
//!
//! A [`ReconcileLoop`] repeatedly validates the base and user-workload
//! configuration documents, applies the component tasks in dependency
//! order, waits for workloads to roll out and publishes the resulting
//! health conditions.

pub mod config;
pub mod controller;
pub mod error;
pub mod operator;
pub mod platform;
pub mod rollout;
pub mod settings;
pub mod status;
pub mod tasks;
pub mod telemetry;

pub use config::{ConfigError, ConfigLoader, ConfigSource, RawConfig, ValidatedConfig};
pub use controller::{IterationReport, ReconcileLoop, ReconcileState, Reconciler, Trigger};
pub use error::{OperatorError, Result};
pub use operator::Operator;
pub use platform::{InMemoryPlatform, PlatformClient, PlatformError};
pub use rollout::{RolloutError, RolloutTarget, RolloutWaiter};
pub use settings::{LoopConfig, OperatorSettings, SettingsError};
pub use status::{Condition, ConditionStatus, ConditionType, IterationOutcome, StatusReporter};
pub use tasks::{ComponentTask, RegistryError, TaskRegistry};
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
