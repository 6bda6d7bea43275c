//! Monitoring stack configuration: sources, parsing, validation and
//! change watching.

pub mod error;
pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;
pub mod watcher;

pub use error::{ConfigError, DocumentKind, FieldError, Position};
pub use loader::ConfigLoader;
pub use schema::{
    ComponentName, ComponentOptions, LogLevel, OptionField, RemoteWriteSpec, ResourceRequests,
    ResourceRequirements, Toleration, TolerationOperator, ValidatedConfig, VolumeClaimTemplate,
};
pub use source::{
    ConfigSnapshot, ConfigSource, DirectoryConfigSource, InMemoryConfigSource, RawConfig,
};
pub use validation::ConfigValidator;
pub use watcher::ConfigWatcher;
