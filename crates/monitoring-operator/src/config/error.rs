//! Configuration error types.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Which of the two configuration documents an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    /// The cluster-wide base document.
    Base,
    /// The user-workload overlay document.
    Overlay,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Base => write!(f, "cluster monitoring"),
            DocumentKind::Overlay => write!(f, "user workload monitoring"),
        }
    }
}

/// A 1-based line/column position inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `prometheusK8s.retention`.
    pub path: String,
    /// Human-readable description of what is wrong.
    pub reason: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Errors produced while fetching, parsing or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Failed to parse {document} configuration at {}: {message}",
        .position.map_or_else(|| "unknown position".to_string(), |p| p.to_string())
    )]
    ParseYaml {
        document: DocumentKind,
        position: Option<Position>,
        message: String,
    },

    #[error("Unknown field '{path}' in {document} configuration")]
    UnknownField { document: DocumentKind, path: String },

    #[error("Field '{path}' in {document} configuration must be {expected}")]
    TypeMismatch {
        document: DocumentKind,
        path: String,
        expected: &'static str,
    },

    #[error("Field '{path}' can only be set in the cluster monitoring configuration")]
    LockedField { path: String },

    #[error("Field '{path}' is not configurable in the {document} configuration")]
    NotEntitled { document: DocumentKind, path: String },

    #[error(
        "Invalid {document} configuration: {}",
        .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    Validation {
        document: DocumentKind,
        errors: Vec<FieldError>,
    },

    #[error("Failed to read configuration file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch error: {0}")]
    WatchError(String),
}

impl ConfigError {
    /// Returns true for malformed documents, as opposed to schema violations.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, ConfigError::ParseYaml { .. })
    }

    /// The dotted path of the first offending field, if the error names one.
    pub fn field_path(&self) -> Option<&str> {
        match self {
            ConfigError::UnknownField { path, .. }
            | ConfigError::TypeMismatch { path, .. }
            | ConfigError::LockedField { path }
            | ConfigError::NotEntitled { path, .. } => Some(path),
            ConfigError::Validation { errors, .. } => errors.first().map(|e| e.path.as_str()),
            _ => None,
        }
    }

    /// The parse position, for malformed documents.
    pub fn position(&self) -> Option<Position> {
        match self {
            ConfigError::ParseYaml { position, .. } => *position,
            _ => None,
        }
    }

    pub(crate) fn from_yaml(document: DocumentKind, err: &serde_yaml::Error) -> Self {
        ConfigError::ParseYaml {
            document,
            position: err.location().map(|loc| Position {
                line: loc.line(),
                column: loc.column(),
            }),
            message: err.to_string(),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
