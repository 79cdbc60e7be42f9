//! Error types for cellpilot-core

use thiserror::Error;

/// Result type alias using cellpilot-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for cellpilot
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// A retry policy parameter is out of range
    #[error("Invalid retry policy: {field} {reason}")]
    InvalidRetryPolicy { field: String, reason: String },

    /// Unknown task name
    #[error("Unknown task: {task}")]
    UnknownTask { task: String },

    /// A failure record could not be persisted
    #[error("Failed to write failure report to {path}: {source}")]
    ReportWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid retry policy error
    pub fn invalid_retry_policy(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRetryPolicy {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown task error
    pub fn unknown_task(task: impl Into<String>) -> Self {
        Self::UnknownTask { task: task.into() }
    }

    /// Create a report write error
    pub fn report_write(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::ReportWrite {
            path: path.into(),
            source,
        }
    }
}
