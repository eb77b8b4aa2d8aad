//! Error types for cascade.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Startup validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // Manual triggers
    #[error("Unknown builder: {0}")]
    UnknownBuilder(String),

    #[error("Manual dispatch requires at least one builder")]
    NoBuildersRequested,

    #[error("Manual dispatch requires a revision")]
    MissingRevision,

    // Delivery to the build executor
    #[error("Dispatch delivery failed: {0}")]
    Dispatch(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Configuration problems detected while loading the scheduler registry.
///
/// Every variant is fatal at startup: no partially validated registry is
/// ever activated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Scheduler at position {index} has an empty name")]
    EmptyName { index: usize },

    #[error("Scheduler '{0}' is defined more than once")]
    DuplicateScheduler(String),

    #[error("Scheduler '{0}' does not list any builders")]
    NoBuilders(String),

    #[error("Scheduler '{scheduler}' references unknown upstream '{upstream}'")]
    UnknownUpstream { scheduler: String, upstream: String },

    #[error("Dependency cycle between schedulers: {}", schedulers.join(" -> "))]
    DependencyCycle { schedulers: Vec<String> },

    #[error("Invalid pattern '{pattern}' in {context}: {message}")]
    InvalidPattern {
        context: String,
        pattern: String,
        message: String,
    },

    #[error("Invalid setting {setting}: {message}")]
    InvalidSetting { setting: String, message: String },
}

impl ConfigError {
    /// The scheduler names this error is about, if any.
    pub fn schedulers(&self) -> Vec<&str> {
        match self {
            ConfigError::DuplicateScheduler(name) | ConfigError::NoBuilders(name) => {
                vec![name.as_str()]
            }
            ConfigError::UnknownUpstream { scheduler, .. } => vec![scheduler.as_str()],
            ConfigError::DependencyCycle { schedulers } => {
                schedulers.iter().map(String::as_str).collect()
            }
            _ => vec![],
        }
    }
}
