//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while reading or validating sift configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The config file extension is not one we know how to parse.
    #[error("Unsupported config file format: {0}. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat(String),

    /// A referenced environment variable is not set.
    #[error("Environment variable '{0}' is not set")]
    MissingEnv(String),

    /// A scope name outside the known set.
    #[error("Unknown scope '{0}' (expected discover, event, or ingestion)")]
    UnknownScope(String),

    /// The configuration parsed but is not usable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias using `ConfigError`.
pub type Result<T> = std::result::Result<T, ConfigError>;
