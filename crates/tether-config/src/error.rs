use thiserror::Error;

/// Errors raised while loading, merging or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the default config file.
    #[error("failed to create default config: {0}")]
    CreateDefault(String),

    /// TOML parsing failed.
    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A config value failed validation.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The dotted field path (e.g. `health.max_consecutive_failures`).
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// An environment override could not be interpreted.
    #[error("invalid value for {var}: {value:?}")]
    Env {
        /// Name of the environment variable.
        var: String,
        /// The rejected value.
        value: String,
    },

    /// An I/O error occurred while reading or writing config files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
