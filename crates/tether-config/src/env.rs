//! Environment variable overrides.

use crate::config::{Config, LogLevel};
use crate::error::ConfigError;

/// Disables file-level breakpoint line checks when set to a false value.
///
/// Useful for tests that set breakpoints on synthetic, non-existent paths.
pub const BREAKPOINT_VALIDATION_VAR: &str = "TETHER_BREAKPOINT_VALIDATION";

/// Overrides `log.level`.
pub const LOG_LEVEL_VAR: &str = "TETHER_LOG_LEVEL";

/// Apply every recognised `TETHER_*` variable to `config`.
///
/// # Errors
///
/// Returns [`ConfigError::Env`] when a variable is set to a value that
/// cannot be interpreted.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_overrides(config, |var| std::env::var(var).ok())
}

/// [`apply_env_overrides`] with an explicit variable lookup.
pub fn apply_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(BREAKPOINT_VALIDATION_VAR) {
        config.breakpoints.validate_lines = parse_toggle(BREAKPOINT_VALIDATION_VAR, &value)?;
    }
    if let Some(value) = lookup(LOG_LEVEL_VAR) {
        config.log.level = parse_log_level(LOG_LEVEL_VAR, &value)?;
    }
    Ok(())
}

/// Interpret a boolean-ish environment value.
pub fn parse_toggle(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::Env {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_log_level(var: &str, value: &str) -> Result<LogLevel, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" | "warning" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        _ => Err(ConfigError::Env {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}
