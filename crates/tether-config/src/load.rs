use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::env::apply_env_overrides;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Directory name holding a project-local config file.
const PROJECT_DIR_NAME: &str = ".tether";

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# tether configuration
# Uncomment and edit settings below to override defaults.

# [client]
# client_id = "tether"
# request_timeout_secs = 30

# [health]
# max_consecutive_failures = 3
# response_timeout_secs = 30

# [receiver]
# stop_timeout_ms = 2000

# [breakpoints]
# validate_lines = true

# [adapters.python]
# adapter_id = "debugpy"
# non_executable_patterns = ['^\s*pass\s*$']

# [log]
# level = "info"
"#;

/// Load, merge and validate configuration.
///
/// 1. Reads `config_dir/config.toml`, creating it with commented-out
///    defaults when absent.
/// 2. Looks for `.tether/config.toml` from `project_dir` upward.
/// 3. Merges `Config::default() <- global <- project`.
/// 4. Applies environment overrides.
/// 5. Validates the result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O, parse, override or validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }

    if !global_path.exists() {
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!("merging project config {}", project_path.display());
        let project_content = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project_content)?;
    }

    apply_env_overrides(&mut config)?;
    first_violation(&config)?;
    Ok(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// No files are touched and no environment overrides are applied.
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    first_violation(&config)?;
    Ok(config)
}

fn first_violation(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}

/// Walk from `start` upward looking for `.tether/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR_NAME).join("config.toml"))
        .find(|candidate| candidate.exists())
}

/// Returns `true` when the content has at least one
/// non-empty, non-comment line.
fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}
