use crate::config::Config;
use crate::error::ConfigError;

/// Upper bound for the receiver stop timeout.
const MAX_STOP_TIMEOUT_MS: u64 = 60_000;

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.health.max_consecutive_failures == 0 {
        errors.push(ConfigError::Validation {
            field: "health.max_consecutive_failures".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    if config.health.response_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            field: "health.response_timeout_secs".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    if config.client.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            field: "client.request_timeout_secs".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    if config.client.client_id.trim().is_empty() {
        errors.push(ConfigError::Validation {
            field: "client.client_id".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let stop = config.receiver.stop_timeout_ms;
    if stop == 0 || stop > MAX_STOP_TIMEOUT_MS {
        errors.push(ConfigError::Validation {
            field: "receiver.stop_timeout_ms".to_string(),
            message: format!("must be 1\u{2013}{MAX_STOP_TIMEOUT_MS}, got {stop}"),
        });
    }

    // Sorted so the reported order is stable.
    let mut languages: Vec<&String> = config.adapters.keys().collect();
    languages.sort();
    for language in languages {
        let entry = &config.adapters[language];
        for (i, pattern) in entry.non_executable_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ConfigError::Validation {
                    field: format!("adapters.{language}.non_executable_patterns[{i}]"),
                    message: e.to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
