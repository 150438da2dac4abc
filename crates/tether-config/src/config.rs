use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Request issuing settings for the DAP client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client identifier sent in the `initialize` request.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Seconds a request waits for its response before failing.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_client_id() -> String {
    "tether".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Session health thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive receive failures tolerated before the receiver gives up.
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    /// Seconds without any adapter message after which the session is unhealthy.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
}

fn default_max_failures() -> u32 {
    3
}

fn default_response_timeout() -> u64 {
    30
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_failures(),
            response_timeout_secs: default_response_timeout(),
        }
    }
}

/// Background receiver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Milliseconds `stop` waits for a cooperative exit before aborting the task.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
}

fn default_stop_timeout() -> u64 {
    2000
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout(),
        }
    }
}

/// Breakpoint validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointConfig {
    /// Run file-level line checks (existence, range, blank, comment lines).
    #[serde(default = "default_true")]
    pub validate_lines: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BreakpointConfig {
    fn default() -> Self {
        Self {
            validate_lines: true,
        }
    }
}

/// Per-language debug adapter settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterEntry {
    /// The `adapterID` sent during the handshake.
    #[serde(default)]
    pub adapter_id: Option<String>,
    /// Extra regexes matching lines that can never hold a breakpoint.
    #[serde(default)]
    pub non_executable_patterns: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Top-level tether configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Request settings.
    #[serde(default)]
    pub client: ClientConfig,
    /// Health thresholds.
    #[serde(default)]
    pub health: HealthConfig,
    /// Receiver shutdown settings.
    #[serde(default)]
    pub receiver: ReceiverConfig,
    /// Breakpoint validation.
    #[serde(default)]
    pub breakpoints: BreakpointConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Adapter settings keyed by language (e.g. `python`, `java`).
    #[serde(default)]
    pub adapters: HashMap<String, AdapterEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.client.client_id, "tether");
        assert_eq!(cfg.client.request_timeout_secs, 30);
        assert_eq!(cfg.health.max_consecutive_failures, 3);
        assert_eq!(cfg.health.response_timeout_secs, 30);
        assert_eq!(cfg.receiver.stop_timeout_ms, 2000);
        assert!(cfg.breakpoints.validate_lines);
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
        assert!(cfg.adapters.is_empty());
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let mut adapters = HashMap::new();
        adapters.insert(
            "python".to_string(),
            AdapterEntry {
                adapter_id: Some("debugpy".into()),
                non_executable_patterns: vec![r"^\s*pass\s*$".into()],
            },
        );
        let cfg = Config {
            client: ClientConfig {
                client_id: "probe".into(),
                request_timeout_secs: 5,
            },
            health: HealthConfig {
                max_consecutive_failures: 7,
                response_timeout_secs: 90,
            },
            receiver: ReceiverConfig {
                stop_timeout_ms: 250,
            },
            breakpoints: BreakpointConfig {
                validate_lines: false,
            },
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/tether.log")),
            },
            adapters,
        };

        let toml_str = toml::to_string(&cfg).expect("serialize");
        let deserialized: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn parse_from_toml_string() {
        let input = r#"
[health]
max_consecutive_failures = 5

[adapters.java]
adapter_id = "java-debug"
non_executable_patterns = ["^\\s*import "]
"#;
        let cfg: Config = toml::from_str(input).expect("parse toml");
        assert_eq!(cfg.health.max_consecutive_failures, 5);
        // Unspecified fields keep defaults via serde(default)
        assert_eq!(cfg.health.response_timeout_secs, 30);
        let java = &cfg.adapters["java"];
        assert_eq!(java.adapter_id.as_deref(), Some("java-debug"));
        assert_eq!(java.non_executable_patterns.len(), 1);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn log_level_filter_names() {
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::default().as_filter(), "info");
    }
}
