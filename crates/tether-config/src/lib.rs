//! tether-config: layered TOML configuration for tether.
//!
//! Global and project files are merged over built-in defaults, then
//! environment overrides are applied and the result validated.

pub mod config;
pub mod env;
pub mod error;
pub mod load;
pub mod merge;
pub mod validate;

pub use config::{
    AdapterEntry, BreakpointConfig, ClientConfig, Config, HealthConfig, LogConfig, LogLevel,
    ReceiverConfig,
};
pub use env::{BREAKPOINT_VALIDATION_VAR, LOG_LEVEL_VAR};
pub use error::ConfigError;
pub use load::{load_config, load_from_str};
