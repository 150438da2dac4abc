use crate::config::Config;
use crate::error::ConfigError;

/// Layer a TOML fragment over `base` and deserialize the result.
///
/// Keys present in `overlay_toml` win; everything else keeps the value
/// from `base`. Tables (including `[adapters.<lang>]`) merge key by key.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut merged = to_table(base)?;
    let overlay: toml::Table =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    merge_tables(&mut merged, overlay);

    toml::Value::Table(merged)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
}

fn to_table(config: &Config) -> Result<toml::Table, ConfigError> {
    let text = toml::to_string(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
