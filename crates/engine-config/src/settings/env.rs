use crate::{error::ConfigError, settings::EngineSettingsBuilder};
use std::str::FromStr;
use tracing::debug;

pub const ENV_BATCH_SIZE: &str = "NESTQL_BATCH_SIZE";
pub const ENV_DEFAULT_LIMIT: &str = "NESTQL_DEFAULT_LIMIT";
pub const ENV_MAX_DEPTH: &str = "NESTQL_MAX_DEPTH";
pub const ENV_KEY_COERCION: &str = "NESTQL_KEY_COERCION";
pub const ENV_CONCURRENT_SIBLINGS: &str = "NESTQL_CONCURRENT_SIBLINGS";

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

impl EngineSettingsBuilder {
    /// Overrides fields from variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = Some(parse(ENV_BATCH_SIZE, &raw)?);
        }
        if let Some(raw) = lookup(ENV_DEFAULT_LIMIT) {
            self.default_limit = Some(parse(ENV_DEFAULT_LIMIT, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            self.max_depth = Some(parse(ENV_MAX_DEPTH, &raw)?);
        }
        if let Some(raw) = lookup(ENV_KEY_COERCION) {
            self.key_coercion = Some(parse(ENV_KEY_COERCION, &raw)?);
        }
        if let Some(raw) = lookup(ENV_CONCURRENT_SIBLINGS) {
            self.concurrent_siblings = Some(parse_flag(ENV_CONCURRENT_SIBLINGS, &raw)?);
        }
        debug!(builder = ?self, "Applied environment overrides");
        Ok(())
    }
}
