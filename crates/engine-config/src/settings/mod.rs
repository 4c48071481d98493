use crate::error::ConfigError;
use model::core::key::KeyCoercion;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub mod env;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Immutable, validated configuration shared by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSettings {
    /// Page size of every to-many and polymorphic batch fetch.
    batch_size: usize,
    /// Root limit when a request gives none.
    default_limit: u64,
    /// Maximum number of nested batch levels below the root.
    max_depth: usize,
    key_coercion: KeyCoercion,
    /// Fetch sibling nested fields concurrently.
    concurrent_siblings: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            default_limit: DEFAULT_LIMIT,
            max_depth: DEFAULT_MAX_DEPTH,
            key_coercion: KeyCoercion::default(),
            concurrent_siblings: false,
        }
    }
}

impl EngineSettings {
    pub fn from_builder(builder: EngineSettingsBuilder) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let settings = Self {
            batch_size: builder.batch_size.unwrap_or(defaults.batch_size),
            default_limit: builder.default_limit.unwrap_or(defaults.default_limit),
            max_depth: builder.max_depth.unwrap_or(defaults.max_depth),
            key_coercion: builder.key_coercion.unwrap_or(defaults.key_coercion),
            concurrent_siblings: builder
                .concurrent_siblings
                .unwrap_or(defaults.concurrent_siblings),
        };
        if settings.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if settings.max_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        Ok(settings)
    }

    /// Defaults, then the optional JSON file, then `NESTQL_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = match path {
            Some(path) => EngineSettingsBuilder::from_file(path)?,
            None => EngineSettingsBuilder::default(),
        };
        builder.apply_env(|key| std::env::var(key).ok())?;
        let settings = Self::from_builder(builder)?;
        debug!(?settings, "Loaded engine settings");
        Ok(settings)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn key_coercion(&self) -> KeyCoercion {
        self.key_coercion
    }

    pub fn concurrent_siblings(&self) -> bool {
        self.concurrent_siblings
    }
}

/// Partial settings as read from one source. Later sources override earlier
/// ones field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSettingsBuilder {
    pub batch_size: Option<usize>,
    pub default_limit: Option<u64>,
    pub max_depth: Option<usize>,
    pub key_coercion: Option<KeyCoercion>,
    pub concurrent_siblings: Option<bool>,
}

impl EngineSettingsBuilder {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn default_limit(mut self, limit: u64) -> Self {
        self.default_limit = Some(limit);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn key_coercion(mut self, coercion: KeyCoercion) -> Self {
        self.key_coercion = Some(coercion);
        self
    }

    pub fn concurrent_siblings(mut self, concurrent: bool) -> Self {
        self.concurrent_siblings = Some(concurrent);
        self
    }

    pub fn build(self) -> Result<EngineSettings, ConfigError> {
        EngineSettings::from_builder(self)
    }
}
