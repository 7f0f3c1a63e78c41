//! Store connection settings.
//!
//! Sources are merged in order, later ones winning:
//! 1. built-in defaults (`table = "todos"`)
//! 2. `todo-sync.toml` in the working directory, if present
//! 3. `TODO_SYNC_*` environment variables (`TODO_SYNC_URL`, `TODO_SYNC_ANON_KEY`, `TODO_SYNC_TABLE`)

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "todo-sync.toml";
pub const ENV_PREFIX: &str = "TODO_SYNC_";
pub const DEFAULT_TABLE: &str = "todos";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Project URL of the store, without the `/rest/v1` suffix.
    pub url: String,
    /// Public (anon) API key sent as `apikey` on every request.
    pub anon_key: String,
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Load from the default file and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(StoreConfig::default()));
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading store config file");
            figment = figment.merge(Toml::file(path));
        }
        let config: StoreConfig = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".to_string()));
        }
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::Invalid("anon_key must not be empty".to_string()));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table must not be empty".to_string()));
        }
        Ok(())
    }
}
