//! Configuration for pathstore
//!
//! Centralized configuration with sensible defaults. Configs can be built
//! programmatically or loaded from a JSON file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, StoreError};

/// Main configuration for a store instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Backend Configuration
    // -------------------------------------------------------------------------
    /// Backend selection and backend-specific options
    pub backend: BackendConfig,

    // -------------------------------------------------------------------------
    // Bootstrap Configuration
    // -------------------------------------------------------------------------
    /// Read bot-wide settings from the store on startup
    pub use_db_config: bool,

    /// Snapshot bot-wide settings into the root record when seeding
    pub save_db_config: bool,

    // -------------------------------------------------------------------------
    // Bot-wide Settings
    // -------------------------------------------------------------------------
    /// Command prefix
    pub prefix: Option<String>,

    /// Durable credential/token
    pub token: Option<String>,

    /// Reconnect delay in seconds
    pub reconnect_time: Option<u64>,

    /// Owner id list
    pub owners: Vec<String>,
}

/// Backend selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider name, resolved through the registry naming conventions
    pub provider: String,

    /// Filesystem root for backend files
    pub root: PathBuf,

    /// Backend database path, relative to `root` unless absolute
    pub path: Option<PathBuf>,

    /// Fail reads of missing paths instead of returning absent
    pub fail_if_missing: Option<bool>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            use_db_config: false,
            save_db_config: false,
            prefix: None,
            token: None,
            reconnect_time: None,
            owners: Vec::new(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "sled".to_string(),
            root: PathBuf::from("./pathstore_data"),
            path: None,
            fail_if_missing: None,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Load a config from a JSON file
    pub fn load(path: &Path) -> Result<StoreConfig> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Config(e.to_string()))
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the backend provider name
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.backend.provider = name.into();
        self
    }

    /// Set the filesystem root for backend files
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend.root = path.into();
        self
    }

    /// Set the backend database path (relative to the root unless absolute)
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend.path = Some(path.into());
        self
    }

    /// Fail reads of missing paths instead of returning absent
    pub fn fail_if_missing(mut self, fail: bool) -> Self {
        self.config.backend.fail_if_missing = Some(fail);
        self
    }

    /// Read bot-wide settings from the store on startup
    pub fn use_db_config(mut self, use_db: bool) -> Self {
        self.config.use_db_config = use_db;
        self
    }

    /// Snapshot bot-wide settings into the root record when seeding
    pub fn save_db_config(mut self, save: bool) -> Self {
        self.config.save_db_config = save;
        self
    }

    /// Set the command prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = Some(prefix.into());
        self
    }

    /// Set the credential/token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Set the reconnect delay in seconds
    pub fn reconnect_time(mut self, seconds: u64) -> Self {
        self.config.reconnect_time = Some(seconds);
        self
    }

    /// Add an owner id
    pub fn owner(mut self, id: impl Into<String>) -> Self {
        self.config.owners.push(id.into());
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
