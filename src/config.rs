//! Runtime configuration for tiered-config-cache.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Backend location, storage directories and the key → tier table live here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::entry::{keys, KeyTable, Tier};
use crate::cache::store::DEFAULT_NAMESPACE;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiered-config-cache", about = "Tiered config cache SDK host server")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host API server configuration.
    pub server: ServerConfig,

    /// Upstream backend configuration.
    pub backend: BackendConfig,

    /// Storage tier configuration.
    pub storage: StorageConfig,

    /// Key → tier assignments.
    pub keys: KeyConfig,
}

/// Host API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "127.0.0.1:8080").
    pub listen: String,

    /// Capacity of the update broadcast channel.
    pub update_channel_capacity: usize,

    /// Run authorization and JS-SDK config fetches at startup.
    pub warm_up: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            update_channel_capacity: 64,
            warm_up: true,
        }
    }
}

/// Upstream backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL every request path is appended to.
    pub base_url: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Where the persisted tiers live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Namespace string every persisted blob is stored under.
    pub namespace: String,

    /// Directory for the session tier.
    pub session_dir: PathBuf,

    /// Directory for the persistent (device) tier.
    pub persistent_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            session_dir: std::env::temp_dir().join("tiered-config-cache").join("session"),
            persistent_dir: PathBuf::from(".tiered-config-cache"),
        }
    }
}

/// Key → tier assignments as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyConfig(pub BTreeMap<String, Tier>);

impl Default for KeyConfig {
    fn default() -> Self {
        let table = [
            keys::TOKEN,
            keys::USER_INFO,
            keys::APP_CONFIG,
            keys::USER_CONFIG,
            keys::WX_CONFIG,
        ]
        .into_iter()
        .map(|k| (k.to_string(), Tier::Session))
        .collect();
        Self(table)
    }
}

impl KeyConfig {
    /// Freeze the assignments into the table the store consults.
    pub fn to_table(&self) -> KeyTable {
        KeyTable::new(self.0.iter().map(|(k, t)| (k.clone(), *t)))
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
