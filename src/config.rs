//! Runtime configuration.
//!
//! Settings come from `config/market.toml` when present, then from
//! `MARKET__`-prefixed environment variables (`MARKET__STORAGE__PATH=...`).
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "config/market.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct MarketConfig {
    pub storage: StorageConfig,
    pub log_level: LogLevel,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Discard the database when the process exits.
    pub temporary: bool,
    pub flush_every_ms: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("market.db"),
            temporary: false,
            flush_every_ms: Some(500),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct LogLevel(pub String);

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel("info".to_string())
    }
}

/// Record set written once by [`crate::schema::initialize`].
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SeedConfig {
    pub products: Vec<SeedProduct>,
    pub users: Vec<SeedUser>,
    pub admins: Vec<String>,
}

impl SeedConfig {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.users.is_empty() && self.admins.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SeedProduct {
    pub name: String,
    pub category: String,
    pub price: u64,
    #[serde(default)]
    pub stock: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SeedUser {
    pub username: String,
    pub email: String,
}

impl MarketConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from an optional TOML file, with environment variables on top.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("MARKET").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
