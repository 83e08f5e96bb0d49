//! Configuration for the ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Listen address handed to the transport layer
    pub listen_addr: String,

    /// Emit logs as JSON
    pub log_json: bool,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Token and bootstrap configuration
    pub token: TokenConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/volta"),
            service_name: "volta-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            listen_addr: "0.0.0.0:50051".to_string(),
            log_json: false,
            rocksdb: RocksDBConfig::default(),
            token: TokenConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Token metadata written into the genesis record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Genesis token label
    pub genesis_token: String,

    /// Token name
    pub name: String,

    /// Token currency code
    pub currency: String,

    /// Genesis author
    pub author: String,

    /// Supply credited to the admin account at bootstrap
    pub initial_supply: Decimal,

    /// Seed hashed into the admin passkey
    pub admin_passkey_seed: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            genesis_token: "VOLTA".to_string(),
            name: "VOLTA".to_string(),
            currency: "VOLTGX".to_string(),
            author: "Volta".to_string(),
            initial_supply: Decimal::from(10_000_000_000_000_000_000u64), // 1e19
            admin_passkey_seed: "passkey".to_string(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("VOLTA_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("VOLTA_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(json) = std::env::var("VOLTA_LOG_JSON") {
            config.log_json = matches!(json.as_str(), "1" | "true" | "yes");
        }

        if let Ok(seed) = std::env::var("VOLTA_ADMIN_SEED") {
            config.token.admin_passkey_seed = seed;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot bootstrap with
    pub fn validate(&self) -> crate::Result<()> {
        if self.token.initial_supply.is_sign_negative() {
            return Err(crate::Error::Config(
                "token.initial_supply must not be negative".to_string(),
            ));
        }
        if self.token.admin_passkey_seed.is_empty() {
            return Err(crate::Error::Config(
                "token.admin_passkey_seed must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
