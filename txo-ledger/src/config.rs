//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Name attached to the ledger's startup logs
    pub service_name: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Transfer behaviour
    pub ledger: LedgerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/txo-ledger"),
            service_name: "txo-ledger".to_string(),
            rocksdb: RocksDBConfig::default(),
            ledger: LedgerConfig::default(),
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

    /// fsync every write before returning
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Transfer behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Refuse to mint a TXO whose id is already stored
    pub reject_duplicate_ids: bool,

    /// Commit all writes of a transfer as one batch.
    /// When off, writes are applied one at a time in order.
    pub atomic_batches: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reject_duplicate_ids: false,
            atomic_batches: true,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("TXO_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(value) = std::env::var("TXO_LEDGER_SYNC_WRITES") {
            config.rocksdb.sync_writes = parse_flag("TXO_LEDGER_SYNC_WRITES", &value)?;
        }

        if let Ok(value) = std::env::var("TXO_LEDGER_REJECT_DUPLICATE_IDS") {
            config.ledger.reject_duplicate_ids =
                parse_flag("TXO_LEDGER_REJECT_DUPLICATE_IDS", &value)?;
        }

        Ok(config)
    }
}

fn parse_flag(name: &str, value: &str) -> crate::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(crate::Error::Config(format!(
            "{} must be a boolean, got {:?}",
            name, other
        ))),
    }
}
