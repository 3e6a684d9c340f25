//! Runtime configuration
//!
//! Centralized settings with sensible defaults; binaries fill them from
//! command-line arguments and environment variables.

use crate::db::SqliteStore;
use crate::error::Result;
use crate::ledger::{OutcomeLookup, StockLedger};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file (created on first open)
    pub database_path: PathBuf,

    /// HTTP listen address (host:port)
    pub listen_addr: String,

    /// How outcome requests locate their record
    pub outcome_lookup: OutcomeLookup,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./stockroom.db"),
            listen_addr: "127.0.0.1:8080".to_string(),
            outcome_lookup: OutcomeLookup::ByAttributes,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Open the configured database and wrap it in a ledger
    pub fn open_ledger(&self) -> Result<StockLedger<SqliteStore>> {
        let store = SqliteStore::open(&self.database_path)?;
        Ok(StockLedger::new(store).with_outcome_lookup(self.outcome_lookup))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn outcome_lookup(mut self, lookup: OutcomeLookup) -> Self {
        self.config.outcome_lookup = lookup;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
