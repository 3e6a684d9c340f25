// Stockroom - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod db;
pub mod query;
pub mod ledger;
pub mod import;
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{Result, StockError};
pub use db::{
    MemoryStore, SqliteStore, StockEntry, StockStore, UnitId, UnitMatch, UnitPayload, UnitRecord,
    setup_database, validate_category, validate_quantity,
};
pub use query::{ComparisonOperator, QueryParams, RatioComparison, SortKey, UnitQuery};
pub use ledger::{OutcomeLookup, StockLedger};
pub use import::{ImportSummary, LineError, LineRule, RawRow, import_csv, read_rows, validate_row};
pub use config::{Config, ConfigBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
