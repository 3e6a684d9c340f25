// ⚠️ Error types for stock operations
// One enum for every failure the store, ledger, query compiler and importer can report

use thiserror::Error;

/// Result type alias using StockError
pub type Result<T> = std::result::Result<T, StockError>;

#[derive(Debug, Error)]
pub enum StockError {
    // -------------------------------------------------------------------------
    // Caller errors
    // -------------------------------------------------------------------------
    /// Malformed or out-of-domain input (bad operator, empty batch, rejected lines)
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Outcome quantity exceeds the available stock (requested {requested}, available {available})")]
    InsufficientStock { requested: u32, available: u32 },

    // -------------------------------------------------------------------------
    // Internal errors
    // -------------------------------------------------------------------------
    /// Unexpected I/O or parse failure not attributable to one input line
    #[error("Unexpected error: {0}")]
    ProcessingFailure(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl StockError {
    pub fn invalid(message: impl Into<String>) -> Self {
        StockError::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        StockError::NotFound(message.into())
    }

    /// True for errors caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StockError::InvalidArgument(_)
                | StockError::NotFound(_)
                | StockError::InsufficientStock { .. }
        )
    }
}
