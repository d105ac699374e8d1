//! Error types for catalog tables and sidecars.

use thiserror::Error;

/// Result type alias using CatalogError.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while encoding, decoding or persisting catalog artifacts.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed CSV at line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Unsupported calendar: {0}")]
    UnsupportedCalendar(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Serialization(format!("JSON error: {}", err))
    }
}
