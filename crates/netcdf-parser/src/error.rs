//! Error types for dataset access.

use thiserror::Error;

/// Result type for dataset access operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for dataset access.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Missing required variable, dimension or data section
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Malformed file or CDL text
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Command execution error (ncdump backend)
    #[error("Command execution failed: {0}")]
    CommandError(String),

    /// No backend can open this kind of file
    #[error("Unsupported file: {0}")]
    Unsupported(String),
}
