//! Error types for the catalog builder.

use std::path::PathBuf;

use thiserror::Error;

use crate::builder::BuildState;
use crate::record::InvalidAsset;

/// Errors that can occur while building a catalog.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid filename pattern: {0}")]
    InvalidPattern(String),

    #[error("Discovery failed under {path}: {message}")]
    Discovery { path: PathBuf, message: String },

    #[error("Schema violation for {path}: {}", .errors.join("; "))]
    SchemaViolation { path: PathBuf, errors: Vec<String> },

    #[error(
        "Parser returns no valid assets ({} invalid). Try parsing a single file to see why",
        .invalid.len()
    )]
    NoValidAssets { invalid: Vec<InvalidAsset> },

    #[error("Catalog has not yet been built. Run build() first")]
    SaveBeforeBuild,

    #[error("Cannot {operation} in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: BuildState,
    },

    #[error("No variable with a long_name attribute in {0}")]
    EmptyDataset(PathBuf),

    #[error("Time axis '{0}' has no values")]
    EmptyTimeAxis(String),

    #[error("Unexpected path layout for {family}: {path}")]
    PathLayout { family: &'static str, path: PathBuf },

    #[error("Catalog error: {0}")]
    Catalog(#[from] catalog_common::CatalogError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] netcdf_parser::NetCdfError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for builder operations.
pub type Result<T> = std::result::Result<T, BuildError>;
