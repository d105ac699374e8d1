//! Error types for catalog storage.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid version stamp '{0}', expected vYYYY-MM-DD")]
    InvalidVersion(String),

    #[error("Registry conflict in {path}: {message}")]
    RegistryConflict { path: PathBuf, message: String },

    #[error("Version directory already exists: {0}")]
    VersionExists(PathBuf),

    #[error("Duplicate source name '{0}'")]
    DuplicateSource(String),

    #[error("Invalid meta-catalog file name '{0}'")]
    InvalidFileName(String),

    #[error("Build has no sources")]
    NoSources,

    #[error("Source '{name}' failed: {message}")]
    SourceFailed { name: String, message: String },

    #[error("Catalog error: {0}")]
    Catalog(#[from] catalog_common::CatalogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
