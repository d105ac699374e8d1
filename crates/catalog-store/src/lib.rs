//! Versioned catalog storage.
//!
//! Provides:
//! - Version stamps and discovery of stamped build directories
//! - The `catalog.yaml` version registry with min/max/default pointers
//! - Reconciliation of a multi-source build into the store

pub mod artifact;
pub mod error;
pub mod reconciler;
pub mod registry;
pub mod version;

pub use artifact::{
    check_metacatalog_name, fingerprint, storage_flags, BuildManifest, SourceSummary,
    METACATALOG_FILE,
};
pub use error::{Result, StoreError};
pub use reconciler::{BuildOutcome, BuildRequest, CatalogSource, ReconcileReport, Reconciler};
pub use registry::{CatalogEntry, RegistryDocument, VersionPointers, VersionRecord};
pub use version::{scan_versions, VersionStamp};
