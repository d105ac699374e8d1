//! Catalog builder library.
//!
//! Turns a directory tree of NetCDF model output into a clean, grouped
//! catalog table with an intake-esm sidecar.
//!
//! # Architecture
//!
//! - [`patterns`]: filename redaction into stable `file_id` grouping keys
//! - [`timeinfo`]: time-axis resolution (CF conventions by default)
//! - [`extract`]: per-file metadata extraction through a [`netcdf_parser::Dataset`]
//! - [`family`]: per-model discovery and realm/member derivation
//! - [`builder`]: the discover, parse, validate, clean and save pipeline

pub mod builder;
pub mod config;
pub mod discover;
pub mod error;
pub mod extract;
pub mod family;
pub mod patterns;
pub mod record;
pub mod schema;
pub mod timeinfo;

// Re-exports
pub use builder::{BuildReport, BuildState, Builder};
pub use config::{default_workers, BuilderConfig, BuilderOverrides};
pub use discover::{discover, DiscoveryOptions, GlobPattern};
pub use error::{BuildError, Result};
pub use extract::Extractor;
pub use family::{
    family_by_name, om3_realm, AccessEsm, AccessOm2, AccessOm3, AssetFamily, FamilyOptions,
    GenericFamily,
};
pub use patterns::{
    default_frequency_rules, default_patterns, parse_filename, FrequencyRuleSpec, GroupRole,
    ParsedFilename, PatternGroup, PatternSet, PatternSpec,
};
pub use record::{AssetRecord, InvalidAsset, ParsedAsset, VariableDescriptor};
pub use schema::Schema;
pub use timeinfo::{CfTimeResolver, TimeInfo, TimeResolver};
