//! Multi-source catalog builds.
//!
//! Reads build configuration files, builds every configured source and
//! reconciles the result into a versioned catalog store.

pub mod config_loader;
pub mod logging;
pub mod metadata;
pub mod source;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use catalog_store::{BuildRequest, CatalogSource, ReconcileReport, Reconciler, VersionStamp};
use netcdf_parser::DatasetOpener;

pub use config_loader::{BuildConfigFile, ExperimentMetadata, SourceConfig};
pub use logging::{init_tracing, LogFormat};
pub use metadata::{metadata_template, validate_metadata_files, write_metadata_template};
pub use source::{plan_sources, BuilderSource, SourcePlan};

/// Everything one invocation of the build command needs.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub config_files: Vec<PathBuf>,
    pub build_base_path: PathBuf,
    /// Registry file, relative paths resolve against the base path
    pub registry_file: PathBuf,
    /// Meta-catalog file name inside each version directory
    pub catalog_file: String,
    pub catalog_name: String,
    pub description: String,
    pub version: VersionStamp,
    pub workers: Option<usize>,
    pub force: bool,
    pub no_update: bool,
}

impl BuildOptions {
    pub fn registry_path(&self) -> PathBuf {
        if self.registry_file.is_absolute() {
            self.registry_file.clone()
        } else {
            self.build_base_path.join(&self.registry_file)
        }
    }
}

/// Build every configured source and reconcile the store.
pub fn run_build(
    options: &BuildOptions,
    opener: Arc<dyn DatasetOpener>,
) -> Result<ReconcileReport> {
    let plans = plan_sources(&options.config_files, options.workers)?;

    let mut sources: Vec<Box<dyn CatalogSource>> = plans
        .into_iter()
        .map(|plan| Box::new(BuilderSource::new(plan, opener.clone())) as Box<dyn CatalogSource>)
        .collect();

    let request = BuildRequest {
        catalog_name: options.catalog_name.clone(),
        description: options.description.clone(),
        version: options.version,
        base: options.build_base_path.clone(),
        registry_path: options.registry_path(),
        metacatalog_file: options.catalog_file.clone(),
        force: options.force,
        no_update: options.no_update,
    };
    info!(
        version = %request.version,
        base = %request.base.display(),
        registry = %request.registry_path.display(),
        sources = sources.len(),
        "Starting catalog build"
    );

    let report = Reconciler::new(request)
        .run(&mut sources)
        .context("Catalog build failed")?;
    Ok(report)
}
