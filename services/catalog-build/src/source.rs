//! Configured sources and their adapter onto the reconciler.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use catalog_builder::{family_by_name, AssetFamily, Builder, BuilderConfig, FamilyOptions};
use catalog_store::{CatalogSource, SourceSummary};
use netcdf_parser::DatasetOpener;

use crate::config_loader::{check_unique, load_build_config, load_metadata, ExperimentMetadata};

/// One source ready to build.
#[derive(Clone)]
pub struct SourcePlan {
    pub builder: String,
    pub family: Arc<dyn AssetFamily>,
    pub config: BuilderConfig,
    pub metadata: ExperimentMetadata,
}

impl std::fmt::Debug for SourcePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePlan")
            .field("builder", &self.builder)
            .field("name", &self.metadata.name)
            .field("paths", &self.config.paths)
            .finish()
    }
}

/// Resolve every source of every config file. `workers` overrides the
/// worker count of every source.
pub fn plan_sources(config_files: &[PathBuf], workers: Option<usize>) -> Result<Vec<SourcePlan>> {
    let mut plans = Vec::new();

    for file in config_files {
        let config = load_build_config(file)?;
        for source in config.sources {
            let metadata = load_metadata(&source.metadata_yaml)?;
            let options = FamilyOptions {
                ensemble: source.ensemble,
            };
            let family = family_by_name(&config.builder, &options)
                .with_context(|| format!("Invalid builder in {:?}", file))?;

            let mut builder_config = family.default_config(source.path.clone());
            source.overrides.apply(&mut builder_config);
            if let Some(workers) = workers {
                builder_config.workers = workers;
            }
            builder_config
                .validate()
                .with_context(|| format!("Invalid builder configuration for {}", metadata.name))?;

            debug!(
                source = %metadata.name,
                builder = %config.builder,
                paths = ?builder_config.paths,
                "Planned source"
            );
            plans.push(SourcePlan {
                builder: config.builder.clone(),
                family,
                config: builder_config,
                metadata,
            });
        }
    }

    check_unique(plans.iter().map(|p| &p.metadata))?;
    info!(sources = plans.len(), files = config_files.len(), "Loaded build configuration");
    Ok(plans)
}

/// Builds one planned source when the reconciler asks for it.
pub struct BuilderSource {
    plan: SourcePlan,
    opener: Arc<dyn DatasetOpener>,
}

impl BuilderSource {
    pub fn new(plan: SourcePlan, opener: Arc<dyn DatasetOpener>) -> Self {
        Self { plan, opener }
    }

    fn metadata_path(&self, directory: &Path) -> PathBuf {
        directory.join(format!("{}.metadata.yaml", self.plan.metadata.name))
    }
}

impl CatalogSource for BuilderSource {
    fn name(&self) -> &str {
        &self.plan.metadata.name
    }

    fn materialize(&mut self, directory: &Path) -> anyhow::Result<SourceSummary> {
        let name = self.plan.metadata.name.clone();
        let description = self.plan.metadata.description.clone();

        let mut builder = Builder::new(
            self.plan.family.clone(),
            self.plan.config.clone(),
            self.opener.clone(),
        )?;
        builder.build()?;
        let saved = builder.save(&name, &description, directory)?;

        let metadata = serde_yaml::to_string(&self.plan.metadata)?;
        fs::write(self.metadata_path(directory), metadata)?;

        let sidecar = saved
            .sidecar
            .strip_prefix(directory)
            .with_context(|| {
                format!("Sidecar {:?} written outside {:?}", saved.sidecar, directory)
            })?
            .to_path_buf();

        Ok(SourceSummary {
            name,
            description,
            sidecar,
            table: builder.table().clone(),
            data_paths: self.plan.config.paths.clone(),
        })
    }
}
