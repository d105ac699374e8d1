//! Catalog build command.
//!
//! Builds every source named in the given configuration files into one
//! versioned meta-catalog and updates the version registry.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use catalog_build::{init_tracing, run_build, BuildOptions, LogFormat};
use catalog_store::{BuildOutcome, VersionStamp, METACATALOG_FILE};
use netcdf_parser::AutoOpener;

#[derive(Parser, Debug)]
#[command(name = "catalog-build")]
#[command(about = "Build intake-esm catalogs into a versioned meta-catalog")]
struct Args {
    /// Build configuration files
    #[arg(required = true)]
    config_yaml: Vec<PathBuf>,

    /// Directory holding the version directories
    #[arg(long, env = "CATALOG_BUILD_BASE_PATH", default_value = ".")]
    build_base_path: PathBuf,

    /// Meta-catalog file written into <build-base-path>/<version>/
    #[arg(long, default_value = METACATALOG_FILE)]
    catalog_file: String,

    /// Version registry, relative to the base path unless absolute
    #[arg(long, default_value = "catalog.yaml")]
    registry_file: PathBuf,

    /// Catalog name in the registry
    #[arg(long, default_value = "access_nri")]
    catalog_name: String,

    #[arg(long, default_value = "ACCESS-NRI intake catalog")]
    description: String,

    /// Version stamp, vYYYY-MM-DD (default: today)
    #[arg(long)]
    version: Option<VersionStamp>,

    /// Materialize a new version even if nothing changed
    #[arg(long)]
    force: bool,

    /// Do not update the version registry
    #[arg(long)]
    no_update: bool,

    /// Parse workers per source (default: all cores)
    #[arg(long, env = "CATALOG_BUILD_WORKERS")]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    let options = BuildOptions {
        config_files: args.config_yaml,
        build_base_path: args.build_base_path,
        registry_file: args.registry_file,
        catalog_file: args.catalog_file,
        catalog_name: args.catalog_name,
        description: args.description,
        version: args.version.unwrap_or_else(VersionStamp::today),
        workers: args.workers,
        force: args.force,
        no_update: args.no_update,
    };

    let report = run_build(&options, Arc::new(AutoOpener::new()))?;
    match &report.outcome {
        BuildOutcome::Materialized { directory } => {
            info!(
                version = %report.version,
                directory = %directory.display(),
                "Build complete"
            );
        }
        BuildOutcome::Unchanged { alias_of } => {
            info!(
                version = %report.version,
                alias_of = %alias_of,
                "Build complete, catalog unchanged"
            );
        }
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
