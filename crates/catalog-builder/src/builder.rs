//! The catalog build pipeline.
//!
//! A [`Builder`] walks through discover, parse, validate, clean and save,
//! in that order. Only the parse step runs in parallel; everything after it
//! works single-threaded on the accumulated table.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use catalog_common::{
    write_catalog, AggregationRule, CatalogTable, Cell, EsmCatalogSpec, SavedCatalog,
    SidecarOptions,
};
use netcdf_parser::DatasetOpener;

use crate::config::BuilderConfig;
use crate::error::{BuildError, Result};
use crate::extract::Extractor;
use crate::family::AssetFamily;
use crate::patterns::PatternSet;
use crate::record::{InvalidAsset, ParsedAsset, COLUMN_ORDER, PATH_COLUMN, VARIABLE_COLUMN};
use crate::schema::Schema;
use crate::timeinfo::{CfTimeResolver, TimeResolver};

/// Position of a [`Builder`] in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Created,
    AssetsDiscovered,
    Parsed,
    Validated,
    Cleaned,
    Saved,
}

/// Counts collected over one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub discovered: usize,
    pub valid: usize,
    pub invalid: usize,
    pub duplicates_removed: usize,
    pub demoted: usize,
    pub groups: usize,
}

/// Builds one catalog from one family's files.
pub struct Builder {
    family: Arc<dyn AssetFamily>,
    config: BuilderConfig,
    extractor: Extractor,
    schema: Schema,
    state: BuildState,
    assets: Vec<PathBuf>,
    parsed: Vec<ParsedAsset>,
    table: CatalogTable,
    invalid: Vec<InvalidAsset>,
    report: BuildReport,
}

impl Builder {
    /// Create a builder using CF time conventions.
    pub fn new(
        family: Arc<dyn AssetFamily>,
        config: BuilderConfig,
        opener: Arc<dyn DatasetOpener>,
    ) -> Result<Self> {
        Self::with_resolver(family, config, opener, Arc::new(CfTimeResolver))
    }

    pub fn with_resolver(
        family: Arc<dyn AssetFamily>,
        config: BuilderConfig,
        opener: Arc<dyn DatasetOpener>,
        resolver: Arc<dyn TimeResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let patterns = PatternSet::from_specs(
            &config.filename_patterns,
            &config.frequency_rules,
            config.fill_char,
        )?;
        let schema = match &config.schema_path {
            Some(path) => Schema::load(path)?,
            None => Schema::default_asset()?,
        };
        let extractor = Extractor::new(opener, patterns, resolver, config.time_dim.clone());

        Ok(Self {
            family,
            config,
            extractor,
            schema,
            state: BuildState::Created,
            assets: Vec::new(),
            parsed: Vec::new(),
            table: CatalogTable::new(),
            invalid: Vec::new(),
            report: BuildReport::default(),
        })
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn family(&self) -> &dyn AssetFamily {
        self.family.as_ref()
    }

    /// Discovered paths, sorted.
    pub fn assets(&self) -> &[PathBuf] {
        &self.assets
    }

    /// Parse outcomes, one per discovered path.
    pub fn parsed(&self) -> &[ParsedAsset] {
        &self.parsed
    }

    pub fn table(&self) -> &CatalogTable {
        &self.table
    }

    pub fn invalid_assets(&self) -> &[InvalidAsset] {
        &self.invalid
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    fn require(&self, operation: &'static str, expected: BuildState) -> Result<()> {
        if self.state != expected {
            return Err(BuildError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Crawl the configured roots.
    pub fn get_assets(&mut self) -> Result<&[PathBuf]> {
        self.require("discover assets", BuildState::Created)?;

        self.assets = self.family.discover(&self.config)?;
        self.report.discovered = self.assets.len();
        self.state = BuildState::AssetsDiscovered;

        info!(
            family = self.family.name(),
            discovered = self.assets.len(),
            "Discovered assets"
        );
        Ok(&self.assets)
    }

    /// Parse every discovered asset on a dedicated worker pool. Failures,
    /// panics included, become [`InvalidAsset`] sentinels.
    pub fn parse(&mut self) -> Result<&[ParsedAsset]> {
        self.require("parse", BuildState::AssetsDiscovered)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|idx| format!("catalog-parse-{}", idx))
            .build()
            .map_err(|e| BuildError::InvalidConfig(format!("cannot start worker pool: {}", e)))?;

        let family = self.family.as_ref();
        let extractor = &self.extractor;
        let assets = &self.assets;
        self.parsed = pool.install(|| {
            assets
                .par_iter()
                .map(|path| parse_isolated(family, extractor, path))
                .collect()
        });

        let valid = self.parsed.iter().filter(|p| p.is_valid()).count();
        self.report.valid = valid;
        self.report.invalid = self.parsed.len() - valid;
        self.state = BuildState::Parsed;

        info!(
            workers = self.config.workers,
            valid,
            invalid = self.parsed.len() - valid,
            "Parsed assets"
        );
        Ok(&self.parsed)
    }

    /// Smoke-test the parser: re-parse the first successfully parsed asset
    /// and check its record against the asset schema.
    pub fn validate_parser(&mut self) -> Result<()> {
        self.require("validate parser", BuildState::Parsed)?;

        let probe = self
            .parsed
            .iter()
            .find(|p| p.is_valid())
            .map(|p| p.path().to_path_buf());

        let Some(probe) = probe else {
            let invalid = self
                .parsed
                .iter()
                .filter_map(|p| match p {
                    ParsedAsset::Invalid(inv) => Some(inv.clone()),
                    ParsedAsset::Valid(_) => None,
                })
                .collect();
            return Err(BuildError::NoValidAssets { invalid });
        };

        let record = self
            .family
            .parse_one(&self.extractor, &probe)
            .map_err(|e| BuildError::SchemaViolation {
                path: probe.clone(),
                errors: vec![format!("{:#}", e)],
            })?;
        let instance = serde_json::to_value(record.to_row())?;
        let errors = self.schema.validate(&instance);
        if !errors.is_empty() {
            return Err(BuildError::SchemaViolation {
                path: probe,
                errors,
            });
        }

        debug!(probe = %probe.display(), "Parser output conforms to the asset schema");
        self.state = BuildState::Validated;
        Ok(())
    }

    /// Assemble the table: set sentinels aside, deduplicate, normalize
    /// list columns and make sure every row can be aggregated.
    pub fn clean(&mut self) -> Result<&CatalogTable> {
        self.require("clean", BuildState::Validated)?;

        let mut rows = Vec::new();
        let mut invalid = Vec::new();
        for parsed in self.parsed.drain(..) {
            match parsed {
                ParsedAsset::Valid(record) => rows.push(record.to_row()),
                ParsedAsset::Invalid(inv) => invalid.push(inv),
            }
        }

        let mut table = CatalogTable::from_rows(rows, COLUMN_ORDER);
        let duplicates = table.dedupe();
        if duplicates > 0 {
            debug!(duplicates, "Removed duplicate rows");
        }
        table.normalize_iterables();

        let demoted = demote_unaggregatable(&mut table, &self.config.aggregations);
        self.report.demoted = demoted.len();
        invalid.extend(demoted);

        if table.is_empty() {
            return Err(BuildError::NoValidAssets { invalid });
        }

        let groups = table.group_indices(&self.config.groupby_attrs);
        warn_duplicate_join_values(&table, &groups, &self.config.aggregations);

        self.report.duplicates_removed = duplicates;
        self.report.groups = groups.len();
        self.report.valid = table.len();
        self.report.invalid = invalid.len();
        self.table = table;
        self.invalid = invalid;
        self.state = BuildState::Cleaned;
        Ok(&self.table)
    }

    /// Run every step up to and including clean.
    pub fn build(&mut self) -> Result<&CatalogTable> {
        self.get_assets()?;
        self.parse()?;
        self.validate_parser()?;
        self.clean()?;

        info!(
            family = self.family.name(),
            report = ?self.report,
            "Catalog built"
        );
        Ok(&self.table)
    }

    /// Sidecar description for the built table.
    pub fn sidecar_options(&self, name: &str, description: &str) -> SidecarOptions {
        SidecarOptions {
            name: name.to_string(),
            description: description.to_string(),
            path_column: PATH_COLUMN.to_string(),
            variable_column: VARIABLE_COLUMN.to_string(),
            data_format: self.config.data_format,
            groupby_attrs: self.config.groupby_attrs.clone(),
            aggregations: self.config.aggregations.clone(),
            storage_options: self.config.storage_options.clone(),
        }
    }

    /// Write `<name>.json`, `<name>.csv.gz` and `<name>.invalid_assets.json`
    /// under `directory`.
    pub fn save(
        &mut self,
        name: &str,
        description: &str,
        directory: &Path,
    ) -> Result<SavedCatalog> {
        if !matches!(self.state, BuildState::Cleaned | BuildState::Saved) || self.table.is_empty() {
            return Err(BuildError::SaveBeforeBuild);
        }

        let spec = EsmCatalogSpec::describe(&self.table, &self.sidecar_options(name, description));
        let saved = write_catalog(directory, &self.table, &spec)?;

        let report_path = directory.join(format!("{}.invalid_assets.json", name));
        fs::write(&report_path, serde_json::to_string_pretty(&self.invalid)?)?;

        if !self.invalid.is_empty() {
            warn!(
                invalid = self.invalid.len(),
                report = %report_path.display(),
                "Some assets could not be cataloged"
            );
        }
        info!(
            catalog = name,
            rows = self.table.len(),
            sidecar = %saved.sidecar.display(),
            "Saved catalog"
        );
        self.state = BuildState::Saved;
        Ok(saved)
    }
}

fn parse_isolated(family: &dyn AssetFamily, extractor: &Extractor, path: &Path) -> ParsedAsset {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| family.parse_one(extractor, path)));
    let traceback = match outcome {
        Ok(Ok(record)) => return ParsedAsset::Valid(record),
        Ok(Err(err)) => format!("{:?}", err),
        Err(payload) => format!("panic while parsing: {}", panic_message(payload.as_ref())),
    };
    debug!(path = %path.display(), error = %traceback, "Asset parse failed");
    ParsedAsset::Invalid(InvalidAsset {
        path: path.to_path_buf(),
        traceback,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Non-union rules, which need a value in every row.
fn keyed_rules(rules: &[AggregationRule]) -> impl Iterator<Item = &AggregationRule> {
    rules
        .iter()
        .filter(|rule| !matches!(rule, AggregationRule::Union { .. }))
}

/// Remove rows lacking a value for an aggregation attribute and turn them
/// into sentinels.
fn demote_unaggregatable(table: &mut CatalogTable, rules: &[AggregationRule]) -> Vec<InvalidAsset> {
    let mut reasons: BTreeMap<usize, String> = BTreeMap::new();
    for rule in keyed_rules(rules) {
        let attribute = rule.attribute_name();
        for (idx, row) in table.rows().iter().enumerate() {
            if row.get(attribute).map_or(true, Cell::is_blank) {
                reasons.entry(idx).or_insert_with(|| {
                    format!("missing value for aggregation attribute '{}'", attribute)
                });
            }
        }
    }
    if reasons.is_empty() {
        return Vec::new();
    }

    let indices: BTreeSet<usize> = reasons.keys().copied().collect();
    let taken = table.take_rows(&indices);
    taken
        .into_iter()
        .zip(reasons.into_values())
        .map(|(row, traceback)| {
            let path = row
                .get(PATH_COLUMN)
                .and_then(Cell::as_text)
                .unwrap_or_default();
            warn!(path, reason = %traceback, "Demoted row to invalid asset");
            InvalidAsset {
                path: PathBuf::from(path),
                traceback,
            }
        })
        .collect()
}

fn warn_duplicate_join_values(
    table: &CatalogTable,
    groups: &BTreeMap<Vec<Cell>, Vec<usize>>,
    rules: &[AggregationRule],
) {
    for rule in rules {
        let AggregationRule::JoinExisting { attribute_name, .. } = rule else {
            continue;
        };
        for (key, indices) in groups {
            let mut seen = BTreeSet::new();
            let duplicated = indices
                .iter()
                .filter_map(|idx| table.rows()[*idx].get(attribute_name))
                .any(|value| !seen.insert(value));
            if duplicated {
                warn!(
                    group = ?key,
                    attribute = attribute_name.as_str(),
                    "Group has repeated join_existing values"
                );
            }
        }
    }
}
