//! Merge one build into the versioned catalog store.
//!
//! Every source is written into a hidden staging directory first. Only
//! once all of them succeeded is the staging directory renamed to the
//! version directory and the registry replaced, so a failed build leaves
//! the store exactly as it found it.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::{
    check_metacatalog_name, fingerprint, storage_flags, write_version_files, SourceSummary,
    SOURCE_DIR,
};
use crate::error::{Result, StoreError};
use crate::registry::{
    CatalogArgs, CatalogEntry, CatalogMetadata, Parameters, RegistryDocument, VersionParameter,
    VersionPointers, VersionRecord, DEFAULT_DRIVER, VERSION_PLACEHOLDER,
};
use crate::version::{scan_versions, VersionStamp};

/// One data source of a build.
pub trait CatalogSource {
    fn name(&self) -> &str;

    /// Build the source and write its artifacts under `directory`.
    fn materialize(&mut self, directory: &Path) -> anyhow::Result<SourceSummary>;
}

/// Parameters of one build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Logical catalog name in the registry
    pub catalog_name: String,
    pub description: String,
    pub version: VersionStamp,
    /// Directory holding the version directories
    pub base: PathBuf,
    /// The registry document
    pub registry_path: PathBuf,
    /// File name of the meta-catalog inside each version directory
    pub metacatalog_file: String,
    /// Materialize even when content is unchanged
    pub force: bool,
    /// Leave the registry untouched
    pub no_update: bool,
}

/// What happened to the requested version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// A new version directory was written
    Materialized { directory: PathBuf },
    /// Content matched the current max version; nothing was written
    Unchanged { alias_of: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub version: VersionStamp,
    pub fingerprint: String,
    pub outcome: BuildOutcome,
    /// Registry pointers after the build, `None` when the registry was not updated
    pub pointers: Option<VersionPointers>,
}

/// Removes the staging directory unless committed.
struct Staging {
    path: PathBuf,
    committed: bool,
}

impl Staging {
    fn create(base: &Path) -> Result<Self> {
        let path = base.join(format!(".staging-{}", Uuid::new_v4()));
        fs::create_dir_all(path.join(SOURCE_DIR))?;
        Ok(Self {
            path,
            committed: false,
        })
    }

    fn commit(mut self, target: &Path) -> Result<()> {
        fs::rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove staging directory"
                );
            }
        }
    }
}

pub struct Reconciler {
    request: BuildRequest,
}

impl Reconciler {
    pub fn new(request: BuildRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    /// Build every source and fold the result into the store.
    pub fn run(&self, sources: &mut [Box<dyn CatalogSource>]) -> Result<ReconcileReport> {
        let req = &self.request;
        if sources.is_empty() {
            return Err(StoreError::NoSources);
        }
        check_metacatalog_name(&req.metacatalog_file)?;
        let mut names = BTreeSet::new();
        for source in sources.iter() {
            if !names.insert(source.name().to_string()) {
                return Err(StoreError::DuplicateSource(source.name().to_string()));
            }
        }

        // Registry problems must surface before anything is built.
        let registry = RegistryDocument::load(&req.registry_path)?;
        let existing = registry
            .as_ref()
            .and_then(|doc| doc.sources.get(&req.catalog_name))
            .cloned();
        if let Some(entry) = &existing {
            let registered = Path::new(&entry.args.path).file_name();
            if registered != Some(OsStr::new(&req.metacatalog_file)) {
                return Err(StoreError::RegistryConflict {
                    path: req.registry_path.clone(),
                    message: format!(
                        "'{}' points at {}, this build writes {}",
                        req.catalog_name, entry.args.path, req.metacatalog_file
                    ),
                });
            }
        }
        let previous = match &existing {
            Some(entry) => {
                let p = entry.pointers();
                Some((p.min, p.max))
            }
            None => {
                let scanned = scan_versions(&req.base)?;
                scanned.first().copied().zip(scanned.last().copied())
            }
        };

        fs::create_dir_all(&req.base)?;
        let staging = Staging::create(&req.base)?;
        let source_dir = staging.path.join(SOURCE_DIR);

        let mut summaries = Vec::with_capacity(sources.len());
        for source in sources.iter_mut() {
            let name = source.name().to_string();
            info!(source = %name, version = %req.version, "Building source");
            let summary = source
                .materialize(&source_dir)
                .map_err(|e| StoreError::SourceFailed {
                    name: name.clone(),
                    message: format!("{:#}", e),
                })?;
            summaries.push(summary);
        }

        let fingerprint = fingerprint(&summaries);
        let storage = storage_flags(
            summaries
                .iter()
                .flat_map(|s| s.data_paths.iter().map(PathBuf::as_path)),
        );

        let unchanged = existing.as_ref().and_then(|entry| {
            let max = entry.pointers().max;
            entry
                .versions
                .get(&max)
                .filter(|record| record.fingerprint == fingerprint)
                .cloned()
        });

        let (record, outcome) = match unchanged {
            Some(record) if !req.force => {
                info!(
                    version = %req.version,
                    alias_of = %record.directory,
                    "Catalog content unchanged, not materializing a new version"
                );
                let outcome = BuildOutcome::Unchanged {
                    alias_of: record.directory.clone(),
                };
                (record, outcome)
            }
            _ => {
                let directory = req.base.join(req.version.to_string());
                if directory.exists() {
                    return Err(StoreError::VersionExists(directory));
                }
                write_version_files(
                    &staging.path,
                    &directory,
                    &req.metacatalog_file,
                    req.version,
                    &fingerprint,
                    &summaries,
                )?;
                staging.commit(&directory)?;
                info!(directory = %directory.display(), "Materialized catalog version");

                let record = VersionRecord {
                    directory: req.version.to_string(),
                    fingerprint: fingerprint.clone(),
                };
                (record, BuildOutcome::Materialized { directory })
            }
        };

        if req.no_update {
            info!("Registry update skipped");
            return Ok(ReconcileReport {
                version: req.version,
                fingerprint,
                outcome,
                pointers: None,
            });
        }

        let pointers = VersionPointers::advance(previous, req.version);
        let mut document = registry.unwrap_or_default();
        let mut entry = existing.unwrap_or_else(|| self.new_entry(pointers));
        entry.description = req.description.clone();
        if !storage.is_empty() {
            entry.metadata.storage = merge_storage(&entry.metadata.storage, &storage);
        }
        entry.set_pointers(pointers);
        entry.versions.insert(req.version, record);
        document.sources.insert(req.catalog_name.clone(), entry);
        document.write_atomic(&req.registry_path)?;

        info!(
            catalog = %req.catalog_name,
            min = %pointers.min,
            max = %pointers.max,
            default = %pointers.default,
            "Updated registry"
        );
        Ok(ReconcileReport {
            version: req.version,
            fingerprint,
            outcome,
            pointers: Some(pointers),
        })
    }

    fn new_entry(&self, pointers: VersionPointers) -> CatalogEntry {
        let path = self
            .request
            .base
            .join(VERSION_PLACEHOLDER)
            .join(&self.request.metacatalog_file);
        CatalogEntry {
            description: self.request.description.clone(),
            driver: DEFAULT_DRIVER.to_string(),
            args: CatalogArgs {
                path: path.to_string_lossy().into_owned(),
                mode: "r".to_string(),
            },
            metadata: CatalogMetadata {
                version: VERSION_PLACEHOLDER.to_string(),
                storage: String::new(),
            },
            parameters: Parameters {
                version: VersionParameter {
                    description: "Catalog version".to_string(),
                    kind: "str".to_string(),
                    default: pointers.default,
                    min: pointers.min,
                    max: pointers.max,
                },
            },
            versions: Default::default(),
        }
    }
}

fn merge_storage(current: &str, added: &str) -> String {
    let flags: BTreeSet<&str> = current
        .split('+')
        .chain(added.split('+'))
        .filter(|f| !f.is_empty())
        .collect();
    flags.into_iter().collect::<Vec<_>>().join("+")
}
