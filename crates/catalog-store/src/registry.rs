//! The version registry document (`catalog.yaml`).
//!
//! Laid out as an intake catalog: one source per logical catalog name,
//! whose `version` parameter carries the min/max/default pointers. The
//! `versions` map records which artifact directory serves each stamp and
//! the content fingerprint it was built from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::version::VersionStamp;

pub const DEFAULT_DRIVER: &str = "intake_dataframe_catalog.core.DfFileCatalog";
pub const VERSION_PLACEHOLDER: &str = "{{version}}";

/// Where and from what one version was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Directory under the build base holding the artifact
    pub directory: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogArgs {
    pub path: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "r".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub version: String,
    #[serde(default)]
    pub storage: String,
}

/// The `version` user parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionParameter {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub default: VersionStamp,
    pub min: VersionStamp,
    pub max: VersionStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub version: VersionParameter,
}

/// Registry entry for one catalog name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub description: String,
    pub driver: String,
    pub args: CatalogArgs,
    pub metadata: CatalogMetadata,
    pub parameters: Parameters,
    #[serde(default)]
    pub versions: BTreeMap<VersionStamp, VersionRecord>,
}

/// The min/max/default triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionPointers {
    pub min: VersionStamp,
    pub max: VersionStamp,
    pub default: VersionStamp,
}

impl VersionPointers {
    /// Pointers after adding `version` to a registry that had `previous`.
    /// `min` never regresses and `default` follows `max`.
    pub fn advance(previous: Option<(VersionStamp, VersionStamp)>, version: VersionStamp) -> Self {
        let (min, max) = match previous {
            Some((min, max)) => (min.min(version), max.max(version)),
            None => (version, version),
        };
        Self {
            min,
            max,
            default: max,
        }
    }
}

impl CatalogEntry {
    pub fn pointers(&self) -> VersionPointers {
        let v = &self.parameters.version;
        VersionPointers {
            min: v.min,
            max: v.max,
            default: v.default,
        }
    }

    pub fn set_pointers(&mut self, pointers: VersionPointers) {
        let v = &mut self.parameters.version;
        v.min = pointers.min;
        v.max = pointers.max;
        v.default = pointers.default;
    }

    fn check(&self, name: &str) -> std::result::Result<(), String> {
        let p = self.pointers();
        if p.min > p.max {
            return Err(format!("'{}' has min {} after max {}", name, p.min, p.max));
        }
        if p.default < p.min || p.default > p.max {
            return Err(format!(
                "'{}' has default {} outside [{}, {}]",
                name, p.default, p.min, p.max
            ));
        }
        if !self.args.path.contains(VERSION_PLACEHOLDER) {
            return Err(format!("'{}' path does not contain {}", name, VERSION_PLACEHOLDER));
        }
        Ok(())
    }
}

/// The whole `catalog.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub sources: BTreeMap<String, CatalogEntry>,
}

impl RegistryDocument {
    /// Read the registry at `path`. A missing file is `None`; a document
    /// that cannot be read or is internally inconsistent is a conflict.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let conflict = |message: String| StoreError::RegistryConflict {
            path: path.to_path_buf(),
            message,
        };

        let raw = fs::read_to_string(path)?;
        let document: Self = serde_yaml::from_str(&raw).map_err(|e| conflict(e.to_string()))?;
        for (name, entry) in &document.sources {
            entry.check(name).map_err(conflict)?;
        }
        debug!(path = %path.display(), catalogs = document.sources.len(), "Loaded registry");
        Ok(Some(document))
    }

    /// Write to a temporary file next to `path` and rename it into place.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let body = serde_yaml::to_string(self)?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "catalog.yaml".to_string());
        let tmp: PathBuf = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}
