//! ESM catalog sidecar document (intake-esm `esmcat` layout).
//!
//! A saved catalog is a gzip CSV table plus this JSON document describing
//! its columns, asset column, grouping key and aggregation rules.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};
use crate::table::CatalogTable;

pub const ESMCAT_VERSION: &str = "0.0.1";

/// How rows sharing a grouping key are combined by a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationRule {
    /// Merge the variables of all rows in a group.
    Union { attribute_name: String },
    /// Concatenate along an existing dimension, ordered by the attribute.
    JoinExisting {
        attribute_name: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        options: BTreeMap<String, String>,
    },
    /// Stack along a new dimension keyed by the attribute.
    JoinNew {
        attribute_name: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        options: BTreeMap<String, String>,
    },
}

impl AggregationRule {
    pub fn attribute_name(&self) -> &str {
        match self {
            AggregationRule::Union { attribute_name }
            | AggregationRule::JoinExisting { attribute_name, .. }
            | AggregationRule::JoinNew { attribute_name, .. } => attribute_name,
        }
    }

    /// `join_existing` on `start_date` along `time`, combined by coordinates.
    pub fn default_join_existing(time_dim: &str) -> Self {
        let mut options = BTreeMap::new();
        options.insert("dim".to_string(), time_dim.to_string());
        options.insert("combine".to_string(), "by_coords".to_string());
        AggregationRule::JoinExisting {
            attribute_name: "start_date".to_string(),
            options,
        }
    }

    pub fn join_new(attribute_name: impl Into<String>) -> Self {
        AggregationRule::JoinNew {
            attribute_name: attribute_name.into(),
            options: BTreeMap::new(),
        }
    }
}

/// On-disk format of the assets a catalog points to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Netcdf,
    Zarr,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub column_name: String,
    #[serde(default)]
    pub vocabulary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    pub column_name: String,
    pub format: DataFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationControl {
    pub variable_column_name: String,
    pub groupby_attrs: Vec<String>,
    pub aggregations: Vec<AggregationRule>,
}

/// The sidecar document written next to `<name>.csv.gz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsmCatalogSpec {
    pub esmcat_version: String,
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub catalog_file: String,
    pub attributes: Vec<Attribute>,
    pub assets: Assets,
    pub aggregation_control: AggregationControl,
    #[serde(default)]
    pub storage_options: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub columns_with_iterables: Vec<String>,
}

/// Everything needed to describe a table in a sidecar, minus the table itself.
#[derive(Debug, Clone)]
pub struct SidecarOptions {
    pub name: String,
    pub description: String,
    pub path_column: String,
    pub variable_column: String,
    pub data_format: DataFormat,
    pub groupby_attrs: Vec<String>,
    pub aggregations: Vec<AggregationRule>,
    pub storage_options: BTreeMap<String, serde_json::Value>,
}

impl EsmCatalogSpec {
    /// Describe `table`. A `union` over the variable column is always
    /// present, placed ahead of the configured rules.
    pub fn describe(table: &CatalogTable, options: &SidecarOptions) -> Self {
        let mut aggregations = vec![AggregationRule::Union {
            attribute_name: options.variable_column.clone(),
        }];
        aggregations.extend(
            options
                .aggregations
                .iter()
                .filter(|rule| !matches!(rule, AggregationRule::Union { .. }))
                .cloned(),
        );

        let iterables: BTreeSet<String> = table.columns_with_iterables();

        Self {
            esmcat_version: ESMCAT_VERSION.to_string(),
            id: options.name.clone(),
            description: options.description.clone(),
            title: None,
            last_updated: Utc::now(),
            catalog_file: format!("{}.csv.gz", options.name),
            attributes: table
                .columns()
                .iter()
                .filter(|c| **c != options.path_column)
                .map(|c| Attribute {
                    column_name: c.clone(),
                    vocabulary: String::new(),
                })
                .collect(),
            assets: Assets {
                column_name: options.path_column.clone(),
                format: options.data_format,
            },
            aggregation_control: AggregationControl {
                variable_column_name: options.variable_column.clone(),
                groupby_attrs: options.groupby_attrs.clone(),
                aggregations,
            },
            storage_options: options.storage_options.clone(),
            columns_with_iterables: iterables.into_iter().collect(),
        }
    }

    pub fn iterable_columns(&self) -> BTreeSet<String> {
        self.columns_with_iterables.iter().cloned().collect()
    }

    pub fn read(path: &Path) -> CatalogResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Paths of a saved catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCatalog {
    pub sidecar: PathBuf,
    pub table: PathBuf,
}

/// Write `<name>.json` and `<name>.csv.gz` under `directory`.
pub fn write_catalog(
    directory: &Path,
    table: &CatalogTable,
    spec: &EsmCatalogSpec,
) -> CatalogResult<SavedCatalog> {
    if table.is_empty() {
        return Err(CatalogError::InvalidTable(format!(
            "refusing to write empty catalog '{}'",
            spec.id
        )));
    }
    fs::create_dir_all(directory)?;

    let table_path = directory.join(&spec.catalog_file);
    table.write_csv_gz(&table_path)?;

    let sidecar_path = directory.join(format!("{}.json", spec.id));
    let body = serde_json::to_string_pretty(spec)?;
    fs::write(&sidecar_path, body)?;

    Ok(SavedCatalog {
        sidecar: sidecar_path,
        table: table_path,
    })
}

/// Load a saved catalog back from its sidecar.
pub fn read_catalog(sidecar: &Path) -> CatalogResult<(EsmCatalogSpec, CatalogTable)> {
    let spec = EsmCatalogSpec::read(sidecar)?;
    let directory = sidecar.parent().unwrap_or_else(|| Path::new("."));
    let table =
        CatalogTable::read_csv_gz(&directory.join(&spec.catalog_file), &spec.iterable_columns())?;
    Ok((spec, table))
}
