//! Contents of a materialized version directory.
//!
//! ```text
//! <base>/<version>/
//!     metacatalog.csv      one row per source (name configurable)
//!     build.json           fingerprint and source names
//!     source/<name>.json   per-source sidecars, tables and invalid-asset reports
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use catalog_common::{CatalogRow, CatalogTable, Cell};

use crate::error::{Result, StoreError};
use crate::version::VersionStamp;

/// Default name of the meta-catalog inside a version directory.
pub const METACATALOG_FILE: &str = "metacatalog.csv";
pub const MANIFEST_FILE: &str = "build.json";
pub const SOURCE_DIR: &str = "source";

const METACATALOG_COLUMNS: &[&str] =
    &["name", "description", "realm", "frequency", "variable", "yaml"];

/// What one source contributed to a build.
#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub name: String,
    pub description: String,
    /// Sidecar path relative to the `source/` directory
    pub sidecar: PathBuf,
    /// The cleaned table that was saved
    pub table: CatalogTable,
    /// Roots the source was crawled from
    pub data_paths: Vec<PathBuf>,
}

impl SourceSummary {
    fn distinct(&self, column: &str) -> Vec<String> {
        let values: BTreeSet<String> = self
            .table
            .rows()
            .iter()
            .filter_map(|row| row.get(column))
            .flat_map(|cell| cell.clone().into_list())
            .filter(|v| !v.is_empty())
            .collect();
        values.into_iter().collect()
    }

    fn metacatalog_row(&self, version_dir: &Path) -> CatalogRow {
        let mut row = CatalogRow::new();
        row.insert("name".into(), Cell::text(&self.name));
        row.insert("description".into(), Cell::text(&self.description));
        row.insert("realm".into(), Cell::List(self.distinct("realm")));
        row.insert("frequency".into(), Cell::List(self.distinct("frequency")));
        row.insert("variable".into(), Cell::List(self.distinct("variable")));
        let sidecar = version_dir.join(SOURCE_DIR).join(&self.sidecar);
        row.insert("yaml".into(), Cell::text(sidecar.to_string_lossy()));
        row
    }
}

/// SHA-256 over every source, in name order: the source name followed by
/// its canonical rows.
pub fn fingerprint(sources: &[SourceSummary]) -> String {
    let mut ordered: Vec<&SourceSummary> = sources.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    for source in ordered {
        hasher.update(b"source\x1e");
        hasher.update(source.name.as_bytes());
        hasher.update(b"\n");
        for line in source.table.canonical_lines() {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
    }
    format!("{:x}", hasher.finalize())
}

/// The meta-catalog name must be a plain file name that does not collide
/// with the other version directory entries.
pub fn check_metacatalog_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain || name == MANIFEST_FILE || name == SOURCE_DIR {
        return Err(StoreError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// `build.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub version: VersionStamp,
    pub fingerprint: String,
    pub sources: Vec<String>,
    pub created: DateTime<Utc>,
}

/// Write the metacatalog and manifest into `staging`. Rows reference the
/// sidecars at their final location under `version_dir`.
pub fn write_version_files(
    staging: &Path,
    version_dir: &Path,
    metacatalog_file: &str,
    version: VersionStamp,
    fingerprint: &str,
    sources: &[SourceSummary],
) -> Result<BuildManifest> {
    check_metacatalog_name(metacatalog_file)?;
    let rows = sources.iter().map(|s| s.metacatalog_row(version_dir)).collect();
    let table = CatalogTable::from_rows(rows, METACATALOG_COLUMNS);
    fs::write(staging.join(metacatalog_file), table.to_csv())?;

    let mut names: Vec<String> = sources.iter().map(|s| s.name.clone()).collect();
    names.sort();
    let manifest = BuildManifest {
        version,
        fingerprint: fingerprint.to_string(),
        sources: names,
        created: Utc::now(),
    };
    fs::write(staging.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;
    Ok(manifest)
}

/// Project storage flags for data under `/g/data/<project>` or
/// `/scratch/<project>`, e.g. `gdata/al33+scratch/tm70`.
pub fn storage_flags<'a>(paths: impl IntoIterator<Item = &'a Path>) -> String {
    let mut flags = BTreeSet::new();
    for path in paths {
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        match parts.as_slice() {
            [g, data, project, ..] if g == "g" && data == "data" => {
                flags.insert(format!("gdata/{}", project));
            }
            [scratch, project, ..] if scratch == "scratch" => {
                flags.insert(format!("scratch/{}", project));
            }
            _ => {}
        }
    }
    flags.into_iter().collect::<Vec<_>>().join("+")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, paths: &[&str]) -> SourceSummary {
        let rows = paths
            .iter()
            .map(|p| {
                let mut row = CatalogRow::new();
                row.insert("path".into(), Cell::text(*p));
                row.insert("realm".into(), Cell::text("ocean"));
                row.insert("variable".into(), Cell::list(["temp", "salt"]));
                row
            })
            .collect();
        SourceSummary {
            name: name.to_string(),
            description: format!("{} description", name),
            sidecar: PathBuf::from(format!("{}.json", name)),
            table: CatalogTable::from_rows(rows, &["path"]),
            data_paths: Vec::new(),
        }
    }

    #[test]
    fn test_fingerprint_ignores_row_and_source_order() {
        let a = vec![summary("om2", &["/a.nc", "/b.nc"]), summary("esm", &["/c.nc"])];
        let b = vec![summary("esm", &["/c.nc"]), summary("om2", &["/b.nc", "/a.nc"])];
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn test_fingerprint_sees_content_and_names() {
        let base = fingerprint(&[summary("om2", &["/a.nc"])]);
        assert_ne!(base, fingerprint(&[summary("om2", &["/a.nc", "/b.nc"])]));
        assert_ne!(base, fingerprint(&[summary("om3", &["/a.nc"])]));
    }

    #[test]
    fn test_storage_flags() {
        let paths = [
            Path::new("/g/data/ik11/outputs/access-om2"),
            Path::new("/g/data/al33/replicas"),
            Path::new("/scratch/tm70/run"),
            Path::new("/home/user/data"),
            Path::new("/g/data/ik11/other"),
        ];
        assert_eq!(storage_flags(paths), "gdata/al33+gdata/ik11+scratch/tm70");
        assert_eq!(storage_flags(std::iter::empty::<&Path>()), "");
    }

    #[test]
    fn test_version_files() {
        let dir = tempfile::tempdir().unwrap();
        let version: VersionStamp = "v2024-01-01".parse().unwrap();
        let sources = vec![summary("om2", &["/a.nc"])];
        let manifest = write_version_files(
            dir.path(),
            Path::new("/base/v2024-01-01"),
            METACATALOG_FILE,
            version,
            "abc",
            &sources,
        )
        .unwrap();
        assert_eq!(manifest.sources, ["om2"]);

        let csv = fs::read_to_string(dir.path().join(METACATALOG_FILE)).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("name,description,realm,frequency,variable,yaml"));
        let row = lines.next().unwrap();
        assert!(row.contains("['salt', 'temp']"), "{}", row);
        assert!(row.ends_with("/base/v2024-01-01/source/om2.json"));
    }

    #[test]
    fn test_metacatalog_name_checked() {
        check_metacatalog_name("metacatalog.csv").unwrap();
        check_metacatalog_name("experiments.csv").unwrap();
        for bad in ["", "sub/metacatalog.csv", "/abs.csv", "..", MANIFEST_FILE, SOURCE_DIR] {
            assert!(
                matches!(check_metacatalog_name(bad), Err(StoreError::InvalidFileName(_))),
                "{:?}",
                bad
            );
        }
    }
}
