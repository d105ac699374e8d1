//! The ncdump backend must agree with the CDL backend on the same dataset.
//!
//! These tests need the NetCDF utilities (`ncgen`, `ncdump`) and skip
//! themselves when they are not installed.

use std::path::{Path, PathBuf};
use std::process::Command;

use netcdf_parser::{CdlOpener, Dataset, DatasetOpener, NcdumpOpener};
use test_utils::{ocean_month, require_command};

/// Write `cdl` as binary NetCDF next to it.
fn ncgen(cdl: &Path) -> PathBuf {
    let nc = cdl.with_extension("nc");
    let status = Command::new("ncgen")
        .arg("-o")
        .arg(&nc)
        .arg(cdl)
        .status()
        .unwrap();
    assert!(status.success(), "ncgen failed on {}", cdl.display());
    nc
}

fn variable_names(ds: &dyn Dataset) -> Vec<String> {
    ds.variables().iter().map(|v| v.name.clone()).collect()
}

#[test]
fn test_ncdump_matches_cdl() {
    require_command!("ncgen");
    require_command!("ncdump");

    let dir = tempfile::tempdir().unwrap();
    let cdl = ocean_month(1900, 3).write(dir.path(), "ocean_month.cdl");
    let nc = ncgen(&cdl);

    let text = CdlOpener.open(&cdl).unwrap();
    let binary = NcdumpOpener::default().open(&nc).unwrap();

    assert_eq!(variable_names(text.as_ref()), variable_names(binary.as_ref()));
    assert_eq!(binary.dimension_len("time"), Some(3));
    assert_eq!(
        binary.variable("temp").and_then(|v| v.attr_text("long_name")),
        text.variable("temp").and_then(|v| v.attr_text("long_name"))
    );
    assert_eq!(
        binary.read_values("time").unwrap(),
        text.read_values("time").unwrap()
    );
}

#[test]
fn test_ncdump_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(NcdumpOpener::default()
        .open(&dir.path().join("absent.nc"))
        .is_err());
}
