//! Dataset access layer for NetCDF model output.
//!
//! The catalog builder only needs a read-only view of a file's dimensions,
//! variables, attributes and a handful of coordinate values. This crate
//! exposes that view as the [`Dataset`] trait and provides several backends:
//!
//! - [`cdl`]: parses CDL text as written by `ncdump` (used for `.cdl` files
//!   and as the header parser of the ncdump backend)
//! - [`ncdump`]: runs the `ncdump` command-line tool on a binary file
//! - `native` (cargo feature `native`): reads files through libnetcdf
//!
//! A dataset is closed when it is dropped, so the handle returned by
//! [`DatasetOpener::open`] should live no longer than the single asset it
//! describes.

pub mod cdl;
pub mod error;
pub mod ncdump;

#[cfg(feature = "native")]
pub mod native;

use std::collections::BTreeMap;
use std::path::Path;

pub use cdl::{CdlDataset, CdlDocument, CdlOpener};
pub use error::{NetCdfError, NetCdfResult};
pub use ncdump::NcdumpOpener;

/// Attribute value as seen by the catalog: text or a list of numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Numbers(_) => None,
        }
    }

    /// First numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Numbers(values) => values.first().copied(),
            AttrValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// A named dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
    pub unlimited: bool,
}

/// Header information for one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub dtype: String,
    pub dimensions: Vec<String>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl VariableInfo {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn attr_text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttrValue::as_text)
    }

    /// A coordinate variable is one named after one of its own dimensions.
    pub fn is_coordinate(&self) -> bool {
        self.dimensions.iter().any(|d| *d == self.name)
    }
}

/// Read-only view of an open dataset.
pub trait Dataset {
    fn path(&self) -> &Path;

    fn dimensions(&self) -> &[Dimension];

    fn variables(&self) -> &[VariableInfo];

    fn global_attributes(&self) -> &BTreeMap<String, AttrValue>;

    /// Read every value of a numeric variable, flattened in storage order.
    fn read_values(&self, variable: &str) -> NetCdfResult<Vec<f64>>;

    fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables().iter().find(|v| v.name == name)
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions()
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.len)
    }
}

/// Opens datasets by path.
pub trait DatasetOpener: Send + Sync {
    fn open(&self, path: &Path) -> NetCdfResult<Box<dyn Dataset>>;
}

/// Picks a backend per file: CDL text for `.cdl` files, otherwise libnetcdf
/// when built with the `native` feature, otherwise `ncdump`.
#[derive(Debug, Clone, Default)]
pub struct AutoOpener {
    cdl: CdlOpener,
    ncdump: NcdumpOpener,
}

impl AutoOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DatasetOpener for AutoOpener {
    fn open(&self, path: &Path) -> NetCdfResult<Box<dyn Dataset>> {
        let is_cdl = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("cdl"));
        if is_cdl {
            return self.cdl.open(path);
        }

        #[cfg(feature = "native")]
        {
            native::NativeOpener.open(path)
        }

        #[cfg(not(feature = "native"))]
        {
            self.ncdump.open(path)
        }
    }
}
