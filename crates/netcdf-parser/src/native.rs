//! Native NetCDF access using the netcdf library.
//!
//! Enabled with the `native` cargo feature. Requires libnetcdf and HDF5 on
//! the build host (`libhdf5-dev libnetcdf-dev`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use netcdf::AttributeValue;

use crate::error::{NetCdfError, NetCdfResult};
use crate::{AttrValue, Dataset, DatasetOpener, Dimension, VariableInfo};

/// Silence HDF5's automatic error printing to stderr.
///
/// HDF5 prints diagnostics even for errors the caller handles, such as
/// probing for an optional attribute. Safe to call more than once.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and null handlers disable
        // automatic error printing.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Opens files with libnetcdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeOpener;

impl DatasetOpener for NativeOpener {
    fn open(&self, path: &Path) -> NetCdfResult<Box<dyn Dataset>> {
        silence_hdf5_errors();

        let file = netcdf::open(path)
            .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to open NetCDF: {}", e)))?;

        let dimensions = file
            .dimensions()
            .map(|d| Dimension {
                name: d.name(),
                len: d.len(),
                unlimited: d.is_unlimited(),
            })
            .collect();

        let variables = file
            .variables()
            .map(|var| VariableInfo {
                name: var.name(),
                dtype: format!("{:?}", var.vartype()),
                dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
                attributes: var
                    .attributes()
                    .filter_map(|attr| Some((attr.name().to_string(), convert(attr.value().ok()?))))
                    .collect(),
            })
            .collect();

        let global_attributes = file
            .attributes()
            .filter_map(|attr| Some((attr.name().to_string(), convert(attr.value().ok()?))))
            .collect();

        Ok(Box::new(NativeDataset {
            path: path.to_path_buf(),
            file,
            dimensions,
            variables,
            global_attributes,
        }))
    }
}

/// An open libnetcdf file. The handle is closed on drop.
pub struct NativeDataset {
    path: PathBuf,
    file: netcdf::File,
    dimensions: Vec<Dimension>,
    variables: Vec<VariableInfo>,
    global_attributes: BTreeMap<String, AttrValue>,
}

impl Dataset for NativeDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    fn global_attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.global_attributes
    }

    fn read_values(&self, variable: &str) -> NetCdfResult<Vec<f64>> {
        let var = self
            .file
            .variable(variable)
            .ok_or_else(|| NetCdfError::MissingData(format!("variable {}", variable)))?;
        let values: Vec<f64> = var.get_values(..).map_err(|e| {
            NetCdfError::InvalidFormat(format!("Failed to read {}: {}", variable, e))
        })?;
        Ok(values)
    }
}

fn convert(value: AttributeValue) -> AttrValue {
    fn numbers<T: Into<f64>>(values: Vec<T>) -> AttrValue {
        AttrValue::Numbers(values.into_iter().map(Into::into).collect())
    }

    match value {
        AttributeValue::Str(s) => AttrValue::Text(s),
        AttributeValue::Strs(s) => AttrValue::Text(s.concat()),
        AttributeValue::Double(v) => numbers(vec![v]),
        AttributeValue::Doubles(v) => numbers(v),
        AttributeValue::Float(v) => numbers(vec![v]),
        AttributeValue::Floats(v) => numbers(v),
        AttributeValue::Int(v) => numbers(vec![v]),
        AttributeValue::Ints(v) => numbers(v),
        AttributeValue::Uint(v) => numbers(vec![v]),
        AttributeValue::Uints(v) => numbers(v),
        AttributeValue::Short(v) => numbers(vec![v]),
        AttributeValue::Shorts(v) => numbers(v),
        AttributeValue::Ushort(v) => numbers(vec![v]),
        AttributeValue::Ushorts(v) => numbers(v),
        AttributeValue::Schar(v) => numbers(vec![v]),
        AttributeValue::Schars(v) => numbers(v),
        AttributeValue::Uchar(v) => numbers(vec![v]),
        AttributeValue::Uchars(v) => numbers(v),
        AttributeValue::Longlong(v) => AttrValue::Numbers(vec![v as f64]),
        AttributeValue::Longlongs(v) => {
            AttrValue::Numbers(v.into_iter().map(|x| x as f64).collect())
        }
        AttributeValue::Ulonglong(v) => AttrValue::Numbers(vec![v as f64]),
        AttributeValue::Ulonglongs(v) => {
            AttrValue::Numbers(v.into_iter().map(|x| x as f64).collect())
        }
        #[allow(unreachable_patterns)]
        _ => AttrValue::Numbers(Vec::new()),
    }
}
