//! Dataset access through the `ncdump` command-line tool.
//!
//! The header comes from `ncdump -h`; coordinate values are fetched lazily
//! with `ncdump -v <var>` the first time they are asked for. Slower than
//! linking libnetcdf, but it needs nothing beyond the NetCDF utilities.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::cdl::CdlDocument;
use crate::error::{NetCdfError, NetCdfResult};
use crate::{AttrValue, Dataset, DatasetOpener, Dimension, VariableInfo};

/// Opens binary NetCDF files by shelling out to `ncdump`.
#[derive(Debug, Clone)]
pub struct NcdumpOpener {
    program: PathBuf,
}

impl Default for NcdumpOpener {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ncdump"),
        }
    }
}

impl NcdumpOpener {
    /// Use a specific `ncdump` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DatasetOpener for NcdumpOpener {
    fn open(&self, path: &Path) -> NetCdfResult<Box<dyn Dataset>> {
        if !path.is_file() {
            return Err(NetCdfError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a file", path.display()),
            )));
        }
        let header = run_ncdump(&self.program, &["-h"], path)?;
        let header = CdlDocument::parse(&header)?;
        debug!(
            path = %path.display(),
            variables = header.variables.len(),
            "Parsed ncdump header"
        );
        Ok(Box::new(NcdumpDataset {
            program: self.program.clone(),
            path: path.to_path_buf(),
            header,
        }))
    }
}

/// A dataset whose header was read with `ncdump -h`.
#[derive(Debug)]
pub struct NcdumpDataset {
    program: PathBuf,
    path: PathBuf,
    header: CdlDocument,
}

impl Dataset for NcdumpDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dimensions(&self) -> &[Dimension] {
        &self.header.dimensions
    }

    fn variables(&self) -> &[VariableInfo] {
        &self.header.variables
    }

    fn global_attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.header.global_attributes
    }

    fn read_values(&self, variable: &str) -> NetCdfResult<Vec<f64>> {
        if self.variable(variable).is_none() {
            return Err(NetCdfError::MissingData(format!("variable {}", variable)));
        }
        let dump = run_ncdump(&self.program, &["-v", variable, "-p", "9,17"], &self.path)?;
        let doc = CdlDocument::parse(&dump)?;
        doc.data
            .get(variable)
            .cloned()
            .ok_or_else(|| NetCdfError::MissingData(format!("data for variable {}", variable)))
    }

    /// ncdump reports the current length of unlimited dimensions in a
    /// comment, so read it from the data instead.
    fn dimension_len(&self, name: &str) -> Option<usize> {
        let dim = self.header.dimensions.iter().find(|d| d.name == name)?;
        if !dim.unlimited {
            return Some(dim.len);
        }
        self.read_values(name).ok().map(|v| v.len())
    }
}

fn run_ncdump(program: &Path, args: &[&str], path: &Path) -> NetCdfResult<String> {
    let output = Command::new(program)
        .args(args)
        .arg(path)
        .output()
        .map_err(|e| NetCdfError::CommandError(format!("Failed to run ncdump: {}", e)))?;

    if !output.status.success() {
        return Err(NetCdfError::CommandError(format!(
            "ncdump failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
