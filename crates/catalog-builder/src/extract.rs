//! Asset metadata extraction.
//!
//! Combines the filename pattern parser with a read-only look inside the
//! file: catalog-eligible variables and the time axis.

use std::path::Path;
use std::sync::Arc;

use netcdf_parser::{Dataset, DatasetOpener, VariableInfo};

use crate::error::{BuildError, Result};
use crate::patterns::PatternSet;
use crate::record::{AssetRecord, VariableDescriptor};
use crate::timeinfo::TimeResolver;

/// Extracts an [`AssetRecord`] from one file.
#[derive(Clone)]
pub struct Extractor {
    opener: Arc<dyn DatasetOpener>,
    patterns: PatternSet,
    resolver: Arc<dyn TimeResolver>,
    time_dim: String,
}

impl Extractor {
    pub fn new(
        opener: Arc<dyn DatasetOpener>,
        patterns: PatternSet,
        resolver: Arc<dyn TimeResolver>,
        time_dim: impl Into<String>,
    ) -> Self {
        Self {
            opener,
            patterns,
            resolver,
            time_dim: time_dim.into(),
        }
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn time_dim(&self) -> &str {
        &self.time_dim
    }

    pub fn extract(&self, path: &Path) -> Result<AssetRecord> {
        self.extract_removing(path, &[])
    }

    /// Like [`Extractor::extract`], but deletes each of `literals` from the
    /// filename before deriving the file_id.
    pub fn extract_removing(&self, path: &Path, literals: &[&str]) -> Result<AssetRecord> {
        let filename = file_stem(path)?;
        let mut keyed = filename.clone();
        for literal in literals.iter().filter(|l| !l.is_empty()) {
            keyed = keyed.replace(literal, "");
        }
        let parsed = self.patterns.parse(&keyed);

        // The dataset handle is dropped, and the file closed, on every exit
        // path out of this block.
        let (variables, time) = {
            let dataset = self.opener.open(path)?;
            let variables = catalog_variables(dataset.as_ref());
            if variables.is_empty() {
                return Err(BuildError::EmptyDataset(path.to_path_buf()));
            }
            let time = self
                .resolver
                .resolve(dataset.as_ref(), parsed.frequency, &self.time_dim)?;
            (variables, time)
        };

        Ok(AssetRecord {
            path: path.to_path_buf(),
            filename,
            file_id: parsed.file_id,
            timestamp: parsed.timestamp,
            frequency: time.frequency.to_string(),
            start_date: time.start_string(),
            end_date: time.end_string(),
            realm: None,
            member: None,
            variables,
        })
    }
}

/// Filename with the extension removed (`ocean_month.nc` -> `ocean_month`).
pub fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            BuildError::InvalidConfig(format!("no usable filename in {}", path.display()))
        })
}

/// Data variables bearing a `long_name`, in file order.
fn catalog_variables(dataset: &dyn Dataset) -> Vec<VariableDescriptor> {
    dataset
        .variables()
        .iter()
        .filter(|v| !v.is_coordinate())
        .filter_map(describe)
        .collect()
}

fn describe(var: &VariableInfo) -> Option<VariableDescriptor> {
    let text = |name: &str| var.attr_text(name).unwrap_or_default().to_string();
    Some(VariableDescriptor {
        name: var.name.clone(),
        long_name: var.attr_text("long_name")?.to_string(),
        standard_name: text("standard_name"),
        units: text("units"),
        cell_methods: text("cell_methods"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{default_frequency_rules, default_patterns};
    use crate::timeinfo::CfTimeResolver;
    use netcdf_parser::CdlOpener;

    fn extractor() -> Extractor {
        Extractor::new(
            Arc::new(CdlOpener),
            PatternSet::from_specs(&default_patterns('X'), &default_frequency_rules(), 'X')
                .unwrap(),
            Arc::new(CfTimeResolver),
            "time",
        )
    }

    const MONTHLY: &str = r#"netcdf ocean_month {
dimensions:
	time = UNLIMITED ;
	xt_ocean = 2 ;
variables:
	double time(time) ;
		time:long_name = "time" ;
		time:units = "days since 1900-01-01" ;
		time:calendar = "noleap" ;
	double xt_ocean(xt_ocean) ;
		xt_ocean:long_name = "longitude" ;
	float temp(time, xt_ocean) ;
		temp:long_name = "Temperature" ;
		temp:standard_name = "sea_water_temperature" ;
		temp:units = "K" ;
	float mask(xt_ocean) ;
data:
 time = 15.5, 45 ;
}
"#;

    #[test]
    fn test_extract_monthly_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ocean_month.1900-01.cdl");
        std::fs::write(&path, MONTHLY).unwrap();

        let record = extractor().extract(&path).unwrap();
        assert_eq!(record.filename, "ocean_month.1900-01");
        assert_eq!(record.file_id, "ocean_month_XXXX_XX");
        assert_eq!(record.timestamp.as_deref(), Some("1900-01"));
        assert_eq!(record.frequency, "1mon");
        assert_eq!(record.start_date, "1900-01-01, 00:00:00");
        assert_eq!(record.end_date, "1900-03-01, 00:00:00");

        // coordinates and variables without long_name are skipped
        let names: Vec<&str> = record.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["temp"]);
        assert_eq!(record.variables[0].cell_methods, "");
    }

    #[test]
    fn test_extract_removing_literal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PI-GWL-B2035.pe-109904_dai.cdl");
        std::fs::write(&path, MONTHLY).unwrap();

        let record = extractor().extract_removing(&path, &["PI-GWL-B2035"]).unwrap();
        assert_eq!(record.file_id, "pe_XXXXXX_dai");
        assert_eq!(record.filename, "PI-GWL-B2035.pe-109904_dai");
    }

    #[test]
    fn test_no_long_name_is_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.cdl");
        std::fs::write(
            &path,
            "netcdf grid {\ndimensions:\n\tx = 1 ;\nvariables:\n\tfloat area(x) ;\n\
             \t\tarea:units = \"m2\" ;\n}\n",
        )
        .unwrap();

        let err = extractor().extract(&path).unwrap_err();
        assert!(matches!(err, BuildError::EmptyDataset(_)));
    }

    #[test]
    fn test_unreadable_file_propagates() {
        let err = extractor().extract(Path::new("/nonexistent/ocean.cdl")).unwrap_err();
        assert!(matches!(err, BuildError::Dataset(_)));
    }
}
