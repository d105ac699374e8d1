//! Generators for synthetic CDL datasets.
//!
//! The generated text is what `ncdump` prints for a small NetCDF file, so it
//! can be read with `CdlOpener` without libnetcdf being installed. Fixture
//! trees write it under `.nc` names to exercise discovery globs.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Days in each month of the `noleap` calendar.
pub const NOLEAP_MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A time coordinate with optional cell bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    pub units: String,
    pub calendar: String,
    pub values: Vec<f64>,
    pub bounds: Option<Vec<(f64, f64)>>,
}

impl TimeAxis {
    /// `values` in `days since <reference>`, without bounds.
    pub fn days_since(reference: &str, calendar: &str, values: Vec<f64>) -> Self {
        Self {
            units: format!("days since {}", reference),
            calendar: calendar.to_string(),
            values,
            bounds: None,
        }
    }

    /// Mid-month samples with month bounds in the `noleap` calendar,
    /// starting at January of `year`. Times count from `year`-01-01.
    pub fn monthly(year: i32, months: usize) -> Self {
        let mut bounds = Vec::with_capacity(months);
        let mut lower = 0.0;
        for idx in 0..months {
            let upper = lower + f64::from(NOLEAP_MONTH_DAYS[idx % 12]);
            bounds.push((lower, upper));
            lower = upper;
        }
        Self::from_bounds(&format!("{:04}-01-01", year), bounds)
    }

    /// Daily samples with day bounds in the `noleap` calendar.
    pub fn daily(year: i32, days: usize) -> Self {
        let bounds = (0..days).map(|d| (d as f64, d as f64 + 1.0)).collect();
        Self::from_bounds(&format!("{:04}-01-01", year), bounds)
    }

    fn from_bounds(reference: &str, bounds: Vec<(f64, f64)>) -> Self {
        let values = bounds.iter().map(|(lo, hi)| (lo + hi) / 2.0).collect();
        Self {
            bounds: Some(bounds),
            ..Self::days_since(reference, "noleap", values)
        }
    }
}

/// A data variable of a generated dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataVariable {
    pub name: String,
    pub long_name: Option<String>,
    pub standard_name: Option<String>,
    pub units: Option<String>,
    pub cell_methods: Option<String>,
}

impl DataVariable {
    pub fn new(name: &str, long_name: &str) -> Self {
        Self {
            name: name.to_string(),
            long_name: Some(long_name.to_string()),
            ..Self::default()
        }
    }

    /// A variable the catalog should ignore.
    pub fn unnamed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn standard_name(mut self, standard_name: &str) -> Self {
        self.standard_name = Some(standard_name.to_string());
        self
    }

    pub fn cell_methods(mut self, cell_methods: &str) -> Self {
        self.cell_methods = Some(cell_methods.to_string());
        self
    }
}

/// A small CDL dataset: an optional time axis, one spatial dimension and
/// a list of data variables.
#[derive(Debug, Clone, PartialEq)]
pub struct CdlFile {
    pub name: String,
    pub time: Option<TimeAxis>,
    pub variables: Vec<DataVariable>,
    pub title: Option<String>,
}

impl CdlFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            time: None,
            variables: Vec::new(),
            title: None,
        }
    }

    pub fn time(mut self, axis: TimeAxis) -> Self {
        self.time = Some(axis);
        self
    }

    pub fn variable(mut self, variable: DataVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Render as CDL text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "netcdf {} {{", self.name);
        out.push_str("dimensions:\n");
        if let Some(time) = &self.time {
            let _ = writeln!(out, "\ttime = UNLIMITED ; // ({} currently)", time.values.len());
            if time.bounds.is_some() {
                out.push_str("\tnv = 2 ;\n");
            }
        }
        out.push_str("\txt = 2 ;\n");

        out.push_str("variables:\n");
        out.push_str("\tdouble xt(xt) ;\n\t\txt:long_name = \"longitude\" ;\n");
        if let Some(time) = &self.time {
            out.push_str("\tdouble time(time) ;\n\t\ttime:long_name = \"time\" ;\n");
            let _ = writeln!(out, "\t\ttime:units = \"{}\" ;", time.units);
            let _ = writeln!(out, "\t\ttime:calendar = \"{}\" ;", time.calendar);
            if time.bounds.is_some() {
                out.push_str("\t\ttime:bounds = \"time_bnds\" ;\n");
                out.push_str("\tdouble time_bnds(time, nv) ;\n");
            }
        }
        let dims = if self.time.is_some() { "time, xt" } else { "xt" };
        for var in &self.variables {
            let _ = writeln!(out, "\tfloat {}({}) ;", var.name, dims);
            let attrs = [
                ("long_name", &var.long_name),
                ("standard_name", &var.standard_name),
                ("units", &var.units),
                ("cell_methods", &var.cell_methods),
            ];
            for (attr, value) in attrs {
                if let Some(value) = value {
                    let _ = writeln!(out, "\t\t{}:{} = \"{}\" ;", var.name, attr, value);
                }
            }
        }
        if let Some(title) = &self.title {
            out.push_str("\n// global attributes:\n");
            let _ = writeln!(out, "\t\t:title = \"{}\" ;", title);
        }

        out.push_str("data:\n\n xt = 0.5, 1.5 ;\n");
        if let Some(time) = &self.time {
            let _ = writeln!(out, "\n time = {} ;", join(time.values.iter().copied()));
            if let Some(bounds) = &time.bounds {
                let flat = bounds.iter().flat_map(|(lo, hi)| [*lo, *hi]);
                let _ = writeln!(out, "\n time_bnds = {} ;", join(flat));
            }
        }
        out.push_str("}\n");
        out
    }

    /// Render into `dir/filename`, creating parent directories.
    pub fn write(&self, dir: &Path, filename: &str) -> PathBuf {
        let path = dir.join(filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        fs::write(&path, self.render()).expect("Failed to write fixture dataset");
        path
    }
}

fn join(values: impl Iterator<Item = f64>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

/// Monthly ocean output with temperature and salinity.
pub fn ocean_month(year: i32, months: usize) -> CdlFile {
    CdlFile::new("ocean_month")
        .time(TimeAxis::monthly(year, months))
        .variable(
            DataVariable::new("temp", "Conservative temperature")
                .standard_name("sea_water_conservative_temperature")
                .units("K")
                .cell_methods("time: mean"),
        )
        .variable(DataVariable::new("salt", "Practical Salinity").units("psu"))
}

/// Daily sea-ice output.
pub fn ice_daily(year: i32, days: usize) -> CdlFile {
    CdlFile::new("iceh")
        .time(TimeAxis::daily(year, days))
        .variable(DataVariable::new("aice", "ice area  (aggregate)").units("1"))
}

/// A grid file with no time axis.
pub fn ocean_grid() -> CdlFile {
    CdlFile::new("ocean_grid")
        .variable(DataVariable::new("area_t", "tracer cell area").units("m^2"))
}

/// A file none of whose variables carries a long_name.
pub fn unnamed_only() -> CdlFile {
    CdlFile::new("unnamed").variable(DataVariable::unnamed("mask"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_bounds_are_contiguous() {
        let axis = TimeAxis::monthly(1900, 14);
        let bounds = axis.bounds.unwrap();
        assert_eq!(bounds[0], (0.0, 31.0));
        assert_eq!(bounds[1], (31.0, 59.0));
        assert_eq!(bounds[12], (365.0, 396.0));
        assert_eq!(axis.values[0], 15.5);
    }

    #[test]
    fn test_render_contains_sections() {
        let text = ocean_month(1900, 2).title("test").render();
        assert!(text.starts_with("netcdf ocean_month {"));
        assert!(text.contains("time:bounds = \"time_bnds\""));
        assert!(text.contains("temp:cell_methods = \"time: mean\""));
        assert!(text.contains(" time_bnds = 0, 31, 31, 59 ;"));
        assert!(text.contains(":title = \"test\""));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_no_time_axis() {
        let text = ocean_grid().render();
        assert!(!text.contains("UNLIMITED"));
        assert!(text.contains("float area_t(xt) ;"));
    }
}
