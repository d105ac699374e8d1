//! Time-axis resolution.
//!
//! Works out the period a file covers and its sampling frequency from the
//! time coordinate. The strategy is pluggable through [`TimeResolver`] so
//! other file families can bring their own conventions; [`CfTimeResolver`]
//! implements the CF conventions used by ACCESS model output.

use catalog_common::{CfDateTime, CfTimeUnits, Frequency, FrequencyUnit};
use netcdf_parser::Dataset;
use tracing::warn;

use crate::error::{BuildError, Result};

/// Rendering of an absent timestamp.
pub const NO_TIMESTAMP: &str = "none";

/// Period covered by a file and its frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfo {
    pub start: Option<CfDateTime>,
    pub end: Option<CfDateTime>,
    pub frequency: Frequency,
}

impl TimeInfo {
    pub fn fixed() -> Self {
        Self {
            start: None,
            end: None,
            frequency: Frequency::Fixed,
        }
    }

    pub fn start_string(&self) -> String {
        render(self.start)
    }

    pub fn end_string(&self) -> String {
        render(self.end)
    }
}

fn render(ts: Option<CfDateTime>) -> String {
    ts.map(|t| t.to_string())
        .unwrap_or_else(|| NO_TIMESTAMP.to_string())
}

/// Strategy for resolving the time information of an open dataset.
pub trait TimeResolver: Send + Sync {
    fn resolve(
        &self,
        dataset: &dyn Dataset,
        frequency_hint: Option<Frequency>,
        time_dim: &str,
    ) -> Result<TimeInfo>;
}

/// CF-conventions time resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct CfTimeResolver;

impl TimeResolver for CfTimeResolver {
    fn resolve(
        &self,
        dataset: &dyn Dataset,
        frequency_hint: Option<Frequency>,
        time_dim: &str,
    ) -> Result<TimeInfo> {
        let Some(time_var) = dataset.variable(time_dim) else {
            return Ok(TimeInfo::fixed());
        };

        let units = time_var.attr_text("units").ok_or_else(|| {
            BuildError::Catalog(catalog_common::CatalogError::InvalidTime(format!(
                "time variable '{}' has no units",
                time_dim
            )))
        })?;
        let units = CfTimeUnits::parse(units, time_var.attr_text("calendar"))?;

        let values = dataset.read_values(time_dim)?;
        if values.is_empty() {
            return Err(BuildError::EmptyTimeAxis(time_dim.to_string()));
        }

        let bounds = match time_var.attr_text("bounds") {
            Some(name) if dataset.variable(name).is_some() => {
                let b = dataset.read_values(name)?;
                (b.len() >= 2).then_some(b)
            }
            _ => None,
        };

        let (first, last, step) = match &bounds {
            Some(b) => (b[0], b[b.len() - 1], Some(b[1] - b[0])),
            None => {
                let step = (values.len() > 1).then(|| values[1] - values[0]);
                (values[0], values[values.len() - 1], step)
            }
        };

        let from_data = step.and_then(|s| frequency_from_days(units.to_days(s)));
        let frequency = match (from_data, frequency_hint) {
            (Some(data), Some(hint)) if data != hint => {
                warn!(
                    path = %dataset.path().display(),
                    filename_frequency = %hint,
                    data_frequency = %data,
                    "Frequency in filename disagrees with time axis, using time axis"
                );
                data
            }
            (Some(data), _) => data,
            (None, Some(hint)) => hint,
            (None, None) => Frequency::Fixed,
        };

        let mut start = units.decode(first)?;
        let mut end = units.decode(last)?;

        if bounds.is_none() {
            if let Frequency::Periodic { count, unit } = frequency {
                (start, end) = widen(start, end, count, unit, units)?;
            }
        }

        Ok(TimeInfo {
            start: Some(start),
            end: Some(end),
            frequency,
        })
    }
}

/// Map a time step in days onto a frequency.
pub fn frequency_from_days(days: f64) -> Option<Frequency> {
    if !days.is_finite() || days <= 0.0 {
        return None;
    }
    let whole = |x: f64| (x.round() as u32).max(1);
    let freq = if days >= 365.0 {
        Frequency::periodic(whole(days / 365.0), FrequencyUnit::Year)
    } else if days >= 28.0 {
        Frequency::periodic(whole(days / 30.0), FrequencyUnit::Month)
    } else if days >= 1.0 {
        Frequency::periodic(whole(days), FrequencyUnit::Day)
    } else if days * 24.0 >= 1.0 {
        Frequency::periodic(whole(days * 24.0), FrequencyUnit::Hour)
    } else {
        Frequency::periodic(whole(days * 1440.0), FrequencyUnit::Minute)
    };
    Some(freq)
}

/// Point timestamps mark the middle of sub-daily and daily periods, and
/// somewhere inside monthly and yearly ones. Widen them to period bounds.
fn widen(
    start: CfDateTime,
    end: CfDateTime,
    count: u32,
    unit: FrequencyUnit,
    units: CfTimeUnits,
) -> Result<(CfDateTime, CfDateTime)> {
    let calendar = units.calendar;
    let half_step = |seconds: i64| -> Result<(CfDateTime, CfDateTime)> {
        let half = seconds * i64::from(count) / 2;
        Ok((
            start.add_seconds(-half, calendar)?,
            end.add_seconds(half, calendar)?,
        ))
    };

    match unit {
        FrequencyUnit::Minute => half_step(60),
        FrequencyUnit::Hour => half_step(3600),
        FrequencyUnit::Day => half_step(86_400),
        FrequencyUnit::Month => Ok((
            start.start_of_month(),
            end.start_of_month().add_months(i64::from(count), calendar)?,
        )),
        FrequencyUnit::Year => Ok((
            start.start_of_year(),
            end.start_of_year().add_months(12 * i64::from(count), calendar)?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_parser::{CdlDataset, CdlDocument};

    fn dataset(time_attrs: &str, data: &str, extra_vars: &str) -> CdlDataset {
        let text = format!(
            "netcdf t {{\ndimensions:\n\ttime = UNLIMITED ;\n\tnv = 2 ;\n\
             variables:\n\tdouble time(time) ;\n{}{}\ndata:\n{}\n}}\n",
            time_attrs, extra_vars, data
        );
        CdlDataset::new("t.cdl", CdlDocument::parse(&text).unwrap())
    }

    const NOLEAP_DAYS: &str =
        "\t\ttime:units = \"days since 1900-01-01\" ;\n\t\ttime:calendar = \"noleap\" ;\n";

    #[test]
    fn test_no_time_variable_is_fixed() {
        let text = "netcdf t {\ndimensions:\n\tx = 1 ;\nvariables:\n\tfloat area(x) ;\n}\n";
        let ds = CdlDataset::new("t.cdl", CdlDocument::parse(text).unwrap());
        let info = CfTimeResolver.resolve(&ds, None, "time").unwrap();
        assert_eq!(info, TimeInfo::fixed());
        assert_eq!(info.start_string(), "none");
        assert_eq!(info.frequency.to_string(), "fx");
    }

    #[test]
    fn test_monthly_with_bounds() {
        let attrs = format!("{}\t\ttime:bounds = \"time_bnds\" ;\n", NOLEAP_DAYS);
        let ds = dataset(
            &attrs,
            " time = 15.5, 45 ;\n time_bnds = 0, 31, 31, 59 ;",
            "\tdouble time_bnds(time, nv) ;\n",
        );
        let info = CfTimeResolver.resolve(&ds, None, "time").unwrap();
        assert_eq!(info.start_string(), "1900-01-01, 00:00:00");
        assert_eq!(info.end_string(), "1900-03-01, 00:00:00");
        assert_eq!(info.frequency.to_string(), "1mon");
    }

    #[test]
    fn test_monthly_without_bounds_is_widened() {
        let ds = dataset(NOLEAP_DAYS, " time = 15.5, 45 ;", "");
        let info = CfTimeResolver.resolve(&ds, None, "time").unwrap();
        assert_eq!(info.start_string(), "1900-01-01, 00:00:00");
        assert_eq!(info.end_string(), "1900-03-01, 00:00:00");
    }

    #[test]
    fn test_daily_without_bounds_half_step() {
        let ds = dataset(NOLEAP_DAYS, " time = 0.5, 1.5, 2.5 ;", "");
        let info = CfTimeResolver.resolve(&ds, None, "time").unwrap();
        assert_eq!(info.frequency.to_string(), "1day");
        assert_eq!(info.start_string(), "1900-01-01, 00:00:00");
        assert_eq!(info.end_string(), "1900-01-04, 00:00:00");
    }

    #[test]
    fn test_single_value_uses_hint() {
        let ds = dataset(NOLEAP_DAYS, " time = 365.5 ;", "");
        let hint = Some(Frequency::periodic(1, FrequencyUnit::Year));
        let info = CfTimeResolver.resolve(&ds, hint, "time").unwrap();
        assert_eq!(info.frequency.to_string(), "1yr");
        assert_eq!(info.start_string(), "1901-01-01, 00:00:00");
        assert_eq!(info.end_string(), "1902-01-01, 00:00:00");

        let info = CfTimeResolver.resolve(&ds, None, "time").unwrap();
        assert_eq!(info.frequency, Frequency::Fixed);
        assert_eq!(info.start, info.end);
    }

    #[test]
    fn test_data_wins_over_hint() {
        let ds = dataset(NOLEAP_DAYS, " time = 0.5, 1.5 ;", "");
        let hint = Some(Frequency::periodic(1, FrequencyUnit::Month));
        let info = CfTimeResolver.resolve(&ds, hint, "time").unwrap();
        assert_eq!(info.frequency.to_string(), "1day");
    }

    #[test]
    fn test_empty_time_axis() {
        let text = format!(
            "netcdf t {{\ndimensions:\n\ttime = 0 ;\nvariables:\n\tdouble time(time) ;\n\
             {}data:\n time = ;\n}}\n",
            NOLEAP_DAYS
        );
        let ds = CdlDataset::new("t.cdl", CdlDocument::parse(&text).unwrap());
        let err = CfTimeResolver.resolve(&ds, None, "time").unwrap_err();
        assert!(matches!(err, BuildError::EmptyTimeAxis(_)));
    }

    #[test]
    fn test_fill_value_bounds_are_rejected() {
        let attrs = format!("{}\t\ttime:bounds = \"time_bnds\" ;\n", NOLEAP_DAYS);
        let ds = dataset(
            &attrs,
            " time = 15.5, 45 ;\n time_bnds = 0, 31, 31, 9.96921e+36 ;",
            "\tdouble time_bnds(time, nv) ;\n",
        );
        let err = CfTimeResolver.resolve(&ds, None, "time").unwrap_err();
        assert!(
            matches!(err, BuildError::Catalog(catalog_common::CatalogError::InvalidTime(_))),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_widening_past_supported_years_fails() {
        // years 262000 and 262100, widening the end goes past the last supported year
        let ds = dataset(NOLEAP_DAYS, " time = 94936500, 94973000 ;", "");
        let err = CfTimeResolver.resolve(&ds, None, "time").unwrap_err();
        assert!(err.to_string().contains("months out of range"), "{}", err);
    }

    #[test]
    fn test_frequency_from_days() {
        assert_eq!(frequency_from_days(365.0).unwrap().to_string(), "1yr");
        assert_eq!(frequency_from_days(730.0).unwrap().to_string(), "2yr");
        assert_eq!(frequency_from_days(31.0).unwrap().to_string(), "1mon");
        assert_eq!(frequency_from_days(90.0).unwrap().to_string(), "3mon");
        assert_eq!(frequency_from_days(1.0).unwrap().to_string(), "1day");
        assert_eq!(frequency_from_days(0.125).unwrap().to_string(), "3hr");
        assert_eq!(frequency_from_days(0.0), None);
    }
}
