//! CF time handling for climate model output.
//!
//! Model files encode time as numbers relative to a reference date
//! (`days since 1900-01-01`) in one of several model calendars. This module
//! decodes those values into calendar date-times and provides the calendar
//! arithmetic needed to reason about the period a file covers.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Rendering used for catalog start/end columns.
pub const TIME_FORMAT_DESCRIPTION: &str = "%Y-%m-%d, %H:%M:%S";

const SECONDS_PER_DAY: i64 = 86_400;
/// Largest year magnitude accepted by every calendar.
pub const MAX_YEAR: i32 = 262_143;
const CUMULATIVE_DAYS: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
const CUMULATIVE_DAYS_LEAP: [u32; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

/// Model calendars understood by the decoder.
///
/// `Standard` is treated as proleptic Gregorian; model output before the
/// 1582 Julian/Gregorian switch is not expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Calendar {
    Standard,
    ProlepticGregorian,
    NoLeap,
    AllLeap,
    Day360,
}

impl FromStr for Calendar {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            other => Err(CatalogError::UnsupportedCalendar(other.to_string())),
        }
    }
}

impl Calendar {
    fn is_leap(&self, year: i32) -> bool {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
            }
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
        }
    }

    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        match (self, month) {
            (Calendar::Day360, _) => 30,
            (_, 2) if self.is_leap(year) => 29,
            (_, 2) => 28,
            (_, 4 | 6 | 9 | 11) => 30,
            _ => 31,
        }
    }

    /// Day number counted from the calendar's own origin.
    fn day_number(&self, year: i32, month: u32, day: u32) -> CatalogResult<i64> {
        if !(1..=12).contains(&month) || day == 0 || day > self.days_in_month(year, month) {
            return Err(CatalogError::InvalidTime(format!(
                "{:04}-{:02}-{:02} does not exist in calendar {:?}",
                year, month, day, self
            )));
        }
        let idx = (month - 1) as usize;
        let offset = i64::from(day - 1);
        let years = i64::from(year);
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                    CatalogError::InvalidTime(format!("{}-{}-{}", year, month, day))
                })?;
                Ok(i64::from(date.num_days_from_ce()))
            }
            Calendar::NoLeap => Ok(years * 365 + i64::from(CUMULATIVE_DAYS[idx]) + offset),
            Calendar::AllLeap => Ok(years * 366 + i64::from(CUMULATIVE_DAYS_LEAP[idx]) + offset),
            Calendar::Day360 => Ok(years * 360 + (i64::from(month) - 1) * 30 + offset),
        }
    }

    fn date_from_day_number(&self, days: i64) -> CatalogResult<(i32, u32, u32)> {
        let year_of = |year: i64| {
            i32::try_from(year)
                .ok()
                .filter(|y| y.abs() <= MAX_YEAR)
                .ok_or_else(|| out_of_range(format!("year {}", year)))
        };
        let fixed_year = |year_len: i64, cumulative: &[u32; 12]| -> CatalogResult<(i32, u32, u32)> {
            let year = year_of(days.div_euclid(year_len))?;
            let doy = days.rem_euclid(year_len) as u32;
            let month = cumulative.iter().rposition(|&c| c <= doy).unwrap_or(0);
            Ok((year, month as u32 + 1, doy - cumulative[month] + 1))
        };
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                let date = i32::try_from(days)
                    .ok()
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .ok_or_else(|| out_of_range(format!("day number {}", days)))?;
                Ok((date.year(), date.month(), date.day()))
            }
            Calendar::NoLeap => fixed_year(365, &CUMULATIVE_DAYS),
            Calendar::AllLeap => fixed_year(366, &CUMULATIVE_DAYS_LEAP),
            Calendar::Day360 => {
                let year = year_of(days.div_euclid(360))?;
                let doy = days.rem_euclid(360) as u32;
                Ok((year, doy / 30 + 1, doy % 30 + 1))
            }
        }
    }
}

/// A date-time in some model calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CfDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CfDateTime {
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub fn date(year: i32, month: u32, day: u32) -> Self {
        Self::new(year, month, day, 0, 0, 0)
    }

    /// Seconds since the calendar origin.
    pub fn to_seconds(&self, calendar: Calendar) -> CatalogResult<i64> {
        let days = calendar.day_number(self.year, self.month, self.day)?;
        let time_of_day = self.hour as i64 * 3600 + self.minute as i64 * 60 + self.second as i64;
        days.checked_mul(SECONDS_PER_DAY)
            .and_then(|s| s.checked_add(time_of_day))
            .ok_or_else(|| out_of_range(self))
    }

    pub fn from_seconds(seconds: i64, calendar: Calendar) -> CatalogResult<Self> {
        let days = seconds.div_euclid(SECONDS_PER_DAY);
        let secs = seconds.rem_euclid(SECONDS_PER_DAY) as u32;
        let (year, month, day) = calendar.date_from_day_number(days)?;
        Ok(Self::new(year, month, day, secs / 3600, secs % 3600 / 60, secs % 60))
    }

    pub fn add_seconds(&self, seconds: i64, calendar: Calendar) -> CatalogResult<Self> {
        let total = self
            .to_seconds(calendar)?
            .checked_add(seconds)
            .ok_or_else(|| out_of_range(format!("{} + {}s", self, seconds)))?;
        Self::from_seconds(total, calendar)
    }

    /// Shift by whole months, clamping the day to the target month length.
    pub fn add_months(&self, months: i64, calendar: Calendar) -> CatalogResult<Self> {
        let shifted = || out_of_range(format!("{} + {} months", self, months));
        let total = (i64::from(self.year) * 12 + (i64::from(self.month) - 1))
            .checked_add(months)
            .ok_or_else(shifted)?;
        let year = i32::try_from(total.div_euclid(12))
            .ok()
            .filter(|y| y.abs() <= MAX_YEAR)
            .ok_or_else(shifted)?;
        let month = total.rem_euclid(12) as u32 + 1;
        let day = self.day.min(calendar.days_in_month(year, month));
        Ok(Self { year, month, day, ..*self })
    }

    pub fn start_of_month(&self) -> Self {
        Self::date(self.year, self.month, 1)
    }

    pub fn start_of_year(&self) -> Self {
        Self::date(self.year, 1, 1)
    }

    pub fn is_start_of_month(&self) -> bool {
        *self == self.start_of_month()
    }

    pub fn is_start_of_year(&self) -> bool {
        *self == self.start_of_year()
    }
}

impl fmt::Display for CfDateTime {
    /// Renders as `%Y-%m-%d, %H:%M:%S`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}, {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Unit of a CF time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Length of one unit in seconds.
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86_400.0,
        }
    }
}

/// Parsed `units`/`calendar` attribute pair of a CF time variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfTimeUnits {
    pub unit: TimeUnit,
    pub reference: CfDateTime,
    pub calendar: Calendar,
}

fn units_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*([a-z]+)\s+since\s+(.+?)\s*$").expect("static regex")
    })
}

fn out_of_range(what: impl fmt::Display) -> CatalogError {
    CatalogError::InvalidTime(format!("{} out of range", what))
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^(-?\d{1,4})-(\d{1,2})-(\d{1,2})
            (?:[\ T](\d{1,2}):(\d{1,2})(?::(\d{1,2})(?:\.\d+)?)?)?
            \s*(?:Z|UTC|[+-]00:?00)?$",
        )
        .expect("static regex")
    })
}

impl CfTimeUnits {
    /// Parse `units` such as `days since 1900-01-01 00:00:00`. A missing
    /// calendar defaults to `standard`.
    pub fn parse(units: &str, calendar: Option<&str>) -> CatalogResult<Self> {
        let caps = units_regex()
            .captures(units)
            .ok_or_else(|| CatalogError::InvalidTime(format!("not a CF time unit: '{}'", units)))?;

        let unit = match caps[1].to_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => TimeUnit::Seconds,
            "minutes" | "minute" | "mins" | "min" => TimeUnit::Minutes,
            "hours" | "hour" | "hrs" | "hr" | "h" => TimeUnit::Hours,
            "days" | "day" | "d" => TimeUnit::Days,
            other => {
                return Err(CatalogError::InvalidTime(format!(
                    "unsupported time unit '{}'",
                    other
                )))
            }
        };

        let calendar = match calendar {
            Some(name) => name.parse()?,
            None => Calendar::Standard,
        };

        let reference = parse_reference(&caps[2])?;
        // Reject references that do not exist in the calendar.
        reference.to_seconds(calendar)?;

        Ok(Self {
            unit,
            reference,
            calendar,
        })
    }

    /// Length of `value` units in days.
    pub fn to_days(&self, value: f64) -> f64 {
        value * self.unit.seconds() / SECONDS_PER_DAY as f64
    }

    /// Decode one numeric time value.
    pub fn decode(&self, value: f64) -> CatalogResult<CfDateTime> {
        if !value.is_finite() {
            return Err(CatalogError::InvalidTime(format!(
                "non-finite time value {}",
                value
            )));
        }
        let offset = (value * self.unit.seconds()).round();
        // Fill values such as 9.96921e36 land here.
        if offset.abs() >= i64::MAX as f64 {
            return Err(CatalogError::InvalidTime(format!(
                "time value {} out of range",
                value
            )));
        }
        self.reference.add_seconds(offset as i64, self.calendar)
    }
}

fn parse_reference(raw: &str) -> CatalogResult<CfDateTime> {
    let caps = reference_regex()
        .captures(raw.trim())
        .ok_or_else(|| CatalogError::InvalidTime(format!("bad reference date '{}'", raw)))?;
    let field = |i: usize| -> u32 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let year: i32 = caps[1]
        .parse()
        .map_err(|_| CatalogError::InvalidTime(format!("bad year in '{}'", raw)))?;
    Ok(CfDateTime::new(year, field(2), field(3), field(4), field(5), field(6)))
}

/// Unit of a sampling frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrequencyUnit {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl FrequencyUnit {
    fn suffix(&self) -> &'static str {
        match self {
            FrequencyUnit::Minute => "min",
            FrequencyUnit::Hour => "hr",
            FrequencyUnit::Day => "day",
            FrequencyUnit::Month => "mon",
            FrequencyUnit::Year => "yr",
        }
    }
}

/// Sampling frequency of a dataset (`fx` for time-invariant data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    Fixed,
    Periodic { count: u32, unit: FrequencyUnit },
}

impl Frequency {
    pub fn periodic(count: u32, unit: FrequencyUnit) -> Self {
        Frequency::Periodic { count, unit }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Frequency::Fixed)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Fixed => f.write_str("fx"),
            Frequency::Periodic { count, unit } => write!(f, "{}{}", count, unit.suffix()),
        }
    }
}

impl FromStr for Frequency {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re =
            RE.get_or_init(|| Regex::new(r"^(\d+)(min|hr|day|mon|yr)$").expect("static regex"));

        let s = s.trim();
        if s == "fx" {
            return Ok(Frequency::Fixed);
        }
        let caps = re
            .captures(s)
            .ok_or_else(|| CatalogError::InvalidFrequency(s.to_string()))?;
        let count: u32 = caps[1]
            .parse()
            .map_err(|_| CatalogError::InvalidFrequency(s.to_string()))?;
        let unit = match &caps[2] {
            "min" => FrequencyUnit::Minute,
            "hr" => FrequencyUnit::Hour,
            "day" => FrequencyUnit::Day,
            "mon" => FrequencyUnit::Month,
            _ => FrequencyUnit::Year,
        };
        Ok(Frequency::Periodic { count, unit })
    }
}

impl TryFrom<String> for Frequency {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_days_since_noleap() {
        let units = CfTimeUnits::parse("days since 1900-01-01 00:00:00", Some("noleap")).unwrap();
        // 365 days in a noleap calendar is exactly one year
        assert_eq!(units.decode(365.0).unwrap(), CfDateTime::date(1901, 1, 1));
        // day 59 is March 1st regardless of leap years
        assert_eq!(units.decode(59.0).unwrap(), CfDateTime::date(1900, 3, 1));
    }

    #[test]
    fn test_decode_gregorian_leap_year() {
        let units =
            CfTimeUnits::parse("days since 2000-01-01", Some("proleptic_gregorian")).unwrap();
        assert_eq!(units.decode(59.0).unwrap(), CfDateTime::date(2000, 2, 29));
        assert_eq!(units.decode(0.5).unwrap(), CfDateTime::new(2000, 1, 1, 12, 0, 0));
    }

    #[test]
    fn test_decode_360_day() {
        let units = CfTimeUnits::parse("days since 0001-01-01", Some("360_day")).unwrap();
        assert_eq!(units.decode(30.0).unwrap(), CfDateTime::date(1, 2, 1));
        assert_eq!(units.decode(359.0).unwrap(), CfDateTime::date(1, 12, 30));
    }

    #[test]
    fn test_hours_since_with_t_separator() {
        let units = CfTimeUnits::parse("hours since 1970-01-01T00:00:00Z", None).unwrap();
        assert_eq!(units.decode(36.0).unwrap(), CfDateTime::new(1970, 1, 2, 12, 0, 0));
    }

    #[test]
    fn test_invalid_units() {
        assert!(CfTimeUnits::parse("kelvin", None).is_err());
        assert!(CfTimeUnits::parse("fortnights since 1900-01-01", None).is_err());
        assert!(CfTimeUnits::parse("days since 1900-01-01", Some("julian")).is_err());
        assert!(CfTimeUnits::parse("days since 1900-02-30", Some("noleap")).is_err());
    }

    #[test]
    fn test_add_months_clamps_day() {
        let dt = CfDateTime::date(1901, 1, 31);
        assert_eq!(dt.add_months(1, Calendar::NoLeap).unwrap(), CfDateTime::date(1901, 2, 28));
        assert_eq!(dt.add_months(-2, Calendar::NoLeap).unwrap(), CfDateTime::date(1900, 11, 30));
        assert!(dt.add_months(i64::MAX, Calendar::NoLeap).is_err());
        assert!(dt.add_months(12 * 300_000, Calendar::NoLeap).is_err());
    }

    #[test]
    fn test_decode_out_of_range_values() {
        for calendar in ["noleap", "360_day", "all_leap", "standard"] {
            let units = CfTimeUnits::parse("days since 1900-01-01", Some(calendar)).unwrap();
            // NetCDF default fill value for float variables
            for value in [9.96921e36, -9.96921e36, 1e14] {
                assert!(
                    matches!(units.decode(value), Err(CatalogError::InvalidTime(_))),
                    "{} in {}",
                    value,
                    calendar
                );
            }
            assert!(units.decode(f64::NAN).is_err());
        }

        let units = CfTimeUnits::parse("seconds since 1900-01-01", Some("noleap")).unwrap();
        assert!(units.decode(i64::MAX as f64).is_err());
        // just inside the supported range
        assert!(units.decode(200_000.0 * 365.0 * 86_400.0).is_ok());
    }

    #[test]
    fn test_display_format() {
        assert_eq!(
            CfDateTime::new(1, 2, 3, 4, 5, 6).to_string(),
            "0001-02-03, 04:05:06"
        );
    }

    #[test]
    fn test_frequency_roundtrip() {
        for raw in ["fx", "1mon", "3hr", "1day", "10yr", "30min"] {
            let freq: Frequency = raw.parse().unwrap();
            assert_eq!(freq.to_string(), raw);
        }
        assert!("monthly".parse::<Frequency>().is_err());
    }
}
