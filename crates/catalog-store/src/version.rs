//! Version stamps (`vYYYY-MM-DD`) and discovery of stamped directories.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

fn stamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v?(\d{4})-(\d{2})-(\d{2})$").expect("static regex"))
}

/// A catalog version. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionStamp(NaiveDate);

impl VersionStamp {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Stamp for the current UTC date.
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// True when `name` is a canonical stamp (with the `v` prefix).
    pub fn is_canonical(name: &str) -> bool {
        name.starts_with('v') && name.parse::<VersionStamp>().is_ok()
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for VersionStamp {
    type Err = StoreError;

    /// Accepts `vYYYY-MM-DD` and bare `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StoreError::InvalidVersion(s.to_string());
        let caps = stamp_regex().captures(s.trim()).ok_or_else(invalid)?;
        let field = |idx: usize| caps[idx].parse::<u32>().map_err(|_| invalid());
        let year = i32::try_from(field(1)?).map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for VersionStamp {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<VersionStamp> for String {
    fn from(value: VersionStamp) -> Self {
        value.to_string()
    }
}

/// Stamped version directories directly under `base`. Entries whose names
/// are not canonical stamps are ignored; a missing base is empty.
pub fn scan_versions(base: &Path) -> Result<BTreeSet<VersionStamp>> {
    let mut found = BTreeSet::new();
    if !base.is_dir() {
        return Ok(found);
    }
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if VersionStamp::is_canonical(name) {
            found.insert(name.parse()?);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let stamp: VersionStamp = "v2024-03-01".parse().unwrap();
        assert_eq!(stamp.to_string(), "v2024-03-01");
        let bare: VersionStamp = "2024-03-01".parse().unwrap();
        assert_eq!(bare, stamp);
    }

    #[test]
    fn test_rejects_bad_stamps() {
        for bad in ["v2024-13-01", "v2024-02-30", "2024/03/01", "v24-03-01", "latest", ""] {
            assert!(bad.parse::<VersionStamp>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_chronological_order() {
        let a: VersionStamp = "v2001-01-01".parse().unwrap();
        let b: VersionStamp = "v2024-01-01".parse().unwrap();
        let c: VersionStamp = "v2099-01-01".parse().unwrap();
        assert!(a < b && b < c);
        assert_eq!(std::cmp::max(a, c), c);
    }

    #[test]
    fn test_serde_as_string() {
        let stamp: VersionStamp = "v2024-03-01".parse().unwrap();
        assert_eq!(serde_json::to_string(&stamp).unwrap(), "\"v2024-03-01\"");
        assert!(serde_json::from_str::<VersionStamp>("\"v2024-3-1\"").is_err());
    }

    #[test]
    fn test_scan_versions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["v2001-01-01", "v2099-01-01", "2024-01-01", "scratch", ".staging-x"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("v2050-01-01"), "not a dir").unwrap();

        let found: Vec<String> = scan_versions(dir.path())
            .unwrap()
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(found, ["v2001-01-01", "v2099-01-01"]);

        assert!(scan_versions(&dir.path().join("missing")).unwrap().is_empty());
    }
}
