//! Asset families.
//!
//! A family knows where its files live, how they are laid out on disk and
//! which columns it can derive from the path (realm, ensemble member).
//! Families only override the hooks they need; discovery and extraction
//! fall back to the generic implementations.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};

use catalog_common::AggregationRule;

use crate::config::BuilderConfig;
use crate::discover::{discover, DiscoveryOptions};
use crate::error::{BuildError, Result};
use crate::extract::{file_stem, Extractor};
use crate::record::AssetRecord;

/// Family-specific switches from a source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyOptions {
    /// Treat each path as one ensemble member joined along a new dimension
    pub ensemble: bool,
}

/// Capability interface implemented by every family.
pub trait AssetFamily: Send + Sync {
    fn name(&self) -> &'static str;

    /// Complete configuration with this family's defaults.
    fn default_config(&self, paths: Vec<PathBuf>) -> BuilderConfig {
        BuilderConfig::new(paths)
    }

    fn discover(&self, config: &BuilderConfig) -> Result<Vec<PathBuf>> {
        let options = DiscoveryOptions::new(
            config.paths.clone(),
            config.depth,
            &config.include_patterns,
            &config.exclude_patterns,
        )?;
        discover(&options)
    }

    fn parse_one(&self, extractor: &Extractor, path: &Path) -> anyhow::Result<AssetRecord> {
        let record = extractor
            .extract(path)
            .with_context(|| format!("Failed to extract metadata from {}", path.display()))?;
        self.post_process(path, record)
    }

    fn post_process(&self, _path: &Path, record: AssetRecord) -> anyhow::Result<AssetRecord> {
        Ok(record)
    }
}

/// Look up a family by name.
pub fn family_by_name(name: &str, options: &FamilyOptions) -> Result<Arc<dyn AssetFamily>> {
    let family: Arc<dyn AssetFamily> = match name {
        "GenericBuilder" | "generic" => Arc::new(GenericFamily),
        "AccessOm2Builder" | "access-om2" => Arc::new(AccessOm2),
        "AccessOm3Builder" | "access-om3" => Arc::new(AccessOm3),
        "AccessEsm15Builder" | "access-esm1.5" => Arc::new(AccessEsm::esm15(options.ensemble)),
        "AccessCm2Builder" | "access-cm2" => Arc::new(AccessEsm::cm2(options.ensemble)),
        other => {
            return Err(BuildError::InvalidConfig(format!(
                "unknown builder '{}'",
                other
            )))
        }
    };
    Ok(family)
}

/// Any NetCDF files, no realm or member.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericFamily;

impl AssetFamily for GenericFamily {
    fn name(&self) -> &'static str {
        "GenericBuilder"
    }
}

fn om2_layout() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*/output\d+/(?P<realm>[^/]+)/.+$").expect("static regex"))
}

fn esm_layout() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^.*/(?P<exp>[^/]+)/history/(?P<realm>[^/]+)/.+$").expect("static regex")
    })
}

/// ACCESS-OM2 (COSIMA) output: `<config>/<exp>/outputNNN/<realm>/<file>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessOm2;

impl AssetFamily for AccessOm2 {
    fn name(&self) -> &'static str {
        "AccessOm2Builder"
    }

    fn default_config(&self, paths: Vec<PathBuf>) -> BuilderConfig {
        BuilderConfig {
            depth: 3,
            exclude_patterns: vec!["*restart*".to_string(), "*o2i.nc".to_string()],
            include_patterns: vec!["*.nc".to_string()],
            ..BuilderConfig::new(paths)
        }
    }

    fn post_process(&self, path: &Path, mut record: AssetRecord) -> anyhow::Result<AssetRecord> {
        let text = path.to_string_lossy();
        let caps = om2_layout().captures(&text).ok_or(BuildError::PathLayout {
            family: self.name(),
            path: path.to_path_buf(),
        })?;
        let realm = match &caps["realm"] {
            "ice" => "seaIce",
            other => other,
        };
        record.realm = Some(realm.to_string());
        Ok(record)
    }
}

/// ACCESS-ESM1.5 and ACCESS-CM2 output: `<exp>/history/<realm>/<file>`.
///
/// The experiment directory doubles as the ensemble member and is removed
/// from the file_id so members share grouping keys.
#[derive(Debug, Clone, Copy)]
pub struct AccessEsm {
    name: &'static str,
    ensemble: bool,
}

impl AccessEsm {
    pub fn esm15(ensemble: bool) -> Self {
        Self {
            name: "AccessEsm15Builder",
            ensemble,
        }
    }

    pub fn cm2(ensemble: bool) -> Self {
        Self {
            name: "AccessCm2Builder",
            ensemble,
        }
    }

    fn layout(&self, path: &Path) -> anyhow::Result<(String, &'static str)> {
        let text = path.to_string_lossy();
        let caps = esm_layout().captures(&text).ok_or(BuildError::PathLayout {
            family: self.name,
            path: path.to_path_buf(),
        })?;
        let realm = match &caps["realm"] {
            "atm" => "atmos",
            "ocn" => "ocean",
            "ice" => "seaIce",
            other => {
                return Err(anyhow!(
                    "unknown realm directory '{}' in {}",
                    other,
                    path.display()
                ))
            }
        };
        Ok((caps["exp"].to_string(), realm))
    }
}

impl AssetFamily for AccessEsm {
    fn name(&self) -> &'static str {
        self.name
    }

    fn default_config(&self, paths: Vec<PathBuf>) -> BuilderConfig {
        let mut config = BuilderConfig {
            depth: 3,
            exclude_patterns: vec!["*restart*".to_string()],
            include_patterns: vec!["*.nc*".to_string()],
            ..BuilderConfig::new(paths)
        };
        if self.ensemble {
            config.aggregations.push(AggregationRule::join_new("member"));
        }
        config
    }

    fn parse_one(&self, extractor: &Extractor, path: &Path) -> anyhow::Result<AssetRecord> {
        let (exp_id, realm) = self.layout(path)?;
        let mut record = extractor
            .extract_removing(path, &[exp_id.as_str()])
            .with_context(|| format!("Failed to extract metadata from {}", path.display()))?;
        record.realm = Some(realm.to_string());
        record.member = Some(exp_id);
        self.post_process(path, record)
    }
}

/// Realm tokens for ACCESS-OM3 filenames, highest priority first.
pub const OM3_REALM_TOKENS: &[(&str, &str)] =
    &[("cice", "seaIce"), ("mom6", "ocean"), ("ww3", "wave")];

/// ACCESS-OM3 output. The realm comes from the model component named in the
/// filename (`access-om3.mom6.h.z_1900_01.nc`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessOm3;

/// Realm for an ACCESS-OM3 filename. Filenames are split into tokens on
/// non-alphanumeric characters; when several component tokens appear the
/// earliest entry of [`OM3_REALM_TOKENS`] wins.
pub fn om3_realm(filename: &str) -> Option<&'static str> {
    let lower = filename.to_lowercase();
    let tokens: Vec<&str> = lower.split(|c: char| !c.is_ascii_alphanumeric()).collect();
    OM3_REALM_TOKENS
        .iter()
        .find(|(token, _)| tokens.contains(token))
        .map(|(_, realm)| *realm)
}

impl AssetFamily for AccessOm3 {
    fn name(&self) -> &'static str {
        "AccessOm3Builder"
    }

    fn default_config(&self, paths: Vec<PathBuf>) -> BuilderConfig {
        BuilderConfig {
            depth: 2,
            exclude_patterns: vec!["*restart*".to_string(), "*rpointer*".to_string()],
            include_patterns: vec!["*.nc".to_string()],
            ..BuilderConfig::new(paths)
        }
    }

    fn post_process(&self, path: &Path, mut record: AssetRecord) -> anyhow::Result<AssetRecord> {
        let stem = file_stem(path)?;
        let realm = om3_realm(&stem)
            .ok_or_else(|| anyhow!("no model component token in filename '{}'", stem))?;
        record.realm = Some(realm.to_string());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let opts = FamilyOptions::default();
        for name in [
            "AccessOm2Builder",
            "AccessOm3Builder",
            "AccessEsm15Builder",
            "AccessCm2Builder",
            "generic",
        ] {
            assert!(family_by_name(name, &opts).is_ok(), "{}", name);
        }
        assert!(family_by_name("Cmip6Builder", &opts).is_err());
    }

    #[test]
    fn test_om3_realm_priority() {
        assert_eq!(om3_realm("access-om3.cice.h.1900-01"), Some("seaIce"));
        assert_eq!(om3_realm("access-om3.mom6.h.native_1900_01"), Some("ocean"));
        assert_eq!(om3_realm("access-om3.ww3.hi.1900-01-02-00000"), Some("wave"));
        // both present: cice outranks mom6
        assert_eq!(om3_realm("mom6.cice.h.1900"), Some("seaIce"));
        // substrings are not tokens
        assert_eq!(om3_realm("access-om3.service.h.1900"), None);
        assert_eq!(om3_realm("ocean_month"), None);
    }

    #[test]
    fn test_ensemble_adds_join_new() {
        let config = AccessEsm::esm15(true).default_config(vec!["/data".into()]);
        assert_eq!(config.aggregations.len(), 2);
        assert_eq!(config.aggregations[1], AggregationRule::join_new("member"));

        let config = AccessEsm::cm2(false).default_config(vec!["/data".into()]);
        assert_eq!(config.aggregations.len(), 1);
    }

    #[test]
    fn test_esm_layout() {
        let family = AccessEsm::esm15(false);
        let path = "/g/data/p73/archive/PI-GWL-B2035/history/ocn/ocean_month.nc-01011231";
        let (exp, realm) = family.layout(Path::new(path)).unwrap();
        assert_eq!(exp, "PI-GWL-B2035");
        assert_eq!(realm, "ocean");

        assert!(family.layout(Path::new("/g/data/exp/history/land/x.nc")).is_err());
        assert!(family.layout(Path::new("/g/data/exp/output/ocn/x.nc")).is_err());
    }
}
