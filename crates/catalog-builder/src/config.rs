//! Builder configuration.
//!
//! Every family supplies a complete [`BuilderConfig`] of defaults; callers
//! adjust it with a [`BuilderOverrides`] read from a config file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use catalog_common::{AggregationRule, DataFormat};

use crate::error::{BuildError, Result};
use crate::patterns::{default_frequency_rules, default_patterns, FrequencyRuleSpec, PatternSpec};

/// Number of workers used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Everything the pipeline needs to know about one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Roots to crawl
    pub paths: Vec<PathBuf>,
    /// Directory levels to descend below each root (0 = root files only)
    pub depth: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub data_format: DataFormat,
    pub groupby_attrs: Vec<String>,
    pub aggregations: Vec<AggregationRule>,
    pub storage_options: BTreeMap<String, serde_json::Value>,
    /// Name of the time dimension/coordinate
    pub time_dim: String,
    pub filename_patterns: Vec<PatternSpec>,
    pub frequency_rules: Vec<FrequencyRuleSpec>,
    pub fill_char: char,
    /// Replacement for the shipped asset schema
    pub schema_path: Option<PathBuf>,
    /// Size of the parse worker pool
    pub workers: usize,
}

impl BuilderConfig {
    /// Defaults shared by every family.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            depth: 0,
            include_patterns: vec!["*.nc".to_string()],
            exclude_patterns: Vec::new(),
            data_format: DataFormat::Netcdf,
            groupby_attrs: vec!["file_id".to_string(), "frequency".to_string()],
            aggregations: vec![AggregationRule::default_join_existing("time")],
            storage_options: BTreeMap::new(),
            time_dim: "time".to_string(),
            filename_patterns: default_patterns('X'),
            frequency_rules: default_frequency_rules(),
            fill_char: 'X',
            schema_path: None,
            workers: default_workers(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(BuildError::InvalidConfig("no paths to crawl".to_string()));
        }
        if self.workers == 0 {
            return Err(BuildError::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.groupby_attrs.is_empty() {
            return Err(BuildError::InvalidConfig("groupby_attrs must not be empty".to_string()));
        }
        if self.time_dim.is_empty() {
            return Err(BuildError::InvalidConfig("time_dim must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Optional adjustments on top of a family's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderOverrides {
    pub depth: Option<usize>,
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub data_format: Option<DataFormat>,
    pub groupby_attrs: Option<Vec<String>>,
    pub aggregations: Option<Vec<AggregationRule>>,
    pub storage_options: Option<BTreeMap<String, serde_json::Value>>,
    pub time_dim: Option<String>,
    pub filename_patterns: Option<Vec<PatternSpec>>,
    pub frequency_rules: Option<Vec<FrequencyRuleSpec>>,
    pub fill_char: Option<char>,
    pub schema_path: Option<PathBuf>,
    pub workers: Option<usize>,
}

impl BuilderOverrides {
    pub fn apply(self, config: &mut BuilderConfig) {
        // default patterns follow the fill char unless replaced too
        if let (Some(fill), None) = (self.fill_char, &self.filename_patterns) {
            if config.filename_patterns == default_patterns(config.fill_char) {
                config.filename_patterns = default_patterns(fill);
            }
        }
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field {
                    config.$field = value;
                })*
            };
        }
        set!(
            depth,
            include_patterns,
            exclude_patterns,
            data_format,
            groupby_attrs,
            aggregations,
            storage_options,
            time_dim,
            filename_patterns,
            frequency_rules,
            fill_char,
            workers
        );
        if self.schema_path.is_some() {
            config.schema_path = self.schema_path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BuilderConfig::new(vec!["/data".into()]);
        assert_eq!(config.groupby_attrs, ["file_id", "frequency"]);
        assert_eq!(config.aggregations.len(), 1);
        assert_eq!(config.aggregations[0].attribute_name(), "start_date");
        assert!(config.workers >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_from_yaml() {
        let yaml = r#"
depth: 1
workers: 2
exclude_patterns: ["*restart*"]
aggregations:
  - type: join_new
    attribute_name: member
"#;
        let overrides: BuilderOverrides = serde_yaml::from_str(yaml).unwrap();
        let mut config = BuilderConfig::new(vec!["/data".into()]);
        overrides.apply(&mut config);

        assert_eq!(config.depth, 1);
        assert_eq!(config.workers, 2);
        assert_eq!(config.exclude_patterns, ["*restart*"]);
        assert_eq!(config.aggregations, vec![AggregationRule::JoinNew {
            attribute_name: "member".into(),
            options: BTreeMap::new(),
        }]);
        // untouched fields keep their defaults
        assert_eq!(config.time_dim, "time");
    }

    #[test]
    fn test_fill_char_override_follows_default_patterns() {
        let overrides: BuilderOverrides = serde_yaml::from_str("fill_char: '#'").unwrap();
        let mut config = BuilderConfig::new(vec!["/data".into()]);
        overrides.apply(&mut config);
        assert_eq!(config.fill_char, '#');
        assert_eq!(config.filename_patterns, default_patterns('#'));

        let custom = vec![PatternSpec::timestamp(r"^(?P<timestamp>\d{4})$")];
        let overrides = BuilderOverrides {
            fill_char: Some('#'),
            filename_patterns: Some(custom.clone()),
            ..Default::default()
        };
        let mut config = BuilderConfig::new(vec!["/data".into()]);
        overrides.apply(&mut config);
        assert_eq!(config.filename_patterns, custom);
    }

    #[test]
    fn test_unknown_override_rejected() {
        assert!(serde_yaml::from_str::<BuilderOverrides>("dept: 1").is_err());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = BuilderConfig::new(Vec::new());
        assert!(config.validate().is_err());
        config.paths.push("/data".into());
        config.workers = 0;
        assert!(config.validate().is_err());
    }
}
