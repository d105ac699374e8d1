//! Configuration loader for catalog builds
//!
//! Loads and validates the YAML files behind a build:
//! - Build configurations naming a builder family and its sources
//! - Experiment metadata files (name, description, experiment UUID)
//!
//! Supports environment variable substitution using ${VAR} syntax.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use catalog_builder::BuilderOverrides;

// ============================================================================
// Build Configuration (config/*.yaml)
// ============================================================================

/// One build configuration file: a family and the sources it builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfigFile {
    /// Builder family, e.g. `AccessOm2Builder`
    pub builder: String,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Experiment metadata, relative paths resolve against the config file
    pub metadata_yaml: PathBuf,
    /// Roots to crawl
    pub path: Vec<PathBuf>,
    #[serde(default)]
    pub ensemble: bool,
    #[serde(default)]
    pub overrides: BuilderOverrides,
}

// ============================================================================
// Experiment Metadata (metadata.yaml)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    pub name: String,
    pub experiment_uuid: String,
    pub description: String,
    /// Everything else in the file, carried through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

// ============================================================================
// Loading Functions
// ============================================================================

/// Load and validate a build configuration file
pub fn load_build_config<P: AsRef<Path>>(path: P) -> Result<BuildConfigFile> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read build config from {:?}", path))?;

    let expanded = expand_env_vars(&content)
        .with_context(|| format!("Failed to expand environment variables in {:?}", path))?;

    let mut config: BuildConfigFile = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse build config from {:?}", path))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for source in &mut config.sources {
        source.metadata_yaml = resolve_relative(base, &source.metadata_yaml);
    }

    validate_build_config(&config).with_context(|| format!("Invalid build config {:?}", path))?;

    Ok(config)
}

/// Load and validate an experiment metadata file
pub fn load_metadata<P: AsRef<Path>>(path: P) -> Result<ExperimentMetadata> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata from {:?}", path))?;

    let metadata: ExperimentMetadata = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse metadata from {:?}", path))?;

    validate_metadata(&metadata).with_context(|| format!("Invalid metadata {:?}", path))?;

    Ok(metadata)
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            let value = resolve_var_expr(&var_expr)?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve variable expression (supports VAR and VAR:-default syntax)
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr))
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_build_config(config: &BuildConfigFile) -> Result<()> {
    anyhow::ensure!(!config.builder.trim().is_empty(), "Builder cannot be empty");
    anyhow::ensure!(!config.sources.is_empty(), "At least one source must be configured");

    for (idx, source) in config.sources.iter().enumerate() {
        anyhow::ensure!(
            !source.path.is_empty(),
            "Source {} ({:?}) has no paths",
            idx,
            source.metadata_yaml
        );
        if let Some(workers) = source.overrides.workers {
            anyhow::ensure!(workers > 0, "Source {} workers must be greater than 0", idx);
        }
    }

    Ok(())
}

fn validate_metadata(metadata: &ExperimentMetadata) -> Result<()> {
    anyhow::ensure!(!metadata.name.is_empty(), "Experiment name cannot be empty");
    anyhow::ensure!(
        metadata
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')),
        "Experiment name {:?} may only contain letters, digits, '_', '-' and '.'",
        metadata.name
    );
    anyhow::ensure!(
        !metadata.description.trim().is_empty(),
        "Description of {} cannot be empty",
        metadata.name
    );
    uuid::Uuid::parse_str(&metadata.experiment_uuid).with_context(|| {
        format!(
            "Invalid experiment_uuid {:?} for {}",
            metadata.experiment_uuid, metadata.name
        )
    })?;
    Ok(())
}

/// Reject builds where two sources share a name or an experiment UUID.
pub fn check_unique<'a>(metadata: impl IntoIterator<Item = &'a ExperimentMetadata>) -> Result<()> {
    let mut names = HashSet::new();
    let mut uuids = HashSet::new();

    for m in metadata {
        anyhow::ensure!(
            names.insert(m.name.as_str()),
            "Experiment name {} is used by more than one source",
            m.name
        );
        anyhow::ensure!(
            uuids.insert(m.experiment_uuid.to_lowercase()),
            "Experiment UUID {} is used by more than one source",
            m.experiment_uuid
        );
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str, uuid: &str) -> ExperimentMetadata {
        ExperimentMetadata {
            name: name.to_string(),
            experiment_uuid: uuid.to_string(),
            description: format!("{} description", name),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("CATALOG_TEST_VAR", "test_value");
        let result = expand_env_vars("prefix_${CATALOG_TEST_VAR}_suffix").unwrap();
        assert_eq!(result, "prefix_test_value_suffix");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("CATALOG_NONEXISTENT_VAR");
        let result = expand_env_vars("value_${CATALOG_NONEXISTENT_VAR:-default}_end").unwrap();
        assert_eq!(result, "value_default_end");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("CATALOG_REQUIRED_VAR");
        assert!(expand_env_vars("${CATALOG_REQUIRED_VAR}").is_err());
        assert!(expand_env_vars("path: ${UNCLOSED").is_err());
    }

    #[test]
    fn test_resolve_var_expr_override_default() {
        std::env::set_var("CATALOG_SET_VAR", "custom");
        assert_eq!(resolve_var_expr("CATALOG_SET_VAR:-default").unwrap(), "custom");
    }

    #[test]
    fn test_load_build_config() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("CATALOG_TEST_DATA", "/g/data/ik11/outputs");
        let path = dir.path().join("access-om2.yaml");
        fs::write(
            &path,
            r#"
builder: AccessOm2Builder
sources:
  - metadata_yaml: metadata/1deg_jra55_iaf.yaml
    path:
      - ${CATALOG_TEST_DATA}/1deg_jra55_iaf
    overrides:
      workers: 2
  - metadata_yaml: /abs/metadata.yaml
    path: [/g/data/ik11/outputs/025deg]
"#,
        )
        .unwrap();

        let config = load_build_config(&path).unwrap();
        assert_eq!(config.builder, "AccessOm2Builder");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(
            config.sources[0].metadata_yaml,
            dir.path().join("metadata/1deg_jra55_iaf.yaml")
        );
        assert_eq!(
            config.sources[0].path,
            [PathBuf::from("/g/data/ik11/outputs/1deg_jra55_iaf")]
        );
        assert_eq!(config.sources[0].overrides.workers, Some(2));
        assert!(!config.sources[0].ensemble);
        assert_eq!(config.sources[1].metadata_yaml, PathBuf::from("/abs/metadata.yaml"));
    }

    #[test]
    fn test_invalid_build_configs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        fs::write(&path, "builder: AccessOm2Builder\nsources: []\n").unwrap();
        assert!(load_build_config(&path).is_err());

        let no_paths =
            "builder: AccessOm2Builder\nsources:\n  - metadata_yaml: m.yaml\n    path: []\n";
        fs::write(&path, no_paths).unwrap();
        assert!(load_build_config(&path).is_err());

        let typo = "builder: AccessOm2Builder\nsources:\n  - metadata_yaml: m.yaml\n    \
                    path: [/a]\n    pth: [/b]\n";
        fs::write(&path, typo).unwrap();
        assert!(load_build_config(&path).is_err());

        assert!(load_build_config(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_load_metadata_keeps_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.yaml");
        fs::write(
            &path,
            "name: 1deg_jra55_iaf\nexperiment_uuid: 214e8e6d-3bc5-4353-98d3-b9e9a5507d4b\n\
             description: 1 degree run\nmodel:\n  - ACCESS-OM2\n",
        )
        .unwrap();

        let m = load_metadata(&path).unwrap();
        assert_eq!(m.name, "1deg_jra55_iaf");
        assert!(m.extra.contains_key("model"));
    }

    #[test]
    fn test_metadata_validation() {
        const UUID: &str = "214e8e6d-3bc5-4353-98d3-b9e9a5507d4b";
        assert!(validate_metadata(&metadata("ok_name", UUID)).is_ok());
        assert!(validate_metadata(&metadata("", UUID)).is_err());
        assert!(validate_metadata(&metadata("a/b", UUID)).is_err());
        assert!(validate_metadata(&metadata("ok_name", "not-a-uuid")).is_err());
    }

    #[test]
    fn test_check_unique() {
        let a = metadata("a", "214e8e6d-3bc5-4353-98d3-b9e9a5507d4b");
        let b = metadata("b", "7b0bc2c6-7cbb-4d97-8eb9-b0255c16d910");
        assert!(check_unique([&a, &b]).is_ok());

        let same_name = metadata("a", "7b0bc2c6-7cbb-4d97-8eb9-b0255c16d910");
        assert!(check_unique([&a, &same_name]).is_err());

        let same_uuid = metadata("c", "214E8E6D-3BC5-4353-98D3-B9E9A5507D4B");
        let err = check_unique([&a, &same_uuid]).unwrap_err();
        assert!(err.to_string().contains("UUID"));
    }
}
