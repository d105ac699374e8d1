//! Experiment metadata files outside of a build.
//!
//! Backs the `metadata-validate` and `metadata-template` commands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;
use uuid::Uuid;

use crate::config_loader::{load_metadata, ExperimentMetadata};

/// Default file written by `metadata-template`.
pub const TEMPLATE_FILE: &str = "metadata.yaml";

/// Load and validate every file, reporting all failures at once.
///
/// Fails before reading anything if one of the files does not exist.
pub fn validate_metadata_files(files: &[PathBuf]) -> Result<Vec<ExperimentMetadata>> {
    let missing: Vec<String> = files
        .iter()
        .filter(|f| !f.is_file())
        .map(|f| f.display().to_string())
        .collect();
    if !missing.is_empty() {
        bail!("No such file(s): {}", missing.join(", "));
    }

    let mut valid = Vec::with_capacity(files.len());
    let mut failures = Vec::new();
    for file in files {
        match load_metadata(file) {
            Ok(metadata) => {
                info!(path = %file.display(), name = %metadata.name, "Metadata is valid");
                valid.push(metadata);
            }
            Err(e) => failures.push(format!("{:#}", e)),
        }
    }
    if !failures.is_empty() {
        bail!(
            "{} of {} metadata file(s) invalid:\n{}",
            failures.len(),
            files.len(),
            failures.join("\n")
        );
    }
    Ok(valid)
}

/// Starter metadata with a fresh experiment UUID and placeholder values.
pub fn metadata_template() -> String {
    format!(
        r#"# Experiment metadata. Replace every "<...>" value, drop the optional
# fields you do not need, then check the file with metadata-validate.
name: "<REQUIRED: short name, letters, digits, '_', '-' and '.' only>"
experiment_uuid: {uuid}
description: "<REQUIRED: one line describing the experiment>"
long_description: "<optional: longer description>"
model:
  - "<optional: model name, e.g. ACCESS-OM2>"
nominal_resolution:
  - "<optional: e.g. 1 degree>"
version: "<optional>"
contact: "<optional: name of a contact person>"
email: "<optional>"
created: "<optional: YYYY-MM-DD>"
reference: "<optional: citation>"
license: "<optional>"
url: "<optional>"
parent_experiment: "<optional: experiment_uuid of the parent run>"
related_experiments:
  - "<optional: experiment_uuid>"
notes: "<optional>"
keywords:
  - "<optional>"
"#,
        uuid = Uuid::new_v4()
    )
}

/// Write [`metadata_template`] to `path`, refusing to replace an existing
/// file unless `force` is set.
pub fn write_metadata_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }
    fs::write(path, metadata_template())
        .with_context(|| format!("Failed to write metadata template to {:?}", path))?;
    info!(path = %path.display(), "Wrote metadata template");
    Ok(())
}
