//! Tests of the metadata-validate and metadata-template commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use catalog_build::config_loader::load_metadata;
use catalog_build::{metadata_template, validate_metadata_files, write_metadata_template};
use test_utils::metadata_yaml;

const OM2_UUID: &str = "214e8e6d-3bc5-4353-98d3-b9e9a5507d4b";
const OM3_UUID: &str = "c1a0e2b4-5d6f-4a7b-8c9d-0e1f2a3b4c5d";

fn write(dir: &Path, file: &str, content: &str) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// metadata-validate
// ============================================================================

#[test]
fn test_validate_multiple_files() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        write(dir.path(), "om2.yaml", &metadata_yaml("om2_run", OM2_UUID)),
        write(dir.path(), "om3.yaml", &metadata_yaml("om3_run", OM3_UUID)),
    ];

    let valid = validate_metadata_files(&files).unwrap();
    let names: Vec<&str> = valid.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["om2_run", "om3_run"]);
}

#[test]
fn test_validate_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let present = write(dir.path(), "om2.yaml", &metadata_yaml("om2_run", OM2_UUID));
    let absent = dir.path().join("does/not/exist.yaml");

    let err = validate_metadata_files(&[present, absent.clone()]).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("No such file(s)"), "{}", message);
    assert!(message.contains(&absent.display().to_string()), "{}", message);
}

#[test]
fn test_validate_reports_every_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        write(dir.path(), "good.yaml", &metadata_yaml("om2_run", OM2_UUID)),
        write(dir.path(), "bad_uuid.yaml", &metadata_yaml("om3_run", "not-a-uuid")),
        write(dir.path(), "bad_name.yaml", &metadata_yaml("has space", OM3_UUID)),
    ];

    let err = validate_metadata_files(&files).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.starts_with("2 of 3 metadata file(s) invalid"), "{}", message);
    assert!(message.contains("bad_uuid.yaml"), "{}", message);
    assert!(message.contains("bad_name.yaml"), "{}", message);
    assert!(!message.contains("good.yaml"), "{}", message);
}

// ============================================================================
// metadata-template
// ============================================================================

#[test]
fn test_template_needs_filling_in() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.yaml");
    write_metadata_template(&path, false).unwrap();

    // placeholder name is rejected
    let err = load_metadata(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("may only contain"), "{:#}", err);

    let filled: String = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| {
            if line.starts_with("name:") {
                "name: my_experiment".to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(&path, filled).unwrap();

    let metadata = load_metadata(&path).unwrap();
    assert_eq!(metadata.name, "my_experiment");
    assert!(metadata.extra.contains_key("long_description"));
    assert!(metadata.extra.contains_key("keywords"));
}

#[test]
fn test_template_uuid_is_fresh() {
    let uuid = |text: String| {
        text.lines()
            .find_map(|l| l.strip_prefix("experiment_uuid: ").map(str::to_string))
            .unwrap()
    };
    let first = uuid(metadata_template());
    let second = uuid(metadata_template());
    assert_ne!(first, second);
    assert!(uuid::Uuid::parse_str(&first).is_ok());
}

#[test]
fn test_template_does_not_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "metadata.yaml", "name: keep_me\n");

    assert!(write_metadata_template(&path, false).is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "name: keep_me\n");

    write_metadata_template(&path, true).unwrap();
    assert!(fs::read_to_string(&path).unwrap().contains("experiment_uuid"));
}

// ============================================================================
// Entry points
// ============================================================================

#[test]
fn test_entry_points() {
    for exe in [
        env!("CARGO_BIN_EXE_catalog-build"),
        env!("CARGO_BIN_EXE_metadata-validate"),
        env!("CARGO_BIN_EXE_metadata-template"),
    ] {
        let status = Command::new(exe).arg("--help").output().unwrap().status;
        assert!(status.success(), "{} --help", exe);
    }
}

#[test]
fn test_template_then_validate_commands() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("new.yaml");

    let out = Command::new(env!("CARGO_BIN_EXE_metadata-template"))
        .arg("--output")
        .arg(&template)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(template.exists());

    // unfilled template fails validation
    let out = Command::new(env!("CARGO_BIN_EXE_metadata-validate"))
        .arg(&template)
        .output()
        .unwrap();
    assert!(!out.status.success());

    let good = write(dir.path(), "om2.yaml", &metadata_yaml("om2_run", OM2_UUID));
    let out = Command::new(env!("CARGO_BIN_EXE_metadata-validate"))
        .arg(&good)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("om2_run"));

    let out = Command::new(env!("CARGO_BIN_EXE_metadata-validate"))
        .arg(dir.path().join("absent.yaml"))
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("No such file(s)"));
}
