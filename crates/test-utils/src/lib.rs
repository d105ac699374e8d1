//! Shared test utilities for the esm-catalog workspace.
//!
//! This crate provides common testing infrastructure including:
//! - CDL dataset generators (text datasets readable by `CdlOpener`)
//! - Fixture trees laid out like real ACCESS model output
//! - Skip macros for tests that need external programs
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, CdlFile, TimeAxis};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

use std::path::Path;
use std::process::{Command, Stdio};

/// True when `program` can be spawned from `PATH`.
pub fn command_available(program: &str) -> bool {
    Command::new(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|mut child| {
            let _ = child.wait();
            true
        })
        .unwrap_or(false)
}

/// Every file below `root`, relative to it, sorted.
pub fn list_tree(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().into_owned());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

/// Macro to skip a test if an external program is not installed.
///
/// # Usage
///
/// ```ignore
/// use test_utils::require_command;
///
/// #[test]
/// fn test_ncdump_header() {
///     require_command!("ncdump");
///     // Test code running ncdump...
/// }
/// ```
///
/// If the program is not found, the test will print a skip message and return early.
#[macro_export]
macro_rules! require_command {
    ($program:expr) => {{
        if !$crate::command_available($program) {
            eprintln!("SKIPPED: '{}' is not installed or not on PATH.", $program);
            return;
        }
    }};
}
