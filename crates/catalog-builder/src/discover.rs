//! Asset discovery: walk the configured roots and filter by glob patterns.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{BuildError, Result};

/// A shell-style glob matched against the full path string.
///
/// Supports `*`, `?`, `[...]` and `[!...]`. `*` also matches `/`, so
/// `*restart*` matches any path containing `restart`.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&glob_to_regex(pattern))
            .map_err(|e| BuildError::InvalidPattern(format!("glob '{}': {}", pattern, e)))?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.regex.is_match(&path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        class.push('\\');
                    }
                    class.push(inner);
                }
                if closed {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    // Unterminated class: match the text literally.
                    out.push_str(&regex::escape("["));
                    out.push_str(&regex::escape(class.trim_start_matches('^')));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// What to walk and what to keep.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub roots: Vec<PathBuf>,
    pub depth: usize,
    pub include: Vec<GlobPattern>,
    pub exclude: Vec<GlobPattern>,
}

impl DiscoveryOptions {
    pub fn new(
        roots: Vec<PathBuf>,
        depth: usize,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self> {
        Ok(Self {
            roots,
            depth,
            include: include.iter().map(|p| GlobPattern::new(p)).collect::<Result<_>>()?,
            exclude: exclude.iter().map(|p| GlobPattern::new(p)).collect::<Result<_>>()?,
        })
    }

    fn keep(&self, path: &Path) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|g| g.matches(path));
        included && !self.exclude.iter().any(|g| g.matches(path))
    }
}

/// Collect candidate files. Depth 0 lists only files directly inside each
/// root. The result is sorted and free of duplicates; an empty result is
/// logged but not an error.
pub fn discover(options: &DiscoveryOptions) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for root in &options.roots {
        if !root.is_dir() {
            return Err(BuildError::Discovery {
                path: root.clone(),
                message: "not a directory".to_string(),
            });
        }

        for entry in WalkDir::new(root).max_depth(options.depth + 1) {
            let entry = entry.map_err(|e| BuildError::Discovery {
                path: root.clone(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if options.keep(entry.path()) {
                found.push(entry.into_path());
            }
        }
    }

    found.sort();
    found.dedup();

    if found.is_empty() {
        warn!(roots = ?options.roots, "No assets discovered");
    } else {
        debug!(count = found.len(), "Discovered assets");
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_glob_semantics() {
        let star = GlobPattern::new("*restart*").unwrap();
        assert!(star.matches(Path::new("/a/restart000/ocean.nc")));
        assert!(!star.matches(Path::new("/a/output000/ocean.nc")));

        let ext = GlobPattern::new("*.nc").unwrap();
        assert!(ext.matches(Path::new("/a/b/ocean.nc")));
        assert!(!ext.matches(Path::new("/a/b/ocean.nc.bak")));

        let class = GlobPattern::new("*/ocean_[0-9][!a].nc").unwrap();
        assert!(class.matches(Path::new("/x/ocean_1b.nc")));
        assert!(!class.matches(Path::new("/x/ocean_1a.nc")));

        let q = GlobPattern::new("*o2i.n?").unwrap();
        assert!(q.matches(Path::new("/x/o2i.nc")));

        // regex metacharacters are literal
        let plus = GlobPattern::new("*a+b*").unwrap();
        assert!(plus.matches(Path::new("/x/a+b.nc")));
        assert!(!plus.matches(Path::new("/x/aab.nc")));
    }

    #[test]
    fn test_depth_limits() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("top.nc"));
        touch(&root.join("a/one.nc"));
        touch(&root.join("a/b/two.nc"));

        let opts = |depth| {
            DiscoveryOptions::new(vec![root.to_path_buf()], depth, &["*.nc".into()], &[]).unwrap()
        };

        assert_eq!(discover(&opts(0)).unwrap(), vec![root.join("top.nc")]);
        assert_eq!(discover(&opts(1)).unwrap().len(), 2);
        assert_eq!(discover(&opts(2)).unwrap().len(), 3);
    }

    #[test]
    fn test_include_exclude_sorted_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("output001/ocean/ocean.nc"));
        touch(&root.join("output000/ocean/ocean.nc"));
        touch(&root.join("restart000/ocean/ocean.nc"));
        touch(&root.join("output000/ice/o2i.nc"));
        touch(&root.join("output000/ice/notes.txt"));

        let opts = DiscoveryOptions::new(
            vec![root.to_path_buf(), root.to_path_buf()],
            3,
            &["*.nc".into()],
            &["*restart*".into(), "*o2i.nc".into()],
        )
        .unwrap();

        let found = discover(&opts).unwrap();
        assert_eq!(
            found,
            vec![
                root.join("output000/ocean/ocean.nc"),
                root.join("output001/ocean/ocean.nc"),
            ]
        );
    }

    #[test]
    fn test_missing_root() {
        let opts = DiscoveryOptions::new(vec!["/nonexistent/root".into()], 0, &[], &[]).unwrap();
        assert!(matches!(discover(&opts), Err(BuildError::Discovery { .. })));
    }

    #[test]
    fn test_empty_is_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let opts =
            DiscoveryOptions::new(vec![dir.path().to_path_buf()], 0, &["*.nc".into()], &[])
                .unwrap();
        assert!(discover(&opts).unwrap().is_empty());
    }
}
