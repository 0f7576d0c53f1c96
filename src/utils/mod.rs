//! Utility functions and helpers

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Generate a hash of the given content
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Get relative path from base to target
pub fn relative_path(from: &Path, to: &Path) -> Option<String> {
    pathdiff::diff_paths(to, from).map(|p| path_to_slash(&p))
}

/// Render a path with forward slashes, for glob matching and display
pub fn path_to_slash(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// Compile a list of glob patterns into a matcher
pub fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    builder.build().context("Failed to build glob set")
}

/// Static directory prefix of a glob pattern (`sass/**/*.scss` -> `sass`)
pub fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    let components: Vec<&str> = pattern.split('/').collect();

    for (i, part) in components.iter().enumerate() {
        let is_last = i + 1 == components.len();
        if is_last || part.contains(['*', '?', '[', '{']) {
            break;
        }
        if !part.is_empty() && *part != "." {
            base.push(part);
        }
    }

    base
}

/// Find files under `root` whose root-relative path matches any pattern.
/// Results are sorted for deterministic ordering.
pub fn collect_files<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Vec<PathBuf>> {
    let matcher = build_globset(patterns)?;
    let mut files = Vec::new();

    let mut bases: Vec<PathBuf> = patterns.iter().map(|p| glob_base(p.as_ref())).collect();
    bases.sort();
    bases.dedup();

    for base in bases {
        let dir = root.join(&base);
        if !dir.exists() {
            continue;
        }

        for entry in WalkDir::new(&dir).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if matcher.is_match(path_to_slash(relative)) {
                files.push(relative.to_path_buf());
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Reject paths that would escape their base directory
pub fn is_contained(path: &Path) -> bool {
    !path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_hash_content() {
        let hash = hash_content(b"hello world");
        assert_eq!(hash.len(), 16);
        assert_ne!(hash, hash_content(b"hello world!"));
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("sass/**/*.scss"), PathBuf::from("sass"));
        assert_eq!(glob_base("./dist/*.css"), PathBuf::from("dist"));
        assert_eq!(glob_base("index.html"), PathBuf::new());
        assert_eq!(glob_base("js/lib/{a,b}.js"), PathBuf::from("js/lib"));
    }

    #[test]
    fn test_collect_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js/lib")).unwrap();
        fs::write(dir.path().join("js/index.js"), "").unwrap();
        fs::write(dir.path().join("js/lib/util.js"), "").unwrap();
        fs::write(dir.path().join("js/readme.md"), "").unwrap();

        let files = collect_files(dir.path(), &["js/**/*.js"]).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("js/index.js"), PathBuf::from("js/lib/util.js")]
        );
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained(Path::new("fonts/a.woff")));
        assert!(!is_contained(Path::new("../a.woff")));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        use std::time::Duration;

        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs_f64(1.5)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5.00s");
    }
}
