//! Module resolution
//!
//! Handles extracting import specifiers from script sources and resolving
//! them to actual file paths.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::bundler::{blank_comments, ModuleType};
use crate::error::BundleError;

/// Regex patterns for extracting imports
static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:import|export)\s+(?:(?:[\w$]+\s*,\s*)?(?:\{[^}]*\}|\*(?:\s+as\s+[\w$]+)?|[\w$]+)\s+from\s+)?["']([^"']+)["']|require\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

static DYNAMIC_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

const EXTENSIONS: [&str; 4] = ["js", "mjs", "cjs", "json"];

/// Module resolver
#[derive(Debug, Clone, Default)]
pub struct Resolver;

impl Resolver {
    /// Create a new resolver
    pub fn new() -> Self {
        Self
    }

    /// Extract import/require specifiers from source code, in order of
    /// first appearance
    pub fn extract_dependencies(&self, source: &str, module_type: &ModuleType) -> Vec<String> {
        if !module_type.is_js_like() {
            return Vec::new();
        }

        let code = blank_comments(source);
        let mut dependencies: Vec<(usize, String)> = Vec::new();

        let statics = IMPORT_REGEX
            .captures_iter(&code)
            .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)));
        let dynamics = DYNAMIC_IMPORT_REGEX
            .captures_iter(&code)
            .filter_map(|cap| cap.get(1));

        for m in statics.chain(dynamics) {
            let spec = m.as_str().to_string();
            if !dependencies.iter().any(|(_, d)| d == &spec) {
                dependencies.push((m.start(), spec));
            }
        }

        dependencies.sort_by_key(|(pos, _)| *pos);
        debug!("Found {} dependencies", dependencies.len());

        dependencies.into_iter().map(|(_, spec)| spec).collect()
    }

    /// Resolve an import specifier to an absolute file path
    pub fn resolve(&self, specifier: &str, from: &Path) -> Result<Option<PathBuf>, BundleError> {
        debug!("Resolving '{}' from '{}'", specifier, from.display());

        let base_dir = from.parent().unwrap_or(Path::new("."));

        let resolved = if specifier.starts_with('.') || specifier.starts_with('/') {
            self.resolve_relative(specifier, base_dir)
        } else {
            self.resolve_bare(specifier, base_dir)?
        };

        debug!("Resolved to: {:?}", resolved);

        Ok(resolved)
    }

    /// Resolve a relative import
    fn resolve_relative(&self, specifier: &str, base_dir: &Path) -> Option<PathBuf> {
        let target = base_dir.join(specifier);

        // Try exact path first
        if target.is_file() {
            return Some(target);
        }

        // Try adding extensions
        for ext in &EXTENSIONS {
            let with_ext = PathBuf::from(format!("{}.{}", target.display(), ext));
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        // Try as directory with index file
        if target.is_dir() {
            for ext in &EXTENSIONS {
                let index = target.join(format!("index.{}", ext));
                if index.is_file() {
                    return Some(index);
                }
            }
        }

        None
    }

    /// Resolve a bare import (from node_modules)
    fn resolve_bare(&self, specifier: &str, from: &Path) -> Result<Option<PathBuf>, BundleError> {
        let mut current = from.to_path_buf();

        // Walk up directory tree looking for node_modules
        loop {
            let node_modules = current.join("node_modules");

            if node_modules.is_dir() {
                if let Some(resolved) = self.resolve_in_node_modules(&node_modules, specifier)? {
                    return Ok(Some(resolved));
                }
            }

            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve a module within a node_modules directory
    fn resolve_in_node_modules(
        &self,
        node_modules: &Path,
        specifier: &str,
    ) -> Result<Option<PathBuf>, BundleError> {
        // Split specifier into package name and subpath
        let (package_name, subpath) = if specifier.starts_with('@') {
            // Scoped package: @scope/name or @scope/name/subpath
            let parts: Vec<&str> = specifier.splitn(3, '/').collect();
            if parts.len() < 2 {
                return Ok(None);
            }
            let name = format!("{}/{}", parts[0], parts[1]);
            (name, parts.get(2).map(|s| s.to_string()))
        } else {
            let parts: Vec<&str> = specifier.splitn(2, '/').collect();
            (parts[0].to_string(), parts.get(1).map(|s| s.to_string()))
        };

        let package_dir = node_modules.join(&package_name);

        if !package_dir.is_dir() {
            return Ok(None);
        }

        if let Some(sub) = subpath {
            return Ok(self.resolve_relative(&format!("./{}", sub), &package_dir));
        }

        // Otherwise, look at package.json for a browser/module/main entry
        let package_json = package_dir.join("package.json");

        if package_json.is_file() {
            let content = fs::read_to_string(&package_json)
                .map_err(|e| BundleError::new(&package_json, format!("Failed to read package.json: {}", e)))?;
            let pkg: serde_json::Value = serde_json::from_str(&content)
                .map_err(|e| BundleError::new(&package_json, format!("Failed to parse package.json: {}", e)))?;

            for field in ["browser", "module", "main"] {
                if let Some(entry) = pkg.get(field).and_then(|v| v.as_str()) {
                    let entry = if entry.starts_with('.') {
                        entry.to_string()
                    } else {
                        format!("./{}", entry)
                    };
                    if let Some(resolved) = self.resolve_relative(&entry, &package_dir) {
                        return Ok(Some(resolved));
                    }
                }
            }
        }

        // Default to index.js
        Ok(self.resolve_relative("./index.js", &package_dir))
    }
}
