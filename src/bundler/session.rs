//! Bundler session with a warm module cache
//!
//! A session is created once per scripts pipeline (or watch loop) and keeps
//! every parsed module keyed by canonical path together with a fingerprint
//! of its source. A rebundle re-reads each reachable module but only parses
//! the ones whose fingerprint changed. Modules that are no longer reachable
//! from the entry are evicted after each bundle.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::graph::{Module, ModuleGraph, ModuleId, ModuleType};
use crate::error::BundleError;
use crate::mode::Mode;
use crate::pipeline::{SourceMap, SourceMapBuilder};
use crate::resolver::Resolver;
use crate::transform::Transformer;
use crate::utils::{hash_content, relative_path};

/// Output of parsing one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedModule {
    /// Import specifiers in source order
    pub dependencies: Vec<String>,

    /// Transformed code
    pub code: String,
}

/// The "parse module" collaborator
pub trait ModuleParser: Send + Sync {
    fn parse(&self, path: &Path, source: &str, mode: Mode) -> Result<ParsedModule, BundleError>;
}

/// Default parser: regex dependency extraction plus the ESM transformer
#[derive(Debug, Default, Clone)]
pub struct DefaultParser {
    resolver: Resolver,
}

impl ModuleParser for DefaultParser {
    fn parse(&self, path: &Path, source: &str, mode: Mode) -> Result<ParsedModule, BundleError> {
        let module_type = ModuleType::detect(path);
        let dependencies = self.resolver.extract_dependencies(source, &module_type);
        let code = Transformer::new(mode).transform(source, path, &module_type)?;

        Ok(ParsedModule { dependencies, code })
    }
}

#[derive(Debug, Clone)]
struct CachedModule {
    fingerprint: String,
    parsed: ParsedModule,
}

/// Counters for the last bundle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BundleStats {
    pub modules: usize,
    pub parsed: usize,
    pub reused: usize,
}

/// A rendered bundle
#[derive(Debug, Clone)]
pub struct Bundle {
    pub code: String,
    pub source_map: Option<SourceMap>,
    pub stats: BundleStats,
}

/// Long-lived bundling state
pub struct BundlerSession {
    mode: Mode,
    root: PathBuf,
    parser: Arc<dyn ModuleParser>,
    resolver: Resolver,
    cache: HashMap<PathBuf, CachedModule>,
}

impl BundlerSession {
    pub fn new(root: impl Into<PathBuf>, mode: Mode) -> Self {
        Self::with_parser(root, mode, Arc::new(DefaultParser::default()))
    }

    pub fn with_parser(root: impl Into<PathBuf>, mode: Mode, parser: Arc<dyn ModuleParser>) -> Self {
        let root = root.into();
        Self {
            mode,
            root: fs::canonicalize(&root).unwrap_or(root),
            parser,
            resolver: Resolver::new(),
            cache: HashMap::new(),
        }
    }

    /// Number of modules currently cached
    pub fn cached_modules(&self) -> usize {
        self.cache.len()
    }

    /// Bundle everything reachable from `entry`
    pub fn bundle(&mut self, entry: &Path, output_name: &str) -> Result<Bundle, BundleError> {
        let entry = fs::canonicalize(entry)
            .map_err(|e| BundleError::new(entry, format!("Cannot read entry module: {}", e)))?;

        let mut graph = ModuleGraph::new();
        let mut stats = BundleStats::default();

        self.visit(&entry, true, &mut graph, &mut stats)?;

        self.cache.retain(|path, _| graph.contains(path));
        stats.modules = graph.len();

        debug!(
            "bundled {} module(s): {} parsed, {} from cache",
            stats.modules, stats.parsed, stats.reused
        );

        let (code, source_map) = self.render(&graph, output_name);

        Ok(Bundle {
            code,
            source_map,
            stats,
        })
    }

    fn visit(
        &mut self,
        path: &Path,
        is_entry: bool,
        graph: &mut ModuleGraph,
        stats: &mut BundleStats,
    ) -> Result<ModuleId, BundleError> {
        if let Some(id) = graph.get_module_id(path) {
            return Ok(id);
        }

        let source = fs::read_to_string(path)
            .map_err(|e| BundleError::new(path, format!("Failed to read module: {}", e)))?;
        let fingerprint = hash_content(source.as_bytes());

        let parsed = match self.cache.get(path) {
            Some(cached) if cached.fingerprint == fingerprint => {
                stats.reused += 1;
                cached.parsed.clone()
            }
            _ => {
                stats.parsed += 1;
                let parsed = self.parser.parse(path, &source, self.mode)?;
                self.cache.insert(
                    path.to_path_buf(),
                    CachedModule {
                        fingerprint,
                        parsed: parsed.clone(),
                    },
                );
                parsed
            }
        };

        let id = graph.add_module(Module {
            path: path.to_path_buf(),
            source,
            code: parsed.code,
            is_entry,
        });

        for specifier in parsed.dependencies {
            let resolved = self.resolver.resolve(&specifier, path)?.ok_or_else(|| {
                BundleError::new(path, format!("Cannot find module '{}'", specifier))
            })?;
            let resolved = fs::canonicalize(&resolved).unwrap_or(resolved);

            let dep_id = self.visit(&resolved, false, graph, stats)?;
            graph.add_dependency(id, specifier, dep_id);
        }

        Ok(id)
    }

    /// Render the graph as a self-executing bundle
    fn render(&self, graph: &ModuleGraph, output_name: &str) -> (String, Option<SourceMap>) {
        let mut code = String::from(RUNTIME_PRELUDE);
        let mut map = self
            .mode
            .is_development()
            .then(|| SourceMapBuilder::new(output_name));

        for (id, module) in graph.modules() {
            code.push_str(&format!("{}: [function (require, module, exports) {{\n", id));

            if let Some(map) = map.as_mut() {
                let name = relative_path(&self.root, &module.path)
                    .unwrap_or_else(|| module.path.display().to_string());
                let source = map.add_source(name, Some(module.source.clone()));
                let first_line = code.matches('\n').count();
                for original in 0..module.code.lines().count().min(module.source.lines().count()) {
                    map.add_line(first_line + original, source, original);
                }
            }

            code.push_str(&module.code);
            if !module.code.ends_with('\n') {
                code.push('\n');
            }

            let deps: serde_json::Map<String, serde_json::Value> = graph
                .dependencies(id)
                .iter()
                .map(|(spec, dep)| (spec.clone(), serde_json::Value::from(*dep)))
                .collect();
            code.push_str(&format!(
                "}}, {}],\n",
                serde_json::Value::Object(deps)
            ));
        }

        let entry = graph
            .modules()
            .find(|(_, m)| m.is_entry)
            .map(|(id, _)| id)
            .unwrap_or(0);
        code.push_str(&format!("}}, {});\n", entry));

        (code, map.map(SourceMapBuilder::build))
    }
}

const RUNTIME_PRELUDE: &str = r#"(function (modules, entry) {
  var cache = {};
  function load(id) {
    if (cache[id]) {
      return cache[id].exports;
    }
    var module = (cache[id] = { exports: {} });
    var definition = modules[id];
    definition[0].call(module.exports, function (name) {
      var dep = definition[1][name];
      if (dep === undefined) {
        throw new Error("Cannot find module '" + name + "'");
      }
      return load(dep);
    }, module, module.exports);
    return module.exports;
  }
  load(entry);
})({
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    /// Wraps the default parser and counts calls per file name
    #[derive(Default)]
    struct CountingParser {
        inner: DefaultParser,
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    impl CountingParser {
        fn calls(&self, name: &str) -> usize {
            self.calls.lock().get(name).copied().unwrap_or(0)
        }
    }

    impl ModuleParser for CountingParser {
        fn parse(&self, path: &Path, source: &str, mode: Mode) -> Result<ParsedModule, BundleError> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            *self.calls.lock().entry(name).or_default() += 1;
            self.total.fetch_add(1, Ordering::SeqCst);
            self.inner.parse(path, source, mode)
        }
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::write(
            dir.path().join("js/index.js"),
            "import a from './a';\nimport { b } from './b';\nconsole.log(a, b);\n",
        )
        .unwrap();
        fs::write(dir.path().join("js/a.js"), "export default 'a';\n").unwrap();
        fs::write(dir.path().join("js/b.js"), "export const b = 'b';\n").unwrap();
        dir
    }

    #[test]
    fn test_bundle_contains_all_modules() {
        let dir = project();
        let mut session = BundlerSession::new(dir.path(), Mode::Production);

        let bundle = session.bundle(&dir.path().join("js/index.js"), "bundle.js").unwrap();

        assert_eq!(bundle.stats.modules, 3);
        assert!(bundle.code.contains(r#"{"./a":1,"./b":2}"#));
        assert!(bundle.code.contains("exports.default = 'a';"));
        assert!(bundle.code.trim_end().ends_with("}, 0);"));
        assert!(bundle.source_map.is_none());
    }

    #[test]
    fn test_rebundle_reuses_unchanged_modules() {
        let dir = project();
        let parser = Arc::new(CountingParser::default());
        let mut session = BundlerSession::with_parser(dir.path(), Mode::Development, parser.clone());
        let entry = dir.path().join("js/index.js");

        session.bundle(&entry, "bundle.js").unwrap();
        fs::write(dir.path().join("js/a.js"), "export default 'changed';\n").unwrap();
        let second = session.bundle(&entry, "bundle.js").unwrap();

        assert_eq!(parser.calls("a.js"), 2);
        assert_eq!(parser.calls("b.js"), 1);
        assert_eq!(parser.calls("index.js"), 1);
        assert_eq!(second.stats, BundleStats { modules: 3, parsed: 1, reused: 2 });
        assert!(second.code.contains("'changed'"));
    }

    #[test]
    fn test_unreachable_modules_are_evicted() {
        let dir = project();
        let mut session = BundlerSession::new(dir.path(), Mode::Development);
        let entry = dir.path().join("js/index.js");

        session.bundle(&entry, "bundle.js").unwrap();
        assert_eq!(session.cached_modules(), 3);

        fs::write(&entry, "import a from './a';\n").unwrap();
        session.bundle(&entry, "bundle.js").unwrap();
        assert_eq!(session.cached_modules(), 2);
    }

    #[test]
    fn test_missing_module_is_bundle_error() {
        let dir = project();
        fs::write(dir.path().join("js/index.js"), "require('./nope');\n").unwrap();
        let mut session = BundlerSession::new(dir.path(), Mode::Development);

        let err = session
            .bundle(&dir.path().join("js/index.js"), "bundle.js")
            .unwrap_err();
        assert!(err.message.contains("Cannot find module './nope'"));
    }

    #[test]
    fn test_commented_out_import_does_not_fail_bundle() {
        let dir = project();
        fs::write(
            dir.path().join("js/index.js"),
            "// import old from './old';\nimport a from './a';\nconsole.log(a);\n",
        )
        .unwrap();
        let mut session = BundlerSession::new(dir.path(), Mode::Development);

        let bundle = session.bundle(&dir.path().join("js/index.js"), "bundle.js").unwrap();
        assert_eq!(bundle.stats.modules, 2);
        assert!(bundle.code.contains(r#"{"./a":1}"#));
    }

    #[test]
    fn test_development_map_points_at_sources() {
        let dir = project();
        let mut session = BundlerSession::new(dir.path(), Mode::Development);

        let bundle = session.bundle(&dir.path().join("js/index.js"), "bundle.js").unwrap();
        let map = bundle.source_map.unwrap();

        assert_eq!(map.file, "bundle.js");
        assert_eq!(map.sources, vec!["js/index.js", "js/a.js", "js/b.js"]);
        assert!(!map.mappings.is_empty());
    }

    #[test]
    fn test_import_cycles_terminate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "require('./b');\n").unwrap();
        fs::write(dir.path().join("b.js"), "require('./a');\n").unwrap();
        let mut session = BundlerSession::new(dir.path(), Mode::Development);

        let bundle = session.bundle(&dir.path().join("a.js"), "bundle.js").unwrap();
        assert_eq!(bundle.stats.modules, 2);
    }
}
