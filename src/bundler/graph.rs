//! Module graph data structures

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Unique identifier for a module within one bundle
pub type ModuleId = usize;

/// Types of modules the bundler can handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    Json,
    Unknown,
}

impl ModuleType {
    /// Determine module type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => ModuleType::JavaScript,
            "json" => ModuleType::Json,
            _ => ModuleType::Unknown,
        }
    }

    /// Detect module type from path
    pub fn detect(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(ModuleType::from_extension)
            .unwrap_or(ModuleType::Unknown)
    }

    /// Check if this is a JavaScript-like module
    pub fn is_js_like(&self) -> bool {
        matches!(self, ModuleType::JavaScript)
    }
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Absolute path to the module
    pub path: PathBuf,

    /// Original source code
    pub source: String,

    /// Transformed code
    pub code: String,

    /// Whether this is the entry point
    pub is_entry: bool,
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules indexed by their ID
    modules: Vec<Module>,

    /// Map from path to module ID
    path_to_id: HashMap<PathBuf, ModuleId>,

    /// Dependency edges: module ID -> (specifier, dependency ID), in source order
    edges: HashMap<ModuleId, Vec<(String, ModuleId)>>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph; IDs are assigned in insertion order
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.path_to_id.get(&module.path) {
            return id;
        }

        let id = self.modules.len();
        self.path_to_id.insert(module.path.clone(), id);
        self.modules.push(module);
        self.edges.insert(id, Vec::new());

        id
    }

    /// Record that `from` imports `specifier`, resolved to `to`
    pub fn add_dependency(&mut self, from: ModuleId, specifier: impl Into<String>, to: ModuleId) {
        let specifier = specifier.into();
        if let Some(deps) = self.edges.get_mut(&from) {
            if !deps.iter().any(|(s, _)| s == &specifier) {
                deps.push((specifier, to));
            }
        }
    }

    /// Get module ID from path
    pub fn get_module_id(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Whether a path is part of the graph
    pub fn contains(&self, path: &Path) -> bool {
        self.path_to_id.contains_key(path)
    }

    /// Modules with their IDs, in ID order
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }

    /// Direct dependencies of a module as `(specifier, id)` pairs
    pub fn dependencies(&self, id: ModuleId) -> &[(String, ModuleId)] {
        self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(path: &str, is_entry: bool) -> Module {
        Module {
            path: PathBuf::from(path),
            source: String::new(),
            code: String::new(),
            is_entry,
        }
    }

    #[test]
    fn test_module_type_detection() {
        assert_eq!(ModuleType::from_extension("js"), ModuleType::JavaScript);
        assert_eq!(ModuleType::from_extension("MJS"), ModuleType::JavaScript);
        assert_eq!(ModuleType::from_extension("json"), ModuleType::Json);
        assert_eq!(ModuleType::from_extension("ts"), ModuleType::Unknown);
        assert_eq!(ModuleType::detect(Path::new("a/b.cjs")), ModuleType::JavaScript);
    }

    #[test]
    fn test_module_graph_basic() {
        let mut graph = ModuleGraph::new();

        let id = graph.add_module(module("/test/main.js", true));
        assert_eq!(graph.len(), 1);
        assert!(graph.get_module(id).is_some());
        assert_eq!(graph.get_module_id(Path::new("/test/main.js")), Some(id));
        assert_eq!(graph.add_module(module("/test/main.js", false)), id);
    }

    #[test]
    fn test_dependencies_keep_source_order() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/a.js", true));
        let b = graph.add_module(module("/b.js", false));
        let c = graph.add_module(module("/c.js", false));
        graph.add_dependency(a, "./c", c);
        graph.add_dependency(a, "./b", b);
        graph.add_dependency(a, "./b", b);
        graph.add_dependency(c, "./a", a);

        assert_eq!(
            graph.dependencies(a),
            &[("./c".to_string(), c), ("./b".to_string(), b)]
        );
        assert_eq!(graph.dependencies(c), &[("./a".to_string(), a)]);
        assert!(graph.dependencies(b).is_empty());
    }
}
