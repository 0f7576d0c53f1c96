//! Script bundling
//!
//! The scripts pipeline lints the sources, bundles everything reachable from
//! the entry module into one file and writes it to the output directory.
//! Production bundles are minified; development bundles get a sibling
//! source map.

mod graph;
mod minify;
mod session;

use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::PipelineResult;
use crate::lint::{lint_sources, report, BasicLinter, Finding, Linter};
use crate::mode::Mode;
use crate::pipeline::{Dest, FileRecord, Pipeline, WriteSourceMaps};
use crate::utils::format_duration;

pub use graph::{Module, ModuleGraph, ModuleId, ModuleType};
pub use minify::{blank_comments, minify_code, MinifyScripts};
pub use session::{Bundle, BundleStats, BundlerSession, DefaultParser, ModuleParser, ParsedModule};

/// The scripts pipeline, holding its own [`BundlerSession`]
pub struct ScriptsPipeline {
    config: Arc<Config>,
    mode: Mode,
    session: BundlerSession,
    linter: Arc<dyn Linter>,
    output: Pipeline,
}

impl ScriptsPipeline {
    pub fn new(config: Arc<Config>, mode: Mode) -> Self {
        let session = BundlerSession::new(&config.root, mode);
        Self::with_session(config, mode, session)
    }

    pub fn with_session(config: Arc<Config>, mode: Mode, session: BundlerSession) -> Self {
        let output = Pipeline::new("scripts")
            .when(Mode::Production, MinifyScripts)
            .when(Mode::Development, WriteSourceMaps)
            .step(Dest::new(config.output_dir()));

        Self {
            config,
            mode,
            session,
            linter: Arc::new(BasicLinter),
            output,
        }
    }

    pub fn session(&self) -> &BundlerSession {
        &self.session
    }

    /// Lint all script sources
    pub fn lint(&self) -> anyhow::Result<Vec<Finding>> {
        lint_sources(self.linter.as_ref(), &self.config.root, &self.config.scripts.sources)
    }

    /// Lint, then bundle and write. A failed bundle writes nothing.
    pub fn run(&mut self) -> PipelineResult<Vec<FileRecord>> {
        eprintln!("{}", "------------------- REBUNDLE -------------------".green());

        match self.lint() {
            Ok(findings) => report(&findings),
            Err(e) => warn!("Lint skipped: {:#}", e),
        }

        let start = Instant::now();
        let entry = self.config.resolve(&self.config.scripts.entry);
        let output_name = self.config.scripts.output.as_str();

        let bundle = self.session.bundle(&entry, output_name)?;
        debug!(
            "{} module(s), {} reparsed, {} cached",
            bundle.stats.modules, bundle.stats.parsed, bundle.stats.reused
        );

        let mut record = FileRecord::new(output_name, bundle.code);
        record.origin = Some(entry);
        record.source_map = bundle.source_map;

        let written = self.output.execute(vec![record], self.mode)?;

        eprintln!(
            "[{}] Bundling time: {}",
            "JS".cyan(),
            format_duration(start.elapsed()).green()
        );

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::error::PipelineError;

    fn project() -> (tempfile::TempDir, Arc<Config>) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::write(
            dir.path().join("js/index.js"),
            "// entry\nimport { greet } from './greet';\nif (process.env.NODE_ENV !== 'production') { greet('dev'); }\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("js/greet.js"),
            "export function greet(name) {\n  console.log('hi ' + name);\n}\n",
        )
        .unwrap();
        let config = Arc::new(Config::with_root(dir.path()));
        (dir, config)
    }

    #[test]
    fn test_development_writes_bundle_and_map() {
        let (dir, config) = project();
        let mut scripts = ScriptsPipeline::new(config, Mode::Development);

        scripts.run().unwrap();

        let bundle = fs::read_to_string(dir.path().join("dist/bundle.js")).unwrap();
        assert!(bundle.contains("\"development\" !== 'production'"));
        assert!(bundle.contains("//# sourceMappingURL=bundle.js.map"));
        assert!(dir.path().join("dist/bundle.js.map").exists());
    }

    #[test]
    fn test_production_minifies_without_map() {
        let (dir, config) = project();
        let mut scripts = ScriptsPipeline::new(config, Mode::Production);

        scripts.run().unwrap();

        let bundle = fs::read_to_string(dir.path().join("dist/bundle.js")).unwrap();
        assert!(bundle.contains("\"production\" !== 'production'"));
        assert!(!bundle.contains("// entry"));
        assert!(!bundle.contains("sourceMappingURL"));
        assert!(!dir.path().join("dist/bundle.js.map").exists());
    }

    #[test]
    fn test_bundle_error_leaves_previous_output() {
        let (dir, config) = project();
        let mut scripts = ScriptsPipeline::new(config, Mode::Development);
        scripts.run().unwrap();
        let before = fs::read(dir.path().join("dist/bundle.js")).unwrap();

        fs::write(dir.path().join("js/index.js"), "require('./missing');\n").unwrap();
        let err = scripts.run().unwrap_err();

        assert!(matches!(err, PipelineError::Bundle(_)));
        assert_eq!(fs::read(dir.path().join("dist/bundle.js")).unwrap(), before);
    }

    #[test]
    fn test_lint_findings_do_not_block_bundle() {
        let (dir, config) = project();
        fs::write(dir.path().join("js/greet.js"), "debugger;\nexport var greet = 1;\n").unwrap();
        let mut scripts = ScriptsPipeline::new(config, Mode::Development);

        assert_eq!(scripts.lint().unwrap().len(), 2);
        scripts.run().unwrap();
        assert!(dir.path().join("dist/bundle.js").exists());
    }
}
