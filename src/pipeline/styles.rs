//! Stylesheet pipeline
//!
//! read entry -> compile Sass -> vendor prefix -> rename -> (dev) source map
//! -> write. A compile error stops the run before anything is written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use tracing::debug;

use super::{Dest, FileRecord, Pipeline, SourceMapBuilder, Step, WriteSourceMaps};
use crate::config::Config;
use crate::error::{CompileError, PipelineError, PipelineResult};
use crate::mode::Mode;
use crate::utils::path_to_slash;

/// Stylesheet compiler collaborator
pub trait StyleCompiler: Send + Sync {
    fn compile(&self, source: &str, path: &Path, mode: Mode) -> Result<String, CompileError>;
}

/// Vendor-prefix collaborator
pub trait Prefixer: Send + Sync {
    fn prefix(&self, css: &str, path: &Path, mode: Mode) -> Result<String, CompileError>;
}

/// Sass compiler backed by `grass`
#[derive(Debug, Default, Clone)]
pub struct SassCompiler {
    load_paths: Vec<PathBuf>,
}

impl SassCompiler {
    pub fn new(load_paths: Vec<PathBuf>) -> Self {
        Self { load_paths }
    }
}

impl StyleCompiler for SassCompiler {
    fn compile(&self, source: &str, path: &Path, mode: Mode) -> Result<String, CompileError> {
        // Source maps need readable output, so only production compresses
        let style = if mode.is_production() {
            grass::OutputStyle::Compressed
        } else {
            grass::OutputStyle::Expanded
        };

        let mut options = grass::Options::default().style(style);
        if let Some(parent) = path.parent() {
            options = options.load_path(parent);
        }
        for load_path in &self.load_paths {
            options = options.load_path(load_path);
        }

        grass::from_string(source.to_owned(), &options)
            .map_err(|e| sass_error(path, e))
    }
}

/// Parse errors carry a zero-based span; everything else only has a message
fn sass_error(path: &Path, error: Box<grass::Error>) -> CompileError {
    let rendered = error.to_string();

    match (*error).kind() {
        grass::ErrorKind::ParseError { message, loc, .. } => CompileError {
            file: path.to_path_buf(),
            line: u32::try_from(loc.begin.line + 1).ok(),
            column: u32::try_from(loc.begin.column + 1).ok(),
            message,
        },
        _ => CompileError {
            file: path.to_path_buf(),
            line: None,
            column: None,
            message: rendered
                .lines()
                .next()
                .unwrap_or("unknown error")
                .trim_start_matches("Error: ")
                .to_string(),
        },
    }
}

/// Prefixer backed by `lightningcss`; also minifies in production
#[derive(Debug, Clone, Default)]
pub struct LightningPrefixer {
    targets: Targets,
}

impl LightningPrefixer {
    /// Build from browserslist queries such as `last 2 versions`
    pub fn new(browsers: &[String]) -> Result<Self> {
        let browsers = Browsers::from_browserslist(browsers.iter().map(String::as_str))
            .map_err(|e| anyhow::anyhow!("Invalid browser query: {}", e))?;

        Ok(Self {
            targets: browsers.map(Targets::from).unwrap_or_default(),
        })
    }
}

impl Prefixer for LightningPrefixer {
    fn prefix(&self, css: &str, path: &Path, mode: Mode) -> Result<String, CompileError> {
        let to_error = |message: String, loc: Option<(u32, u32)>| CompileError {
            file: path.to_path_buf(),
            line: loc.map(|(line, _)| line + 1),
            column: loc.map(|(_, column)| column),
            message,
        };

        let mut sheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: path_to_slash(path),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| to_error(e.kind.to_string(), e.loc.map(|l| (l.line, l.column))))?;

        sheet
            .minify(MinifyOptions {
                targets: self.targets.clone(),
                ..MinifyOptions::default()
            })
            .map_err(|e| to_error(e.kind.to_string(), e.loc.map(|l| (l.line, l.column))))?;

        let result = sheet
            .to_css(PrinterOptions {
                minify: mode.is_production(),
                targets: self.targets.clone(),
                ..PrinterOptions::default()
            })
            .map_err(|e| to_error(e.kind.to_string(), e.loc.map(|l| (l.line, l.column))))?;

        Ok(result.code)
    }
}

struct CompileStyles {
    compiler: Arc<dyn StyleCompiler>,
}

impl Step for CompileStyles {
    fn name(&self) -> &str {
        "sass"
    }

    fn apply(&self, records: Vec<FileRecord>, mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        records
            .into_iter()
            .map(|mut record| {
                let source = record.text();
                let css = self.compiler.compile(&source, record.display_path(), mode)?;

                if mode.is_development() {
                    let mut map = SourceMapBuilder::new(record.file_name().unwrap_or_default());
                    map.add_source(path_to_slash(&record.path), Some(source));
                    record.source_map = Some(map.build());
                }

                record.contents = css.into_bytes();
                record.path.set_extension("css");
                Ok(record)
            })
            .collect()
    }
}

struct PrefixStyles {
    prefixer: Arc<dyn Prefixer>,
}

impl Step for PrefixStyles {
    fn name(&self) -> &str {
        "autoprefix"
    }

    fn apply(&self, records: Vec<FileRecord>, mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        records
            .into_iter()
            .map(|mut record| {
                let css = self
                    .prefixer
                    .prefix(&record.text(), record.display_path(), mode)
                    .map_err(PipelineError::from)?;
                record.contents = css.into_bytes();
                Ok(record)
            })
            .collect()
    }
}

/// The stylesheet pipeline for one project
pub struct StylesPipeline {
    config: Arc<Config>,
    compiler: Arc<dyn StyleCompiler>,
    prefixer: Arc<dyn Prefixer>,
}

impl StylesPipeline {
    /// Pipeline with the default Sass compiler and prefixer
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let prefixer = LightningPrefixer::new(&config.styles.browsers)?;
        Ok(Self::with_collaborators(
            config,
            Arc::new(SassCompiler::default()),
            Arc::new(prefixer),
        ))
    }

    pub fn with_collaborators(
        config: Arc<Config>,
        compiler: Arc<dyn StyleCompiler>,
        prefixer: Arc<dyn Prefixer>,
    ) -> Self {
        Self {
            config,
            compiler,
            prefixer,
        }
    }

    /// Compile the entry stylesheet and write it to the output directory
    pub fn run(&self, mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        let entry = FileRecord::read(&self.config.root, &self.config.styles.entry)?;
        debug!("compiling {}", entry.display_path().display());

        Pipeline::new("styles")
            .step(CompileStyles {
                compiler: self.compiler.clone(),
            })
            .step(PrefixStyles {
                prefixer: self.prefixer.clone(),
            })
            .step(super::Rename::new(&self.config.styles.output))
            .when(Mode::Development, WriteSourceMaps)
            .step(Dest::new(self.config.output_dir()))
            .execute(vec![entry], mode)
    }
}
