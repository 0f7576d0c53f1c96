//! Pipeline executor
//!
//! A pipeline is an ordered list of [`Step`]s applied to a sequence of
//! [`FileRecord`]s. Every step consumes the records produced by the previous
//! one. The first failing step stops the pipeline, so later steps (and the
//! final write) never see a partial result.

pub mod clean;
mod sourcemap;
mod steps;
pub mod styles;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::mode::Mode;

pub use sourcemap::{SourceMap, SourceMapBuilder};
pub use steps::{Concat, Dest, Filter, Flatten, FnStep, Rename, When, WriteSourceMaps};

/// One asset flowing through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Path relative to the record's base (the output location once written)
    pub path: PathBuf,

    /// File contents
    pub contents: Vec<u8>,

    /// Source file this record was read from, if any
    pub origin: Option<PathBuf>,

    /// Source map describing `contents`
    pub source_map: Option<SourceMap>,
}

impl FileRecord {
    /// Create an in-memory record
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            origin: None,
            source_map: None,
        }
    }

    /// Read `relative` from under `root`
    pub fn read(root: &Path, relative: impl AsRef<Path>) -> PipelineResult<Self> {
        let relative = relative.as_ref();
        let full = root.join(relative);
        let contents = fs::read(&full).map_err(|e| PipelineError::io(&full, e))?;

        Ok(Self {
            path: relative.to_path_buf(),
            contents,
            origin: Some(full),
            source_map: None,
        })
    }

    /// Contents as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }

    /// File name of the record path
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Path to show in diagnostics
    pub fn display_path(&self) -> &Path {
        self.origin.as_deref().unwrap_or(&self.path)
    }
}

/// A single transform over a record sequence
pub trait Step: Send + Sync {
    /// Step name for logging
    fn name(&self) -> &str;

    /// Transform the records
    fn apply(&self, records: Vec<FileRecord>, mode: Mode) -> PipelineResult<Vec<FileRecord>>;
}

/// Run `steps` over `inputs` strictly in order
pub fn execute(
    inputs: Vec<FileRecord>,
    steps: &[Box<dyn Step>],
    mode: Mode,
) -> PipelineResult<Vec<FileRecord>> {
    let mut records = inputs;

    for step in steps {
        let start = Instant::now();
        let count = records.len();
        records = step.apply(records, mode)?;
        debug!(
            "step '{}': {} -> {} record(s) in {:?}",
            step.name(),
            count,
            records.len(),
            start.elapsed()
        );
    }

    Ok(records)
}

/// A named, ordered list of steps
pub struct Pipeline {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step that always runs
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append a step that only runs in `mode`
    pub fn when(self, mode: Mode, step: impl Step + 'static) -> Self {
        self.step(When::new(mode, step))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute the pipeline over `inputs`
    pub fn execute(&self, inputs: Vec<FileRecord>, mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        debug!("pipeline '{}' ({} steps, {})", self.name, self.steps.len(), mode);
        execute(inputs, &self.steps, mode)
    }
}
