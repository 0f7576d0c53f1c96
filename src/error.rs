//! Error types for Assetflow
//!
//! Registry errors are fatal and reported before any task body runs.
//! Pipeline errors are per-run: they are logged, the affected output is
//! left untouched, and other pipelines keep going.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving a task graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task '{0}' is not defined")]
    UnknownTask(String),

    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

/// Stylesheet compilation failure with the source location when known
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}{}: {message}", .file.display(), location(.line, .column))]
pub struct CompileError {
    pub file: PathBuf,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

/// `:line:column` suffix, or as much of it as is known
fn location(line: &Option<u32>, column: &Option<u32>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(":{}:{}", line, column),
        (Some(line), None) => format!(":{}", line),
        _ => String::new(),
    }
}

/// Script bundling failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {message}", .module.display())]
pub struct BundleError {
    /// Module that was being processed (or the entry when unknown)
    pub module: PathBuf,
    pub message: String,
}

impl BundleError {
    pub fn new(module: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by pipeline steps
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("Output directory does not exist: {}", .0.display())]
    MissingOutputDirectory(PathBuf),

    #[error("Step '{step}' failed: {message}")]
    Step { step: String, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn step(step: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Step {
            step: step.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
