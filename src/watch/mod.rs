//! Watch controller
//!
//! Each [`WatchBinding`] gets its own debounced filesystem watcher, a
//! dispatcher that filters events against the binding's patterns, and a
//! worker that owns the [`RebuildHandler`]. Rebuilds of one binding never
//! overlap: while a rebuild runs, further triggers are merged into a single
//! pending rebuild. A failed rebuild is logged and the loop keeps going.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use globset::GlobSet;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::utils::{build_globset, format_duration, glob_base, path_to_slash};

/// Patterns to observe and the task they trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBinding {
    /// Task re-invoked on change, used for logging
    pub task: String,

    /// Root-relative glob patterns
    pub patterns: Vec<String>,
}

impl WatchBinding {
    pub fn new<S: Into<String>>(task: impl Into<String>, patterns: impl IntoIterator<Item = S>) -> Self {
        Self {
            task: task.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Work to do when a binding fires
#[async_trait]
pub trait RebuildHandler: Send + 'static {
    /// `changed` holds the root-relative paths that matched since the last
    /// rebuild
    async fn rebuild(&mut self, changed: &[PathBuf]) -> Result<()>;
}

/// Starts watch loops rooted at a project directory
#[derive(Debug, Clone)]
pub struct WatchController {
    root: PathBuf,
    debounce: Duration,
}

impl WatchController {
    pub fn new(root: impl Into<PathBuf>, debounce: Duration) -> Self {
        let root = root.into();
        Self {
            root: root.canonicalize().unwrap_or(root),
            debounce,
        }
    }

    /// Start observing `binding`. The loop runs until the handle is stopped
    /// or dropped.
    pub fn watch<H: RebuildHandler>(&self, binding: WatchBinding, handler: H) -> Result<WatchHandle> {
        let matcher = build_globset(&binding.patterns)?;
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();

        let events_tx = raw_tx.clone();
        let task = binding.task.clone();
        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let _ = events_tx.send(events.into_iter().map(|e| e.path).collect());
                }
                Err(e) => warn!("Watch error for '{}': {:?}", task, e),
            }
        })
        .context("Failed to create file watcher")?;

        for (path, mode) in watch_targets(&self.root, &binding.patterns) {
            debouncer
                .watcher()
                .watch(&path, mode)
                .with_context(|| format!("Failed to watch {}", path.display()))?;
            debug!("'{}' watching {}", binding.task, path.display());
        }

        let pending = Arc::new(Pending::default());
        let dispatcher = tokio::spawn(dispatch(
            self.root.clone(),
            matcher,
            raw_rx,
            pending.clone(),
        ));
        let worker = tokio::spawn(work(binding.task.clone(), handler, pending));

        info!("Watching {} for '{}'", binding.patterns.join(", "), binding.task);

        Ok(WatchHandle {
            task: binding.task,
            trigger_tx: raw_tx,
            debouncer: Some(debouncer),
            dispatcher,
            worker,
        })
    }
}

/// Directories (or single files) to register with the watcher. A pattern
/// whose base directory does not exist yet is covered by its closest
/// existing ancestor, so files created later still match.
fn watch_targets(root: &Path, patterns: &[String]) -> Vec<(PathBuf, RecursiveMode)> {
    let mut files = BTreeSet::new();
    let mut dirs: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let literal = root.join(pattern);
        if !pattern.contains(['*', '?', '[', '{']) && literal.is_file() {
            files.insert(literal);
            continue;
        }

        let base = root.join(glob_base(pattern));
        let dir = existing_ancestor(root, &base);
        if dir != base {
            debug!(
                "{} does not exist yet, watching {} for '{}'",
                base.display(),
                dir.display(),
                pattern
            );
        }
        dirs.push(dir);
    }

    dirs.sort();
    dirs.dedup();
    let mut targets: Vec<(PathBuf, RecursiveMode)> = Vec::new();
    for dir in dirs {
        if !targets.iter().any(|(t, _)| dir.starts_with(t)) {
            targets.push((dir, RecursiveMode::Recursive));
        }
    }
    for file in files {
        if !targets.iter().any(|(t, _)| file.starts_with(t)) {
            targets.push((file, RecursiveMode::NonRecursive));
        }
    }

    targets
}

fn existing_ancestor(root: &Path, dir: &Path) -> PathBuf {
    dir.ancestors()
        .take_while(|ancestor| ancestor.starts_with(root))
        .find(|ancestor| ancestor.is_dir())
        .unwrap_or(root)
        .to_path_buf()
}

/// Paths waiting for the next rebuild plus its wakeup
#[derive(Default)]
struct Pending {
    paths: Mutex<BTreeSet<PathBuf>>,
    ready: Notify,
}

async fn dispatch(
    root: PathBuf,
    matcher: GlobSet,
    mut events: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    pending: Arc<Pending>,
) {
    while let Some(paths) = events.recv().await {
        let matched: Vec<PathBuf> = paths
            .into_iter()
            .map(|path| match path.strip_prefix(&root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => path,
            })
            .filter(|path| path.is_relative() && matcher.is_match(path_to_slash(path)))
            .collect();

        if matched.is_empty() {
            continue;
        }

        let mut queued = pending.paths.lock();
        if !queued.is_empty() {
            debug!("coalescing {} change(s) into the pending rebuild", matched.len());
        }
        queued.extend(matched);
        drop(queued);

        pending.ready.notify_one();
    }
}

async fn work<H: RebuildHandler>(task: String, mut handler: H, pending: Arc<Pending>) {
    loop {
        pending.ready.notified().await;

        let changed: Vec<PathBuf> = std::mem::take(&mut *pending.paths.lock())
            .into_iter()
            .collect();
        if changed.is_empty() {
            continue;
        }

        for path in &changed {
            eprintln!(
                "  {} File changed: {}",
                "↻".yellow(),
                path.display().to_string().dimmed()
            );
        }

        let start = Instant::now();
        match handler.rebuild(&changed).await {
            Ok(()) => info!("'{}' rebuilt in {}", task, format_duration(start.elapsed())),
            Err(e) => error!("'{}' failed: {:#}", task, e),
        }
    }
}

/// A running watch loop
pub struct WatchHandle {
    task: String,
    trigger_tx: mpsc::UnboundedSender<Vec<PathBuf>>,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
    dispatcher: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl WatchHandle {
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Feed paths to the loop as if the watcher had reported them.
    /// Absolute paths under the root and root-relative paths are accepted.
    pub fn trigger<P: Into<PathBuf>>(&self, paths: impl IntoIterator<Item = P>) {
        let _ = self
            .trigger_tx
            .send(paths.into_iter().map(Into::into).collect());
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop observing and end the loop. A rebuild in progress is cancelled.
    pub fn stop(&mut self) {
        if self.debouncer.take().is_some() {
            debug!("stopped watching for '{}'", self.task);
        }
        self.dispatcher.abort();
        self.worker.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
