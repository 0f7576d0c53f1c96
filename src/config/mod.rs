//! Configuration handling for Assetflow
//!
//! Parses and manages assetflow.toml configuration files. The file is
//! optional: every section falls back to the conventional project layout.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// Stylesheet pipeline
    #[serde(default)]
    pub styles: StylesConfig,

    /// Script pipeline
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Vendor assets
    #[serde(default)]
    pub vendor: VendorConfig,

    /// Development server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Watch settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path, falling back to defaults when
    /// the file does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        if !canonical_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                canonical_path.display()
            );
            return Ok(Self::with_root(root));
        }

        let content = fs::read_to_string(&canonical_path).with_context(|| {
            format!("Failed to read config file: {}", canonical_path.display())
        })?;

        let mut config = Self::parse(&content)?;
        config.root = root;

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse assetflow.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Default configuration rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }

        if self.watch.debounce_ms == 0 {
            anyhow::bail!("watch.debounce_ms must be greater than zero");
        }

        for (key, name) in [
            ("styles.output", &self.styles.output),
            ("scripts.output", &self.scripts.output),
        ] {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                anyhow::bail!("{} must be a bare file name, got '{}'", key, name);
            }
        }

        Ok(())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.paths.output)
    }

    /// Resolve a project-relative path
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Debounce window for watch bindings
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }
}
