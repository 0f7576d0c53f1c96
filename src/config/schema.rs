//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Project-wide paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub output: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

/// Stylesheet pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Sass entry point
    #[serde(default = "default_styles_entry")]
    pub entry: String,

    /// Patterns that trigger a stylesheet rebuild
    #[serde(default = "default_styles_watch")]
    pub watch: Vec<String>,

    /// Output file name inside the output directory
    #[serde(default = "default_styles_output")]
    pub output: String,

    /// Browserslist queries used for vendor prefixing
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: default_styles_entry(),
            watch: default_styles_watch(),
            output: default_styles_output(),
            browsers: default_browsers(),
        }
    }
}

fn default_styles_entry() -> String {
    "sass/index.scss".to_string()
}

fn default_styles_watch() -> Vec<String> {
    vec!["sass/**/*.scss".to_string()]
}

fn default_styles_output() -> String {
    "bundle.css".to_string()
}

fn default_browsers() -> Vec<String> {
    vec!["last 2 versions".to_string()]
}

/// Script pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Entry module
    #[serde(default = "default_scripts_entry")]
    pub entry: String,

    /// Script sources, used for linting and watching
    #[serde(default = "default_scripts_sources")]
    pub sources: Vec<String>,

    /// Output bundle file name
    #[serde(default = "default_scripts_output")]
    pub output: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            entry: default_scripts_entry(),
            sources: default_scripts_sources(),
            output: default_scripts_output(),
        }
    }
}

fn default_scripts_entry() -> String {
    "js/index.js".to_string()
}

fn default_scripts_sources() -> Vec<String> {
    vec!["js/**/*.js".to_string()]
}

fn default_scripts_output() -> String {
    "bundle.js".to_string()
}

/// Third-party asset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    /// Explicit manifest; when empty the bower main files are used
    #[serde(default)]
    pub files: Vec<String>,

    /// Directory holding installed bower components
    #[serde(default = "default_components_dir")]
    pub components_dir: String,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            components_dir: default_components_dir(),
        }
    }
}

fn default_components_dir() -> String {
    "bower_components".to_string()
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to run the dev server on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served as the site root
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Files whose changes are pushed to connected browsers
    #[serde(default = "default_server_watch")]
    pub watch: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_dir: default_base_dir(),
            watch: default_server_watch(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_base_dir() -> String {
    ".".to_string()
}

fn default_server_watch() -> Vec<String> {
    vec![
        "dist/*.css".to_string(),
        "dist/*.js".to_string(),
        "index.html".to_string(),
    ]
}

/// File watching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    100
}
