//! Assetflow library
//!
//! Named build tasks for stylesheets, scripts and vendor assets, with a
//! watch loop and a live reload dev server.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod lint;
pub mod mode;
pub mod pipeline;
pub mod resolver;
pub mod server;
pub mod tasks;
pub mod transform;
pub mod utils;
pub mod vendor;
pub mod watch;

pub use cli::Cli;
pub use config::Config;
pub use mode::{resolve_mode, Mode};
pub use tasks::{builtin_registry, TaskContext, TaskRegistry};
