//! Assetflow - named build tasks for stylesheets, scripts and vendor assets
//!
//! # Tasks
//! - `styles`: Sass to CSS with vendor prefixes
//! - `scripts`: lint and bundle ES modules into one file
//! - `vendor`: third-party scripts, stylesheets, fonts and images
//! - `serve`: static dev server with live reload
//! - `default` and `build`: the development loop and the full build

use std::process::ExitCode;

use assetflow_lib::Cli;
use colored::Colorize;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("assetflow=debug,assetflow_lib=debug,tower_http=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("assetflow=info,assetflow_lib=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let (cli, ignored) = Cli::parse_lenient(std::env::args_os());

    init_tracing(cli.verbose);

    for option in ignored {
        warn!("Ignoring unknown option '{}'", option);
    }

    match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
