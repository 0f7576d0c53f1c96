//! Command-line interface for Assetflow
//!
//! `assetflow [--production] [TASK]...` runs the named tasks (or `default`)
//! as one combined plan. When a watch or serve task was started the process
//! stays up until Ctrl+C.

use std::collections::HashSet;
use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::mode::{resolve_mode, ModeFlags};
use crate::tasks::{builtin_registry, TaskContext, TaskOutcome, TaskRegistry};
use crate::utils::format_duration;

/// Assetflow - named build tasks for stylesheets, scripts and vendor assets
#[derive(Parser, Debug)]
#[command(name = "assetflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tasks to run
    #[arg(value_name = "TASK", default_value = "default")]
    pub tasks: Vec<String>,

    #[command(flatten)]
    pub mode: ModeFlags,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to assetflow.toml config file
    #[arg(short, long, global = true, default_value = "assetflow.toml")]
    pub config: String,

    /// Print the task tree and exit
    #[arg(long = "tasks")]
    pub list_tasks: bool,
}

impl Cli {
    /// Parse `args`, setting aside options that are not defined instead of
    /// failing on them. Returns the parsed CLI and the ignored options.
    pub fn parse_lenient<I, T>(args: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let command = Self::command();
        let longs: HashSet<String> = command
            .get_arguments()
            .filter_map(|arg| arg.get_long().map(str::to_string))
            .chain(["help".to_string(), "version".to_string()])
            .collect();
        let shorts: HashSet<char> = command
            .get_arguments()
            .filter_map(|arg| arg.get_short())
            .chain(['h', 'V'])
            .collect();

        let mut kept = Vec::new();
        let mut ignored = Vec::new();
        let mut options_done = false;

        for (i, arg) in args.into_iter().map(Into::into).enumerate() {
            let text = arg.to_string_lossy().into_owned();

            let known = if i == 0 || options_done || !text.starts_with('-') || text == "-" {
                true
            } else if text == "--" {
                options_done = true;
                true
            } else if let Some(long) = text.strip_prefix("--") {
                longs.contains(long.split('=').next().unwrap_or_default())
            } else {
                text.chars().nth(1).is_some_and(|c| shorts.contains(&c))
            };

            if known {
                kept.push(arg);
            } else {
                ignored.push(text);
            }
        }

        (Self::parse_from(kept), ignored)
    }

    /// Execute the requested tasks
    pub async fn execute(&self) -> Result<ExitCode> {
        let registry = builtin_registry();

        if self.list_tasks {
            print_tasks(&registry);
            return Ok(ExitCode::SUCCESS);
        }

        print_banner();

        registry.plan(&self.tasks)?;

        let mode = resolve_mode(&self.mode);
        info!("Loading configuration from {}", self.config);
        let config = Config::load(&self.config)?;

        eprintln!("{} Running {} in {} mode\n", "→".blue(), self.tasks.join(", ").cyan(), mode.to_string().bold());

        let start = Instant::now();
        let ctx = TaskContext::new(mode, Arc::new(config));
        let report = registry.run_all(&self.tasks, &ctx).await?;

        if ctx.session.is_long_running() {
            for addr in ctx.session.server_addrs() {
                eprintln!("  {} Dev server on {}", "•".dimmed(), format!("http://{}", addr).cyan());
            }
            for task in ctx.session.watched_tasks() {
                eprintln!("  {} Watching for '{}'", "•".dimmed(), task);
            }
            ctx.session.wait_for_shutdown().await?;
            return Ok(ExitCode::SUCCESS);
        }

        let failures = report.failures();
        if failures.is_empty() {
            eprintln!(
                "\n{} Done in {}\n",
                "✓".green().bold(),
                format_duration(start.elapsed())
            );
            return Ok(ExitCode::SUCCESS);
        }

        let skipped = report
            .outcomes()
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Skipped))
            .count();
        eprintln!(
            "\n{} {} task(s) failed, {} skipped",
            "✗".red().bold(),
            failures.len(),
            skipped
        );
        for (task, message) in failures {
            eprintln!("  {} {}: {}", "•".dimmed(), task.cyan(), message);
        }
        eprintln!();

        Ok(ExitCode::FAILURE)
    }
}

/// Print every task with its prerequisites as a tree
fn print_tasks(registry: &TaskRegistry) {
    println!("Tasks");

    let tasks: Vec<_> = registry.tasks().collect();
    for (i, task) in tasks.iter().enumerate() {
        let last = i + 1 == tasks.len();
        let (branch, rail) = if last { ("└─", "  ") } else { ("├─", "│ ") };
        let fork = if task.prerequisites().is_empty() { "─" } else { "┬" };
        let name = if task.is_group() { task.name().cyan().bold() } else { task.name().cyan() };

        println!(
            "{}{} {}  {}",
            branch,
            fork,
            name,
            task.description().unwrap_or_default().dimmed()
        );

        for (j, prerequisite) in task.prerequisites().iter().enumerate() {
            let corner = if j + 1 == task.prerequisites().len() { "└──" } else { "├──" };
            println!("{}{} {}", rail, corner, prerequisite);
        }
    }
}

/// Print the Assetflow banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "Assetflow".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["assetflow"]);
        assert_eq!(cli.tasks, vec!["default".to_string()]);
        assert_eq!(resolve_mode(&cli.mode), Mode::Development);
        assert_eq!(cli.config, "assetflow.toml");
        assert!(!cli.list_tasks);
    }

    #[test]
    fn test_tasks_and_production_flag() {
        let cli = Cli::parse_from(["assetflow", "build", "--production", "-c", "site/assetflow.toml"]);
        assert_eq!(cli.tasks, vec!["build".to_string()]);
        assert_eq!(resolve_mode(&cli.mode), Mode::Production);
        assert_eq!(cli.config, "site/assetflow.toml");
    }

    #[test]
    fn test_list_flag_does_not_eat_task_names() {
        let cli = Cli::parse_from(["assetflow", "--tasks"]);
        assert!(cli.list_tasks);
        assert_eq!(cli.tasks, vec!["default".to_string()]);
    }

    #[test]
    fn test_unknown_flags_are_set_aside() {
        let (cli, ignored) = Cli::parse_lenient([
            "assetflow",
            "--minify",
            "build",
            "--prod=1",
            "-x",
            "--production",
            "-v",
        ]);

        assert_eq!(cli.tasks, vec!["build".to_string()]);
        assert_eq!(resolve_mode(&cli.mode), Mode::Production);
        assert!(cli.verbose);
        assert_eq!(ignored, vec!["--minify", "--prod=1", "-x"]);
    }

    #[test]
    fn test_arguments_after_double_dash_are_kept() {
        let (cli, ignored) = Cli::parse_lenient(["assetflow", "--", "styles"]);
        assert_eq!(cli.tasks, vec!["styles".to_string()]);
        assert!(ignored.is_empty());
    }
}
