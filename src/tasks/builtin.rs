//! Built-in task catalogue
//!
//! | task            | does                                              |
//! |-----------------|---------------------------------------------------|
//! | `clean`         | empty the output directory (production only)      |
//! | `styles`        | compile, prefix and write the stylesheet          |
//! | `styles:watch`  | rerun `styles` when Sass sources change           |
//! | `scripts`       | lint, bundle and write the script bundle          |
//! | `scripts:watch` | bundle now and rebundle incrementally on change   |
//! | `scripts:lint`  | lint script sources                               |
//! | `vendor`        | extract third-party scripts, styles, fonts, images|
//! | `serve`         | dev server with live reload                       |
//! | `default`       | styles + styles:watch + scripts:watch + serve     |
//! | `build`         | clean + styles + scripts + vendor                 |

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{error, info};

use super::{action_fn, TaskContext, TaskRegistry};
use crate::bundler::ScriptsPipeline;
use crate::lint::{lint_sources, report, BasicLinter};
use crate::pipeline::clean::clean;
use crate::pipeline::styles::StylesPipeline;
use crate::pipeline::FileRecord;
use crate::server::{ChangeNotifier, DevServer, NotifyHandler};
use crate::vendor::VendorPipeline;
use crate::watch::{RebuildHandler, WatchBinding, WatchController};

/// Registry with every built-in task and the legacy aliases
pub fn builtin_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();

    registry
        .register("clean", &[], action_fn(|ctx| async move { run_clean(&ctx) }))
        .describe("Empty the output directory (production only)");
    registry
        .register("styles", &[], action_fn(|ctx| async move { run_styles(&ctx).await }))
        .describe("Compile the Sass entry into the output stylesheet");
    registry
        .register("styles:watch", &[], action_fn(|ctx| async move { watch_styles(&ctx) }))
        .describe("Recompile stylesheets when Sass sources change");
    registry
        .register("scripts", &[], action_fn(|ctx| async move { run_scripts(&ctx).await }))
        .describe("Lint and bundle scripts");
    registry
        .register("scripts:watch", &[], action_fn(|ctx| async move { watch_scripts(&ctx).await }))
        .describe("Bundle scripts and rebundle incrementally on change");
    registry
        .register("scripts:lint", &[], action_fn(|ctx| async move { run_lint(&ctx) }))
        .describe("Report lint findings for script sources");
    registry
        .register("vendor", &[], action_fn(|ctx| async move { run_vendor(&ctx).await }))
        .describe("Extract vendor scripts, stylesheets, fonts and images");
    registry
        .register("serve", &[], action_fn(|ctx| async move { serve(&ctx).await }))
        .describe("Serve the project with live reload");

    registry
        .group("default", &["styles", "styles:watch", "scripts:watch", "serve"])
        .describe("Build, watch and serve for development");
    registry
        .group("build", &["clean", "styles", "scripts", "vendor"])
        .describe("Clean and build every asset");
    registry.must_run_after("styles", &["clean"]);
    registry.must_run_after("scripts", &["clean"]);
    registry.must_run_after("vendor", &["clean"]);

    for (alias, target) in [
        ("sass", "styles"),
        ("sass:watch", "styles:watch"),
        ("js", "scripts"),
        ("js:watch", "scripts:watch"),
        ("js:lint", "scripts:lint"),
        ("bower", "vendor"),
        ("browser-sync", "serve"),
    ] {
        registry
            .group(alias, &[target])
            .describe(format!("Alias for '{}'", target));
    }

    registry
}

fn log_written(records: &[FileRecord]) {
    for record in records {
        info!("Wrote {} ({} bytes)", record.path.display(), record.contents.len());
    }
}

fn controller(ctx: &TaskContext) -> WatchController {
    WatchController::new(&ctx.config.root, ctx.config.debounce())
}

fn run_clean(ctx: &TaskContext) -> Result<()> {
    let removed = clean(&ctx.config.output_dir(), ctx.mode)?;
    if ctx.mode.is_production() {
        info!("Removed {} entries from {}", removed, ctx.config.output_dir().display());
    }
    Ok(())
}

async fn run_styles(ctx: &TaskContext) -> Result<()> {
    let config = ctx.config.clone();
    let mode = ctx.mode;

    let written = tokio::task::spawn_blocking(move || -> Result<Vec<FileRecord>> {
        Ok(StylesPipeline::new(config)?.run(mode)?)
    })
    .await??;

    log_written(&written);
    Ok(())
}

struct StylesHandler {
    ctx: TaskContext,
}

#[async_trait]
impl RebuildHandler for StylesHandler {
    async fn rebuild(&mut self, _changed: &[PathBuf]) -> Result<()> {
        run_styles(&self.ctx).await
    }
}

fn watch_styles(ctx: &TaskContext) -> Result<()> {
    let binding = WatchBinding::new("styles", ctx.config.styles.watch.iter().cloned());
    let handle = controller(ctx).watch(binding, StylesHandler { ctx: ctx.clone() })?;
    ctx.session.add_watch(handle);
    Ok(())
}

/// Run the scripts pipeline on a blocking thread, handing it back afterwards
async fn bundle(mut pipeline: ScriptsPipeline) -> Result<(ScriptsPipeline, Result<Vec<FileRecord>>)> {
    let (pipeline, result) = tokio::task::spawn_blocking(move || {
        let result = pipeline.run().map_err(anyhow::Error::from);
        (pipeline, result)
    })
    .await
    .context("Bundler thread panicked")?;

    Ok((pipeline, result))
}

async fn run_scripts(ctx: &TaskContext) -> Result<()> {
    let pipeline = ScriptsPipeline::new(ctx.config.clone(), ctx.mode);
    let (_, result) = bundle(pipeline).await?;
    log_written(&result?);
    Ok(())
}

/// Keeps one scripts pipeline, and with it the warm bundler session, for the
/// lifetime of the watch loop
struct ScriptsHandler {
    pipeline: Option<ScriptsPipeline>,
}

#[async_trait]
impl RebuildHandler for ScriptsHandler {
    async fn rebuild(&mut self, _changed: &[PathBuf]) -> Result<()> {
        let pipeline = self
            .pipeline
            .take()
            .context("Bundler session was lost in an earlier rebuild")?;

        let (pipeline, result) = bundle(pipeline).await?;
        self.pipeline = Some(pipeline);

        log_written(&result?);
        Ok(())
    }
}

async fn watch_scripts(ctx: &TaskContext) -> Result<()> {
    let pipeline = ScriptsPipeline::new(ctx.config.clone(), ctx.mode);

    let (pipeline, initial) = bundle(pipeline).await?;
    match initial {
        Ok(written) => log_written(&written),
        Err(e) => error!("Initial bundle failed: {:#}", e),
    }

    let binding = WatchBinding::new("scripts", ctx.config.scripts.sources.iter().cloned());
    let handler = ScriptsHandler {
        pipeline: Some(pipeline),
    };
    let handle = controller(ctx).watch(binding, handler)?;
    ctx.session.add_watch(handle);
    Ok(())
}

fn run_lint(ctx: &TaskContext) -> Result<()> {
    let findings = lint_sources(&BasicLinter, &ctx.config.root, &ctx.config.scripts.sources)?;
    report(&findings);
    Ok(())
}

async fn run_vendor(ctx: &TaskContext) -> Result<()> {
    let written = VendorPipeline::new(ctx.config.clone()).run(ctx.mode).await?;
    log_written(&written);
    Ok(())
}

async fn serve(ctx: &TaskContext) -> Result<()> {
    let notifier = ChangeNotifier::new();
    let server = DevServer::new(ctx.config.clone(), notifier.clone());

    let (addr, handle) = server.spawn().await?;
    ctx.session.add_server(addr, handle);

    let binding = WatchBinding::new("serve", ctx.config.server.watch.iter().cloned());
    let watch = controller(ctx).watch(binding, NotifyHandler::new(notifier))?;
    ctx.session.add_watch(watch);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::mode::Mode;
    use crate::tasks::TaskOutcome;

    fn write(root: &std::path::Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "sass/index.scss", "$c: red;\na { color: $c; }\n");
        write(root, "js/index.js", "import { twice } from './math';\nconsole.log(twice(2));\n");
        write(root, "js/math.js", "export const twice = (n) => n * 2;\n");
        write(root, "lib/tiny.js", "window.tiny = true;\n");
        write(root, "lib/tiny.css", ".tiny{}\n");
        write(root, "lib/fonts/tiny.woff", "woff");
        write(root, "dist/stale.txt", "old");
        dir
    }

    fn context(dir: &tempfile::TempDir, mode: Mode) -> TaskContext {
        let mut config = Config::with_root(dir.path());
        config.vendor.files = vec![
            "lib/tiny.js".to_string(),
            "lib/tiny.css".to_string(),
            "lib/fonts/tiny.woff".to_string(),
        ];
        TaskContext::new(mode, Arc::new(config))
    }

    #[test]
    fn test_catalogue() {
        let registry = builtin_registry();
        for name in [
            "clean", "styles", "styles:watch", "scripts", "scripts:watch", "scripts:lint", "vendor",
            "serve", "default", "build", "sass", "js:watch", "bower", "browser-sync",
        ] {
            assert!(registry.contains(name), "missing task {}", name);
        }

        assert_eq!(
            registry.get("default").unwrap().prerequisites(),
            &["styles", "styles:watch", "scripts:watch", "serve"]
        );
        assert_eq!(
            registry.plan(&["build"]).unwrap(),
            vec![
                vec!["clean".to_string()],
                vec!["styles".to_string(), "scripts".to_string(), "vendor".to_string()],
                vec!["build".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_production_build() {
        let dir = project();
        let ctx = context(&dir, Mode::Production);

        let report = builtin_registry().run("build", &ctx).await.unwrap();
        assert!(report.is_success(), "{:?}", report);

        let dist = dir.path().join("dist");
        assert!(!dist.join("stale.txt").exists());
        assert_eq!(fs::read_to_string(dist.join("bundle.css")).unwrap(), "a{color:red}");
        assert!(!dist.join("bundle.css.map").exists());
        assert!(fs::read_to_string(dist.join("bundle.js")).unwrap().contains("n * 2"));
        assert!(!dist.join("bundle.js.map").exists());
        assert_eq!(fs::read_to_string(dist.join("vendor.js")).unwrap(), "window.tiny = true;\n");
        assert_eq!(fs::read_to_string(dist.join("vendor.css")).unwrap(), ".tiny{}\n");
        assert!(dist.join("fonts/tiny.woff").exists());
        assert!(!ctx.session.is_long_running());
    }

    #[tokio::test]
    async fn test_development_build_keeps_output_and_writes_maps() {
        let dir = project();
        let ctx = context(&dir, Mode::Development);

        let report = builtin_registry().run_all(&["styles", "scripts"], &ctx).await.unwrap();
        assert!(report.is_success());

        let dist = dir.path().join("dist");
        assert!(dist.join("stale.txt").exists());
        assert!(dist.join("bundle.css.map").exists());
        assert!(dist.join("bundle.js.map").exists());
    }

    #[tokio::test]
    async fn test_failed_styles_does_not_stop_scripts() {
        let dir = project();
        write(dir.path(), "sass/index.scss", "a { color: ; ");
        let ctx = context(&dir, Mode::Production);

        let report = builtin_registry().run("build", &ctx).await.unwrap();

        assert!(matches!(report.outcome("styles"), Some(TaskOutcome::Failed(_))));
        assert_eq!(report.outcome("scripts"), Some(&TaskOutcome::Succeeded));
        assert_eq!(report.outcome("vendor"), Some(&TaskOutcome::Succeeded));
        assert_eq!(report.outcome("build"), Some(&TaskOutcome::Skipped));
        assert!(dir.path().join("dist/bundle.js").exists());
    }

    #[tokio::test]
    async fn test_scripts_watch_registers_loop() {
        let dir = project();
        let ctx = context(&dir, Mode::Development);

        let report = builtin_registry().run("js:watch", &ctx).await.unwrap();

        assert!(report.is_success());
        assert!(dir.path().join("dist/bundle.js").exists());
        assert_eq!(ctx.session.watched_tasks(), vec!["scripts".to_string()]);
        ctx.session.stop();
    }
}
