//! Task registry
//!
//! Tasks are registered once with an ordered list of prerequisites and an
//! optional body. Running a set of tasks first resolves the complete plan,
//! so unknown names and cycles are reported before any body runs. The plan
//! is then executed level by level: every task in a level has all of its
//! prerequisites in earlier levels, and the tasks within a level run
//! concurrently. Each task runs at most once per call.

mod builtin;
mod session;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use colored::Colorize;
use futures_util::future::join_all;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::TaskError;
use crate::mode::Mode;
use crate::utils::format_duration;

pub use builtin::builtin_registry;
pub use session::Session;

/// Everything a task body can see
#[derive(Clone)]
pub struct TaskContext {
    pub mode: Mode,
    pub config: Arc<Config>,
    pub session: Arc<Session>,
}

impl TaskContext {
    pub fn new(mode: Mode, config: Arc<Config>) -> Self {
        Self {
            mode,
            config,
            session: Arc::new(Session::new()),
        }
    }
}

/// A task body
#[async_trait]
pub trait TaskAction: Send + Sync {
    async fn execute(&self, ctx: &TaskContext) -> anyhow::Result<()>;
}

/// Task body backed by an async closure
pub struct FnAction<F>(F);

/// Wrap an async closure as a [`TaskAction`]
pub fn action_fn<F, Fut>(f: F) -> FnAction<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnAction(f)
}

#[async_trait]
impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn execute(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        (self.0)(ctx.clone()).await
    }
}

/// A registered task
pub struct Task {
    name: String,
    prerequisites: Vec<String>,
    action: Option<Arc<dyn TaskAction>>,
    description: Option<String>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether the task only groups its prerequisites
    pub fn is_group(&self) -> bool {
        self.action.is_none()
    }

    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }
}

/// Result of one task in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
    /// Not run because a prerequisite failed or was skipped
    Skipped,
}

/// Outcomes of a run, in execution order
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    outcomes: Vec<(String, TaskOutcome)>,
}

impl RunReport {
    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|(name, _)| name == task).map(|(_, o)| o)
    }

    pub fn outcomes(&self) -> &[(String, TaskOutcome)] {
        &self.outcomes
    }

    /// Names of tasks whose body ran, in order
    pub fn executed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, TaskOutcome::Skipped))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(name, o)| match o {
                TaskOutcome::Failed(message) => Some((name.as_str(), message.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, o)| matches!(o, TaskOutcome::Succeeded))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Resolving,
    Done,
}

/// Named tasks and their prerequisites
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    run_after: HashMap<String, Vec<String>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task with a body. Registering an existing name replaces it.
    pub fn register<A: TaskAction + 'static>(
        &mut self,
        name: &str,
        prerequisites: &[&str],
        action: A,
    ) -> &mut Task {
        self.insert(name, prerequisites, Some(Arc::new(action)))
    }

    /// Register a task that only runs its prerequisites
    pub fn group(&mut self, name: &str, prerequisites: &[&str]) -> &mut Task {
        self.insert(name, prerequisites, None)
    }

    fn insert(
        &mut self,
        name: &str,
        prerequisites: &[&str],
        action: Option<Arc<dyn TaskAction>>,
    ) -> &mut Task {
        let task = Task {
            name: name.to_string(),
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
            action,
            description: None,
        };

        let slot = match self.index.get(name) {
            Some(&i) => {
                self.tasks[i] = task;
                i
            }
            None => {
                self.tasks.push(task);
                self.index.insert(name.to_string(), self.tasks.len() - 1);
                self.tasks.len() - 1
            }
        };

        &mut self.tasks[slot]
    }

    /// Order `task` after `others` whenever both are part of the same run,
    /// without making them prerequisites
    pub fn must_run_after(&mut self, task: &str, others: &[&str]) {
        self.run_after
            .entry(task.to_string())
            .or_default()
            .extend(others.iter().map(|o| o.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tasks in registration order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Resolve `names` and their prerequisites into execution levels
    pub fn plan<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Vec<String>>, TaskError> {
        let mut states: HashMap<String, VisitState> = HashMap::new();
        let mut stack: Vec<String> = Vec::new();
        let mut order: Vec<String> = Vec::new();

        for name in names {
            self.visit(name.as_ref(), &mut states, &mut stack, &mut order)?;
        }

        self.levels(order)
    }

    fn visit(
        &self,
        name: &str,
        states: &mut HashMap<String, VisitState>,
        stack: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), TaskError> {
        match states.get(name) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::Resolving) => {
                let start = stack.iter().position(|s| s == name).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(name.to_string());
                return Err(TaskError::CyclicDependency(cycle));
            }
            None => {}
        }

        let task = self
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;

        states.insert(name.to_string(), VisitState::Resolving);
        stack.push(name.to_string());

        for prerequisite in &task.prerequisites {
            self.visit(prerequisite, states, stack, order)?;
        }

        stack.pop();
        states.insert(name.to_string(), VisitState::Done);
        order.push(name.to_string());

        Ok(())
    }

    /// Group a dependency-ordered task list into levels, honouring both
    /// prerequisites and `must_run_after` edges between planned tasks
    fn levels(&self, order: Vec<String>) -> Result<Vec<Vec<String>>, TaskError> {
        let planned: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut level: HashMap<&str, usize> = HashMap::new();
        let mut remaining: Vec<&str> = order.iter().map(String::as_str).collect();

        while !remaining.is_empty() {
            let before = remaining.len();

            remaining.retain(|&name| {
                let mut max = None;
                for dep in self.edges(name).filter(|d| planned.contains(d)) {
                    match level.get(dep) {
                        Some(&l) => max = Some(max.map_or(l, |m: usize| m.max(l))),
                        None => return true,
                    }
                }
                level.insert(name, max.map_or(0, |m| m + 1));
                false
            });

            if remaining.len() == before {
                let mut cycle: Vec<String> = remaining.iter().map(|s| s.to_string()).collect();
                if let Some(first) = cycle.first().cloned() {
                    cycle.push(first);
                }
                return Err(TaskError::CyclicDependency(cycle));
            }
        }

        let depth = level.values().max().map_or(0, |m| m + 1);
        let mut levels = vec![Vec::new(); depth];
        for name in &order {
            levels[level[name.as_str()]].push(name.clone());
        }

        Ok(levels)
    }

    /// Prerequisites followed by soft ordering constraints
    fn edges<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let hard = self.get(name).map(|t| t.prerequisites.as_slice()).unwrap_or(&[]);
        let soft = self.run_after.get(name).map(Vec::as_slice).unwrap_or(&[]);
        hard.iter().chain(soft.iter()).map(String::as_str)
    }

    /// Run one task and its prerequisites
    pub async fn run(&self, name: &str, ctx: &TaskContext) -> Result<RunReport, TaskError> {
        self.run_all(&[name], ctx).await
    }

    /// Run several tasks as one combined plan
    pub async fn run_all<S: AsRef<str>>(
        &self,
        names: &[S],
        ctx: &TaskContext,
    ) -> Result<RunReport, TaskError> {
        let levels = self.plan(names)?;
        debug!("plan: {:?}", levels);

        let mut report = RunReport::default();
        let mut blocked: HashSet<String> = HashSet::new();

        for level in levels {
            let mut runnable = Vec::new();

            for name in level {
                let task = &self.tasks[self.index[&name]];
                if task.prerequisites.iter().any(|p| blocked.contains(p)) {
                    eprintln!("{} Skipping '{}'", "-".dimmed(), name.yellow());
                    blocked.insert(name.clone());
                    report.outcomes.push((name, TaskOutcome::Skipped));
                } else {
                    runnable.push(task);
                }
            }

            let results = join_all(runnable.into_iter().map(|task| async move {
                eprintln!("{} Starting '{}'...", "→".blue(), task.name.cyan());
                let start = Instant::now();
                let result = match &task.action {
                    Some(action) => action.execute(ctx).await,
                    None => Ok(()),
                };
                (task, result, start.elapsed())
            }))
            .await;

            for (task, result, elapsed) in results {
                match result {
                    Ok(()) => {
                        eprintln!(
                            "{} Finished '{}' after {}",
                            "✓".green(),
                            task.name.cyan(),
                            format_duration(elapsed).magenta()
                        );
                        report.outcomes.push((task.name.clone(), TaskOutcome::Succeeded));
                    }
                    Err(e) => {
                        error!("'{}' errored after {}: {:#}", task.name, format_duration(elapsed), e);
                        blocked.insert(task.name.clone());
                        report
                            .outcomes
                            .push((task.name.clone(), TaskOutcome::Failed(format!("{:#}", e))));
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, name: &'static str) -> impl TaskAction {
        let log = log.clone();
        action_fn(move |_ctx| {
            let log = log.clone();
            async move {
                log.lock().push(name.to_string());
                Ok::<(), anyhow::Error>(())
            }
        })
    }

    fn failing(log: &Log, name: &'static str) -> impl TaskAction {
        let log = log.clone();
        action_fn(move |_ctx| {
            let log = log.clone();
            async move {
                log.lock().push(name.to_string());
                Err::<(), _>(anyhow::anyhow!("{} broke", name))
            }
        })
    }

    fn ctx() -> TaskContext {
        TaskContext::new(Mode::Development, Arc::new(Config::default()))
    }

    fn position(log: &[String], name: &str) -> usize {
        log.iter().position(|n| n == name).unwrap()
    }

    #[tokio::test]
    async fn test_prerequisites_run_once_in_order() {
        let log = Log::default();
        let mut registry = TaskRegistry::new();
        registry.register("clean", &[], recording(&log, "clean"));
        registry.register("styles", &["clean"], recording(&log, "styles"));
        registry.register("scripts", &["clean"], recording(&log, "scripts"));
        registry.register("build", &["styles", "scripts", "clean"], recording(&log, "build"));

        let report = registry.run("build", &ctx()).await.unwrap();
        let log = log.lock().clone();

        assert_eq!(log.len(), 4);
        assert_eq!(log.iter().filter(|n| *n == "clean").count(), 1);
        assert!(position(&log, "clean") < position(&log, "styles"));
        assert!(position(&log, "clean") < position(&log, "scripts"));
        assert_eq!(log.last().unwrap(), "build");
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_memoization_is_per_run() {
        let log = Log::default();
        let mut registry = TaskRegistry::new();
        registry.register("styles", &[], recording(&log, "styles"));

        registry.run("styles", &ctx()).await.unwrap();
        registry.run("styles", &ctx()).await.unwrap();

        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_runs_nothing() {
        let log = Log::default();
        let mut registry = TaskRegistry::new();
        registry.register("a", &["b"], recording(&log, "a"));
        registry.register("b", &["c"], recording(&log, "b"));
        registry.register("c", &["a"], recording(&log, "c"));
        registry.register("ok", &[], recording(&log, "ok"));

        let err = registry.run_all(&["ok", "a"], &ctx()).await.unwrap_err();

        assert_eq!(
            err,
            TaskError::CyclicDependency(vec!["a".into(), "b".into(), "c".into(), "a".into()])
        );
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let mut registry = TaskRegistry::new();
        registry.group("default", &["styles"]);

        assert_eq!(
            registry.run("nope", &ctx()).await.unwrap_err(),
            TaskError::UnknownTask("nope".to_string())
        );
        assert_eq!(
            registry.run("default", &ctx()).await.unwrap_err(),
            TaskError::UnknownTask("styles".to_string())
        );
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        let log = Log::default();
        let mut registry = TaskRegistry::new();
        registry.register("styles", &[], failing(&log, "styles"));
        registry.register("minify", &["styles"], recording(&log, "minify"));
        registry.register("scripts", &[], recording(&log, "scripts"));
        registry.group("build", &["minify", "scripts"]);

        let report = registry.run("build", &ctx()).await.unwrap();

        assert_eq!(report.outcome("styles"), Some(&TaskOutcome::Failed("styles broke".to_string())));
        assert_eq!(report.outcome("minify"), Some(&TaskOutcome::Skipped));
        assert_eq!(report.outcome("build"), Some(&TaskOutcome::Skipped));
        assert_eq!(report.outcome("scripts"), Some(&TaskOutcome::Succeeded));
        assert_eq!(report.failures(), vec![("styles", "styles broke")]);
        assert!(!log.lock().contains(&"minify".to_string()));
    }

    #[tokio::test]
    async fn test_must_run_after_orders_without_requiring() {
        let log = Log::default();
        let mut registry = TaskRegistry::new();
        registry.register("clean", &[], recording(&log, "clean"));
        registry.register("styles", &[], recording(&log, "styles"));
        registry.must_run_after("styles", &["clean"]);
        registry.group("build", &["styles", "clean"]);

        let levels = registry.plan(&["build"]).unwrap();
        assert_eq!(
            levels,
            vec![vec!["clean".to_string()], vec!["styles".to_string()], vec!["build".to_string()]]
        );

        registry.run("styles", &ctx()).await.unwrap();
        assert_eq!(*log.lock(), vec!["styles".to_string()]);
    }

    #[test]
    fn test_independent_tasks_share_a_level() {
        let log = Log::default();
        let mut registry = TaskRegistry::new();
        registry.register("styles", &[], recording(&log, "styles"));
        registry.register("scripts", &[], recording(&log, "scripts"));
        registry.group("default", &["styles", "scripts"]);

        assert_eq!(
            registry.plan(&["default"]).unwrap(),
            vec![
                vec!["styles".to_string(), "scripts".to_string()],
                vec!["default".to_string()]
            ]
        );
    }

    #[test]
    fn test_soft_cycle_is_reported() {
        let log = Log::default();
        let mut registry = TaskRegistry::new();
        registry.register("a", &["b"], recording(&log, "a"));
        registry.register("b", &[], recording(&log, "b"));
        registry.must_run_after("b", &["a"]);

        assert!(matches!(
            registry.plan(&["a"]),
            Err(TaskError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_reregistering_replaces() {
        let log = Log::default();
        let mut registry = TaskRegistry::new();
        registry.register("styles", &["clean"], recording(&log, "styles"));
        registry
            .register("styles", &[], recording(&log, "styles"))
            .describe("Compile stylesheets");

        assert_eq!(registry.tasks().count(), 1);
        let task = registry.get("styles").unwrap();
        assert!(task.prerequisites().is_empty());
        assert_eq!(task.description(), Some("Compile stylesheets"));
    }
}
