//! Analysis orchestration.
//!
//! One [`Engine`] serves many requests. It holds only read-only state: the
//! configuration, the probed [`ToolAvailability`], and the module registry.
//! Each request walks `Created → WorkspaceReady → Running → Aggregating →
//! Completed`, or ends in `Aborted` when the source text is unusable or the
//! workspace cannot be prepared. Workspace teardown runs on every path,
//! including cancellation, because the session is an RAII guard.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::aggregate;
use crate::config::{RulesSection, SiftConfig};
use crate::error::{SiftError, ToolError};
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::rules::{self, RuleCheck, RuleOutput};
use crate::tools::{CLANG_TIDY, CPPCHECK, ExternalTool, ToolAvailability};
use crate::types::{AnalysisOptions, AnalysisReport, AnalysisRequest, Category};
use crate::workspace::WorkspaceManager;

// ── Analyzer seam ─────────────────────────────────────────────────────

/// Everything a module may read while analyzing one request.
#[derive(Debug)]
pub struct AnalysisContext<'a> {
    pub source_text: &'a str,
    /// Materialized copy of `source_text` inside the request workspace.
    pub source_path: &'a Path,
    /// Name reported in issue `file` fields.
    pub logical_name: &'a str,
    pub options: &'a AnalysisOptions,
    pub rules: &'a RulesSection,
    pub runner: &'a dyn ProcessRunner,
}

/// Common interface for every analyzer module.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Stable module name, unique within an engine.
    fn name(&self) -> &'static str;

    /// Analyze one request. Errors mean "no output from this module".
    async fn analyze(&self, ctx: &AnalysisContext<'_>) -> crate::error::Result<RuleOutput>;
}

/// An external tool run through the process runner.
#[derive(Debug)]
struct ToolModule {
    tool: ExternalTool,
    command: PathBuf,
}

#[async_trait::async_trait]
impl Analyzer for ToolModule {
    fn name(&self) -> &'static str {
        self.tool.name()
    }

    async fn analyze(&self, ctx: &AnalysisContext<'_>) -> crate::error::Result<RuleOutput> {
        let command = self.command.to_string_lossy();
        let issues = self
            .tool
            .run(
                ctx.runner,
                &command,
                ctx.source_path,
                ctx.options.sanitized_standard(),
                ctx.logical_name,
            )
            .await?;
        Ok(RuleOutput {
            issues,
            ..RuleOutput::default()
        })
    }
}

/// A pure in-process rule check.
#[derive(Debug)]
struct RuleModule(&'static RuleCheck);

#[async_trait::async_trait]
impl Analyzer for RuleModule {
    fn name(&self) -> &'static str {
        self.0.name
    }

    async fn analyze(&self, ctx: &AnalysisContext<'_>) -> crate::error::Result<RuleOutput> {
        let mut output = self.0.run(ctx.source_text, ctx.rules)?;
        output.label_file(ctx.logical_name);
        Ok(output)
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────

/// Per-request orchestration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    WorkspaceReady,
    Running,
    Aggregating,
    Completed,
    Aborted,
}

impl EngineState {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::WorkspaceReady | Self::Aborted)
                | (Self::WorkspaceReady, Self::Running)
                | (Self::Running, Self::Aggregating)
                | (Self::Aggregating, Self::Completed)
        )
    }
}

#[derive(Debug)]
struct Lifecycle {
    session: String,
    state: EngineState,
}

impl Lifecycle {
    fn new(session: String) -> Self {
        Self {
            session,
            state: EngineState::Created,
        }
    }

    fn advance(&mut self, next: EngineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        debug!(session = %self.session, from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }
}

// ── Engine ────────────────────────────────────────────────────────────

/// The analysis service. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Engine {
    config: SiftConfig,
    workspace: WorkspaceManager,
    runner: Arc<dyn ProcessRunner>,
    /// `(category, module)` in registration order.
    modules: Vec<(Category, Arc<dyn Analyzer>)>,
}

impl Engine {
    /// Build an engine from configuration, a probed availability value, and
    /// the process runner external tools go through.
    pub fn new(
        config: SiftConfig,
        availability: &ToolAvailability,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let mut modules: Vec<(Category, Arc<dyn Analyzer>)> = Vec::new();

        for (name, tool_config) in config.tools.iter() {
            let category = match name {
                CPPCHECK => Category::Syntax,
                CLANG_TIDY => Category::StaticLint,
                _ => continue,
            };
            let Some(command) = availability.path(name) else {
                info!(tool = name, "Tool unavailable; its category will rely on rule checks only");
                continue;
            };
            if let Some(tool) = ExternalTool::new(name, tool_config.clone()) {
                modules.push((
                    category,
                    Arc::new(ToolModule {
                        tool,
                        command: command.to_path_buf(),
                    }),
                ));
            }
        }

        for check in rules::CHECKS {
            let module: Arc<dyn Analyzer> = Arc::new(RuleModule(check));
            for &category in check.categories {
                modules.push((category, Arc::clone(&module)));
            }
        }

        Self {
            workspace: WorkspaceManager::from_config(&config.engine),
            config,
            runner,
            modules,
        }
    }

    /// Probe tools on this host and run them with [`TokioProcessRunner`].
    pub fn from_config(config: SiftConfig) -> Self {
        let availability = ToolAvailability::probe(&config.tools);
        let runner = Arc::new(TokioProcessRunner::new(config.engine.max_output_bytes));
        Self::new(config, &availability, runner)
    }

    /// Register an additional module under `category`.
    #[must_use]
    pub fn with_analyzer(mut self, category: Category, analyzer: Arc<dyn Analyzer>) -> Self {
        self.modules.push((category, analyzer));
        self
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    /// Modules scheduled for `categories`: category order, then registration
    /// order, each module once.
    fn plan<'a>(&'a self, categories: impl IntoIterator<Item = &'a Category>) -> Vec<&'a dyn Analyzer> {
        let mut plan: Vec<&dyn Analyzer> = Vec::new();
        for category in categories {
            for (registered, module) in &self.modules {
                if registered == category && !plan.iter().any(|m| m.name() == module.name()) {
                    plan.push(module.as_ref());
                }
            }
        }
        plan
    }

    /// Names of the modules a request for `categories` would run.
    pub fn planned_modules(&self, categories: &[Category]) -> Vec<&'static str> {
        let mut sorted = categories.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        self.plan(&sorted).iter().map(|m| m.name()).collect()
    }

    /// Analyze one request. Never fails: fatal conditions come back as a
    /// report with `success=false`.
    #[instrument(skip_all, name = "analyze", fields(categories = request.categories.len()))]
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisReport {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.engine.request_timeout_ms);
        let session_id = WorkspaceManager::new_session_id();
        let mut lifecycle = Lifecycle::new(session_id.clone());

        if let Err(message) = self.check_source(&request.source_text) {
            lifecycle.advance(EngineState::Aborted);
            info!(reason = %message, "Rejected request");
            return AnalysisReport::failed(message, elapsed_ms(started));
        }

        let mut session = match self.workspace.create(&session_id) {
            Ok(session) => session,
            Err(e) => {
                lifecycle.advance(EngineState::Aborted);
                warn!(error = %e, "Workspace setup failed");
                return AnalysisReport::failed(
                    format!("Workspace setup failed: {e}"),
                    elapsed_ms(started),
                );
            }
        };
        if let Err(e) = session.write_source(&request.source_text) {
            lifecycle.advance(EngineState::Aborted);
            warn!(error = %e, "Could not materialize source");
            return AnalysisReport::failed(
                format!("Workspace setup failed: {e}"),
                elapsed_ms(started),
            );
        }
        lifecycle.advance(EngineState::WorkspaceReady);

        let plan = self.plan(&request.categories);
        info!(
            session = %session_id,
            modules = plan.len(),
            concurrent = self.config.engine.concurrent,
            "Running analysis"
        );
        lifecycle.advance(EngineState::Running);

        let ctx = AnalysisContext {
            source_text: &request.source_text,
            source_path: session.source_file_path(),
            logical_name: &self.config.engine.source_file_name,
            options: &request.options,
            rules: &self.config.rules,
            runner: self.runner.as_ref(),
        };
        let outputs = self.run_modules(&plan, &ctx, deadline).await;

        lifecycle.advance(EngineState::Aggregating);
        let report = aggregate::merge(outputs, &request.options, elapsed_ms(started));

        session.destroy();
        lifecycle.advance(EngineState::Completed);
        info!(
            session = %session_id,
            issues = report.issues.len(),
            errors = report.error_count,
            warnings = report.warning_count,
            elapsed_ms = report.analysis_time_ms,
            "Analysis complete"
        );
        report
    }

    /// Like [`Engine::analyze`], but gives up as soon as `cancel` resolves.
    /// The workspace is still removed; partial results are discarded.
    pub async fn analyze_until<F>(
        &self,
        request: &AnalysisRequest,
        cancel: F,
    ) -> crate::error::Result<AnalysisReport>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::select! {
            report = self.analyze(request) => Ok(report),
            () = cancel => {
                info!("Analysis cancelled");
                Err(SiftError::Cancelled)
            }
        }
    }

    fn check_source(&self, source: &str) -> Result<(), String> {
        if source.trim().is_empty() {
            return Err("Source text is empty".to_string());
        }
        let max = self.config.engine.max_source_chars;
        if source.chars().count() > max {
            return Err(format!("Source text exceeds {max} characters"));
        }
        Ok(())
    }

    /// Run `plan` until done or `deadline`. Outputs come back in plan order;
    /// failed and unfinished modules contribute nothing.
    async fn run_modules(
        &self,
        plan: &[&dyn Analyzer],
        ctx: &AnalysisContext<'_>,
        deadline: tokio::time::Instant,
    ) -> Vec<RuleOutput> {
        let mut slots: Vec<Option<RuleOutput>> = vec![None; plan.len()];

        if self.config.engine.concurrent {
            let mut pending: FuturesUnordered<_> = plan
                .iter()
                .enumerate()
                .map(|(index, module)| async move { (index, run_module(*module, ctx).await) })
                .collect();
            loop {
                match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(Some((index, output))) => slots[index] = output,
                    Ok(None) => break,
                    Err(_) => {
                        warn!(unfinished = pending.len(), "Request deadline reached; returning partial report");
                        break;
                    }
                }
            }
        } else {
            for (index, module) in plan.iter().enumerate() {
                match tokio::time::timeout_at(deadline, run_module(*module, ctx)).await {
                    Ok(output) => slots[index] = output,
                    Err(_) => {
                        warn!(
                            unfinished = plan.len() - index,
                            "Request deadline reached; returning partial report"
                        );
                        break;
                    }
                }
            }
        }

        slots.into_iter().flatten().collect()
    }
}

/// Run one module, absorbing its errors and panics.
async fn run_module(module: &dyn Analyzer, ctx: &AnalysisContext<'_>) -> Option<RuleOutput> {
    let started = Instant::now();
    let name = module.name();
    match AssertUnwindSafe(module.analyze(ctx)).catch_unwind().await {
        Ok(Ok(output)) => {
            debug!(
                module = name,
                issues = output.issues.len(),
                elapsed_ms = elapsed_ms(started),
                "Module finished"
            );
            Some(output)
        }
        Ok(Err(SiftError::Tool(ToolError::Unavailable { .. }))) => {
            info!(module = name, "Tool unavailable; skipping");
            None
        }
        Ok(Err(e)) => {
            warn!(module = name, error = %e, "Module produced no output");
            None
        }
        Err(_) => {
            warn!(module = name, "Module panicked; no output");
            None
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::process::{ProcessOutcome, ProcessOutput};
    use crate::types::{Issue, Severity};

    /// Answers every tool invocation with the same canned output.
    #[derive(Debug, Default)]
    struct QuietRunner {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ProcessRunner for QuietRunner {
        async fn run(
            &self,
            _command: &str,
            _args: &[String],
            _cwd: &Path,
            _timeout: Duration,
        ) -> ProcessOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ProcessOutcome::Ran(ProcessOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            })
        }
    }

    #[derive(Debug)]
    struct Panicky;

    #[async_trait::async_trait]
    impl Analyzer for Panicky {
        fn name(&self) -> &'static str {
            "panicky"
        }

        async fn analyze(&self, _ctx: &AnalysisContext<'_>) -> crate::error::Result<RuleOutput> {
            panic!("module bug");
        }
    }

    /// Reports one issue after sleeping.
    #[derive(Debug)]
    struct Slow(Duration);

    #[async_trait::async_trait]
    impl Analyzer for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn analyze(&self, ctx: &AnalysisContext<'_>) -> crate::error::Result<RuleOutput> {
            tokio::time::sleep(self.0).await;
            Ok(RuleOutput {
                issues: vec![Issue {
                    file: ctx.logical_name.to_string(),
                    line: 1,
                    column: 1,
                    severity: Severity::Error,
                    message: "slow".into(),
                    rule: "slow".into(),
                    source_tool: "slow".into(),
                    category: Category::Custom,
                }],
                ..RuleOutput::default()
            })
        }
    }

    fn config_in(root: &Path) -> SiftConfig {
        let mut config = SiftConfig::default();
        config.engine.scratch_root = root.to_path_buf();
        config
    }

    fn engine(root: &Path, runner: Arc<dyn ProcessRunner>) -> Engine {
        let config = config_in(root);
        let availability = ToolAvailability::assume_enabled(&config.tools);
        Engine::new(config, &availability, runner)
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).map_or(0, Iterator::count)
    }

    #[test]
    fn state_transitions() {
        use EngineState::{Aborted, Aggregating, Completed, Created, Running, WorkspaceReady};
        assert!(Created.can_advance_to(WorkspaceReady));
        assert!(Created.can_advance_to(Aborted));
        assert!(Running.can_advance_to(Aggregating));
        assert!(!Created.can_advance_to(Running));
        assert!(!Completed.can_advance_to(Created));
        assert!(!Aborted.can_advance_to(WorkspaceReady));
    }

    #[test]
    fn plan_is_deduplicated_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(QuietRunner::default()));
        let plan = engine.planned_modules(&[Category::Custom, Category::Style, Category::Syntax]);
        assert_eq!(
            plan,
            vec![
                "cppcheck",
                "anti-patterns",
                "naming-convention",
                "cyclomatic-complexity",
            ]
        );
        assert!(engine.planned_modules(&[Category::Unsupported]).is_empty());
        assert!(engine.planned_modules(&[]).is_empty());
    }

    #[test]
    fn unavailable_tools_are_not_planned() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(
            config_in(dir.path()),
            &ToolAvailability::none(),
            Arc::new(QuietRunner::default()),
        );
        assert!(engine
            .planned_modules(&[Category::Syntax, Category::StaticLint])
            .is_empty());
    }

    #[tokio::test]
    async fn minimal_program_with_lint_categories_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(QuietRunner::default());
        let engine = engine(dir.path(), runner.clone());
        let request = AnalysisRequest::new(
            "#include <iostream>\nint main() {\n    std::cout << \"hi\";\n    return 0;\n}\n",
            [Category::Syntax, Category::StaticLint],
        );
        let report = engine.analyze(&request).await;
        assert!(report.success);
        assert_eq!(report.error_count, 0);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn empty_source_aborts_without_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(QuietRunner::default());
        let engine = engine(dir.path(), runner.clone());
        for text in ["", "   \n\t  "] {
            let report = engine.analyze(&AnalysisRequest::full(text)).await;
            assert!(!report.success);
            assert!(report.error_message.as_deref().is_some_and(|m| !m.is_empty()));
            assert!(report.issues.is_empty());
        }
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn oversized_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.engine.max_source_chars = 10;
        let engine = Engine::new(config, &ToolAvailability::none(), Arc::new(QuietRunner::default()));
        let report = engine
            .analyze(&AnalysisRequest::full("int main() { return 0; }"))
            .await;
        assert!(!report.success);
        assert!(report.error_message.unwrap().contains("10 characters"));
    }

    #[tokio::test]
    async fn panicking_module_only_loses_its_own_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(
            config_in(dir.path()),
            &ToolAvailability::none(),
            Arc::new(QuietRunner::default()),
        )
        .with_analyzer(Category::Security, Arc::new(Panicky));
        let report = engine
            .analyze(&AnalysisRequest::new(
                "void f(char* d, const char* s) { strcpy(d, s); }",
                [Category::Security],
            ))
            .await;
        assert!(report.success);
        assert_eq!(report.issues_with_rule("security-buffer-overflow").count(), 1);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_returns_partial_report_and_cleans_up() {
        for concurrent in [true, false] {
            let dir = tempfile::tempdir().unwrap();
            let mut config = config_in(dir.path());
            config.engine.request_timeout_ms = 200;
            config.engine.concurrent = concurrent;
            let engine = Engine::new(config, &ToolAvailability::none(), Arc::new(QuietRunner::default()))
                .with_analyzer(Category::Custom, Arc::new(Slow(Duration::from_secs(30))));

            let started = tokio::time::Instant::now();
            let report = engine
                .analyze(&AnalysisRequest::new(
                    "class widget {};\nint main() { return 0; }\n",
                    [Category::Custom],
                ))
                .await;
            let waited = started.elapsed();
            assert!(waited >= Duration::from_millis(200), "{waited:?}");
            assert!(waited < Duration::from_secs(30), "{waited:?}");
            assert!(report.success);
            assert!(report.issues_with_rule("slow").next().is_none());
            assert_eq!(report.issues_with_rule("naming-convention").count(), 1);
            assert_eq!(entries(dir.path()), 0, "concurrent={concurrent}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_discards_results_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(
            config_in(dir.path()),
            &ToolAvailability::none(),
            Arc::new(QuietRunner::default()),
        )
        .with_analyzer(Category::Custom, Arc::new(Slow(Duration::from_secs(30))));

        let result = engine
            .analyze_until(
                &AnalysisRequest::new("int main() { return 0; }", [Category::Custom]),
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await;
        assert!(matches!(result, Err(SiftError::Cancelled)));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn rule_issues_carry_logical_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.engine.source_file_name = "main.cpp".into();
        let engine = Engine::new(config, &ToolAvailability::none(), Arc::new(QuietRunner::default()));
        let report = engine
            .analyze(&AnalysisRequest::new("gets(buf);", [Category::Security]))
            .await;
        assert!(!report.issues.is_empty());
        assert!(report.issues.iter().all(|i| i.file == "main.cpp"));
        assert!(report.security_findings.iter().all(|f| f.issue.file == "main.cpp"));
    }
}
