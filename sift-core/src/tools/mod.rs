//! External analyzer adapters.
//!
//! [`ToolAvailability`] is probed once at startup and handed to the engine as
//! an immutable value. [`ExternalTool`] turns one configured tool into a
//! [`ProcessRunner`] call plus an [`OutputParser`] pass.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::{OutputStream, ToolConfig, ToolsSection};
use crate::error::ToolError;
use crate::parse::{CheckerParser, LintParser, OutputParser};
use crate::process::{ProcessOutcome, ProcessRunner};
use crate::types::{Issue, sanitize_standard};

pub const CLANG_TIDY: &str = "clang-tidy";
pub const CPPCHECK: &str = "cppcheck";

/// Placeholder in tool flags replaced with the request's standard profile.
const STD_PLACEHOLDER: &str = "{std}";

// ── Availability ──────────────────────────────────────────────────────

/// Which configured tools can be run on this host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolAvailability {
    resolved: BTreeMap<String, Option<PathBuf>>,
}

impl ToolAvailability {
    /// Check every configured tool: enabled, and its path either exists or
    /// resolves on `PATH`.
    pub fn probe(tools: &ToolsSection) -> Self {
        let resolved = tools
            .iter()
            .map(|(name, config)| {
                let path = if config.enabled {
                    resolve_executable(&config.path)
                } else {
                    None
                };
                match &path {
                    Some(p) => info!(tool = name, path = %p.display(), "Tool available"),
                    None if config.enabled => {
                        info!(tool = name, configured = %config.path, "Tool not found");
                    }
                    None => debug!(tool = name, "Tool disabled"),
                }
                (name.to_string(), path)
            })
            .collect();
        Self { resolved }
    }

    /// Treat every enabled tool as available at its configured path.
    pub fn assume_enabled(tools: &ToolsSection) -> Self {
        let resolved = tools
            .iter()
            .map(|(name, config)| {
                let path = config.enabled.then(|| PathBuf::from(&config.path));
                (name.to_string(), path)
            })
            .collect();
        Self { resolved }
    }

    /// No tool is available.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_available(&self, tool: &str) -> bool {
        self.resolved.get(tool).is_some_and(Option::is_some)
    }

    /// Resolved executable for `tool`, if available.
    pub fn path(&self, tool: &str) -> Option<&Path> {
        self.resolved.get(tool).and_then(Option::as_deref)
    }

    /// `(tool, resolved path)` for every probed tool.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Path>)> {
        self.resolved
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_deref()))
    }
}

/// Resolve a configured tool path. Anything containing a separator is
/// checked as-is; bare names are searched on `PATH`.
fn resolve_executable(configured: &str) -> Option<PathBuf> {
    if configured.is_empty() {
        return None;
    }
    let candidate = Path::new(configured);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(configured))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

// ── Adapter ───────────────────────────────────────────────────────────

/// One external analyzer bound to its parser.
#[derive(Debug)]
pub struct ExternalTool {
    name: &'static str,
    config: ToolConfig,
    parser: Box<dyn OutputParser>,
}

impl ExternalTool {
    /// Adapter for a known tool name, or `None` if no parser handles it.
    pub fn new(name: &str, config: ToolConfig) -> Option<Self> {
        let parser: Box<dyn OutputParser> = match name {
            CLANG_TIDY => Box::new(LintParser),
            CPPCHECK => Box::new(CheckerParser),
            _ => return None,
        };
        Some(Self {
            name: parser.tool(),
            config,
            parser,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// `<flags...> <source>` with `{std}` substituted.
    pub fn args(&self, standard: &str, source: &Path) -> Vec<String> {
        let standard = sanitize_standard(standard);
        self.config
            .flags
            .iter()
            .map(|flag| flag.replace(STD_PLACEHOLDER, standard))
            .chain(std::iter::once(source.display().to_string()))
            .collect()
    }

    /// Run the tool against `source` and parse what it printed.
    ///
    /// Exit codes 0 and 1 are successful runs. Reported file paths that point
    /// at the workspace source file are rewritten to `logical_name`.
    #[instrument(skip_all, name = "external_tool", fields(tool = self.name))]
    pub async fn run(
        &self,
        runner: &dyn ProcessRunner,
        command: &str,
        source: &Path,
        standard: &str,
        logical_name: &str,
    ) -> Result<Vec<Issue>, ToolError> {
        let cwd = source.parent().unwrap_or_else(|| Path::new("."));
        let args = self.args(standard, source);
        debug!(command, ?args, "Invoking tool");

        let output = match runner.run(command, &args, cwd, self.timeout()).await {
            ProcessOutcome::Ran(output) => output,
            ProcessOutcome::NotAvailable { .. } => {
                return Err(ToolError::Unavailable {
                    tool: self.name.to_string(),
                });
            }
            ProcessOutcome::SpawnFailed { message, .. } => {
                return Err(ToolError::Spawn {
                    tool: self.name.to_string(),
                    message,
                });
            }
        };

        if output.timed_out {
            return Err(ToolError::Timeout {
                tool: self.name.to_string(),
                timeout_ms: self.config.timeout_ms,
            });
        }
        if !matches!(output.exit_code, 0 | 1) {
            warn!(exit_code = output.exit_code, stderr = %truncate(&output.stderr, 512), "Tool failed");
            return Err(ToolError::Exit {
                tool: self.name.to_string(),
                code: output.exit_code,
            });
        }

        let raw = match self.config.stream {
            OutputStream::Stdout => output.stdout,
            OutputStream::Stderr => output.stderr,
            OutputStream::Both => {
                let mut both = output.stdout;
                if !both.is_empty() && !both.ends_with('\n') {
                    both.push('\n');
                }
                both.push_str(&output.stderr);
                both
            }
        };

        let mut issues = self.parser.parse(&raw);
        for issue in &mut issues {
            if refers_to_source(&issue.file, source) {
                issue.file = logical_name.to_string();
            }
        }
        info!(issues = issues.len(), "Tool finished");
        Ok(issues)
    }
}

fn refers_to_source(reported: &str, source: &Path) -> bool {
    let reported = Path::new(reported);
    reported == source
        || (reported.is_relative()
            && reported.components().count() == 1
            && reported.file_name() == source.file_name())
        || source.ends_with(reported) && !reported.as_os_str().is_empty()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::process::ProcessOutput;
    use crate::types::Severity;

    /// Replays one canned outcome and records the invocation.
    #[derive(Debug)]
    struct Canned {
        outcome: ProcessOutcome,
        calls: Mutex<Vec<(String, Vec<String>, PathBuf)>>,
    }

    impl Canned {
        fn new(outcome: ProcessOutcome) -> Self {
            Self {
                outcome,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn ran(exit_code: i32, stdout: &str, stderr: &str) -> Self {
            Self::new(ProcessOutcome::Ran(ProcessOutput {
                exit_code,
                stdout: stdout.into(),
                stderr: stderr.into(),
                timed_out: false,
            }))
        }
    }

    #[async_trait::async_trait]
    impl ProcessRunner for Canned {
        async fn run(
            &self,
            command: &str,
            args: &[String],
            cwd: &Path,
            _timeout: Duration,
        ) -> ProcessOutcome {
            self.calls
                .lock()
                .unwrap()
                .push((command.into(), args.to_vec(), cwd.to_path_buf()));
            self.outcome.clone()
        }
    }

    fn tidy() -> ExternalTool {
        ExternalTool::new(CLANG_TIDY, ToolConfig::clang_tidy()).unwrap()
    }

    fn checker() -> ExternalTool {
        ExternalTool::new(CPPCHECK, ToolConfig::cppcheck()).unwrap()
    }

    const SOURCE: &str = "/scratch/sift-1/source.cpp";

    #[test]
    fn args_substitute_standard_and_append_source() {
        let args = checker().args("c++17", Path::new(SOURCE));
        assert!(args.contains(&"--std=c++17".to_string()));
        assert_eq!(args.last().map(String::as_str), Some(SOURCE));
    }

    #[test]
    fn invalid_standard_falls_back_to_default() {
        let args = tidy().args("c++17; rm -rf /", Path::new(SOURCE));
        assert!(args.contains(&"--extra-arg=-std=c++20".to_string()));
    }

    #[test]
    fn unknown_tool_has_no_adapter() {
        assert!(ExternalTool::new("pvs-studio", ToolConfig::cppcheck()).is_none());
    }

    #[tokio::test]
    async fn exit_one_is_parsed_and_paths_rewritten() {
        let runner = Canned::ran(
            1,
            "/scratch/sift-1/source.cpp:3:5: warning: use nullptr [modernize-use-nullptr]\n",
            "/usr/include/stdio.h:10:1: note: declared here [clang-diagnostic-note]\n",
        );
        let issues = tidy()
            .run(&runner, "clang-tidy", Path::new(SOURCE), "c++20", "main.cpp")
            .await
            .unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].file, "main.cpp");
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[1].file, "/usr/include/stdio.h");

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "clang-tidy");
        assert_eq!(calls[0].2, Path::new("/scratch/sift-1"));
    }

    #[tokio::test]
    async fn configured_stream_is_the_one_parsed() {
        let line = "source.cpp:2:1: error: Null pointer dereference";
        let on_stdout = Canned::ran(0, line, "");
        let issues = checker()
            .run(&on_stdout, "cppcheck", Path::new(SOURCE), "c++20", "source.cpp")
            .await
            .unwrap();
        assert!(issues.is_empty());

        let on_stderr = Canned::ran(0, "", line);
        let issues = checker()
            .run(&on_stderr, "cppcheck", Path::new(SOURCE), "c++20", "source.cpp")
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file, "source.cpp");
    }

    #[tokio::test]
    async fn other_exit_codes_are_errors() {
        let runner = Canned::ran(2, "a.cpp:1:1: warning: x [y]", "");
        let err = tidy()
            .run(&runner, "clang-tidy", Path::new(SOURCE), "c++20", "source.cpp")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Exit { code: 2, .. }));
    }

    #[tokio::test]
    async fn timeout_and_absence_map_to_tool_errors() {
        let timed_out = Canned::new(ProcessOutcome::Ran(ProcessOutput {
            exit_code: crate::process::TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        }));
        let err = tidy()
            .run(&timed_out, "clang-tidy", Path::new(SOURCE), "c++20", "source.cpp")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_ms: 30_000, .. }));

        let missing = Canned::new(ProcessOutcome::NotAvailable {
            command: "clang-tidy".into(),
        });
        let err = tidy()
            .run(&missing, "clang-tidy", Path::new(SOURCE), "c++20", "source.cpp")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable { .. }));
    }

    #[test]
    fn probe_respects_enabled_flag_and_missing_paths() {
        let mut tools = ToolsSection::default();
        tools.clang_tidy.enabled = false;
        tools.cppcheck.path = "/definitely/not/here/cppcheck".into();
        let availability = ToolAvailability::probe(&tools);
        assert!(!availability.is_available(CLANG_TIDY));
        assert!(!availability.is_available(CPPCHECK));
        assert_eq!(availability.iter().count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn probe_finds_executable_by_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-cppcheck");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let not_exec = dir.path().join("plain-file");
        std::fs::write(&not_exec, "").unwrap();

        let mut tools = ToolsSection::default();
        tools.cppcheck.path = script.display().to_string();
        tools.clang_tidy.path = not_exec.display().to_string();
        let availability = ToolAvailability::probe(&tools);
        assert!(availability.is_available(CPPCHECK));
        assert_eq!(availability.path(CPPCHECK), Some(script.as_path()));
        assert!(!availability.is_available(CLANG_TIDY));
    }

    #[test]
    fn assume_enabled_skips_disabled_tools() {
        let mut tools = ToolsSection::default();
        tools.cppcheck.enabled = false;
        let availability = ToolAvailability::assume_enabled(&tools);
        assert!(availability.is_available(CLANG_TIDY));
        assert!(!availability.is_available(CPPCHECK));
        assert!(!ToolAvailability::none().is_available(CLANG_TIDY));
    }

    #[test]
    fn refers_to_source_matches_absolute_and_bare_names() {
        let source = Path::new(SOURCE);
        assert!(refers_to_source(SOURCE, source));
        assert!(refers_to_source("source.cpp", source));
        assert!(refers_to_source("sift-1/source.cpp", source));
        assert!(!refers_to_source("/usr/include/source.cpp", source));
        assert!(!refers_to_source("", source));
    }
}
