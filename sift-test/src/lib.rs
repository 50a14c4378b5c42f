// Integration test utilities and fixtures for Sift.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sift_core::config::SiftConfig;
use sift_core::engine::Engine;
use sift_core::process::{ProcessOutcome, ProcessOutput, ProcessRunner};
use sift_core::tools::ToolAvailability;

/// C++ inputs with known rule-engine findings.
pub mod sources {
    /// Clean "print and return" program.
    pub const MINIMAL: &str = "\
#include <iostream>

int main() {
    std::cout << \"Hello, world\" << std::endl;
    return 0;
}
";

    /// `strcpy` on line [`STRCPY_LINE`].
    pub const STRCPY: &str = "\
#include <cstring>

int main(int argc, char** argv) {
    char buffer[16];
    strcpy(buffer, argv[1]);
    return 0;
}
";
    pub const STRCPY_LINE: u32 = 5;

    /// Four allocations, one release.
    pub const LEAKY: &str = "\
int main() {
    int* a = new int(1);
    int* b = new int(2);
    int* c = new int(3);
    int* d = new int[8];
    delete a;
    return *b + *c + d[0];
}
";

    /// A triple-nested loop and nothing else of note.
    pub const TRIPLE_LOOP: &str = "\
int main() {
    int n = 10;
    int total = 0;
    for (int i = 0; i < n; i++) {
        for (int j = 0; j < n; j++) {
            for (int k = 0; k < n; k++) {
                total += i * j * k;
            }
        }
    }
    return total;
}
";

    /// Source tagged with a unique marker comment.
    pub fn with_marker(marker: &str) -> String {
        format!("// {marker}\n{STRCPY}")
    }
}

/// A temporary scratch root for engine workspaces.
#[derive(Debug)]
pub struct Scratch {
    pub dir: tempfile::TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Default config with workspaces under this root.
    pub fn config(&self) -> SiftConfig {
        let mut config = SiftConfig::default();
        config.engine.scratch_root = self.path().to_path_buf();
        config
    }

    /// Number of entries left under the root.
    pub fn leftovers(&self) -> usize {
        std::fs::read_dir(self.path()).map_or(0, Iterator::count)
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::new()
    }
}

/// One recorded tool invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Contents of the source file (the last argument) at call time.
    pub source_seen: Option<String>,
}

/// [`ProcessRunner`] that answers from canned outputs keyed by command and
/// records every call.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outputs: HashMap<String, ProcessOutcome>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `command` with a finished run.
    #[must_use]
    pub fn with_output(mut self, command: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.outputs.insert(
            command.to_string(),
            ProcessOutcome::Ran(ProcessOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                timed_out: false,
            }),
        );
        self
    }

    /// Sleep before answering every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait::async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        _timeout: Duration,
    ) -> ProcessOutcome {
        let source_seen = args
            .last()
            .and_then(|path| std::fs::read_to_string(path).ok());
        self.calls.lock().expect("calls lock").push(Invocation {
            command: command.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            source_seen,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outputs
            .get(command)
            .cloned()
            .unwrap_or_else(|| ProcessOutcome::Ran(ProcessOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            }))
    }
}

/// Engine with every enabled tool treated as available, routed to `runner`.
pub fn engine_with_runner(config: SiftConfig, runner: Arc<dyn ProcessRunner>) -> Engine {
    let availability = ToolAvailability::assume_enabled(&config.tools);
    Engine::new(config, &availability, runner)
}

/// Engine with no external tools: rule checks only.
pub fn rules_only_engine(config: SiftConfig) -> Engine {
    Engine::new(
        config,
        &ToolAvailability::none(),
        Arc::new(ScriptedRunner::new()),
    )
}

/// Write an executable shell script named `name` into `dir`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake tool");
    path
}
