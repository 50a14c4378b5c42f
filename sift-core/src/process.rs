//! External process invocation with a hard wall-clock timeout.
//!
//! [`ProcessRunner::run`] never fails: a missing binary, a nonzero exit, and
//! a timeout are all reported through [`ProcessOutcome`]. On unix the child
//! is placed in its own process group and the whole group is killed when the
//! call ends, so helpers spawned by a tool cannot outlive it.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Exit code reported when the process was killed for exceeding its budget.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// How long to keep draining pipes after the process group is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured result of a process that was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `128 + signal` when killed by a signal, or
    /// [`TIMEOUT_EXIT_CODE`] on timeout.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process started; it may have failed, succeeded, or timed out.
    Ran(ProcessOutput),
    /// The binary does not exist.
    NotAvailable { command: String },
    /// The binary exists but could not be started.
    SpawnFailed { command: String, message: String },
}

/// Process execution seam. The engine only ever talks to this trait.
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync + std::fmt::Debug {
    /// Run `command args...` in `cwd`, killing it after `timeout`.
    async fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> ProcessOutcome;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    max_output_bytes: usize,
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl TokioProcessRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> ProcessOutcome {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(command, "Binary not found");
                return ProcessOutcome::NotAvailable {
                    command: command.to_string(),
                };
            }
            Err(e) => {
                warn!(command, error = %e, "Failed to spawn process");
                return ProcessOutcome::SpawnFailed {
                    command: command.to_string(),
                    message: e.to_string(),
                };
            }
        };

        let group = ProcessGroupGuard(child.id());
        let stdout = tokio::spawn(read_bounded(child.stdout.take(), self.max_output_bytes));
        let stderr = tokio::spawn(read_bounded(child.stderr.take(), self.max_output_bytes));

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (exit_code_of(status), false),
            Ok(Err(e)) => {
                warn!(command, error = %e, "Failed to wait for process");
                (TIMEOUT_EXIT_CODE, false)
            }
            Err(_) => {
                warn!(command, ?timeout, "Process timed out, killing");
                group.kill();
                if let Err(e) = child.start_kill() {
                    debug!(command, error = %e, "Child already exited");
                }
                let _ = child.wait().await;
                (TIMEOUT_EXIT_CODE, true)
            }
        };

        // Reap anything the tool left running in its group before draining.
        drop(group);

        let stdout = join_reader(stdout).await;
        let stderr = join_reader(stderr).await;

        debug!(command, exit_code, timed_out, "Process finished");
        ProcessOutcome::Ran(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(TIMEOUT_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(TIMEOUT_EXIT_CODE)
}

/// Read up to `limit` bytes, then keep draining so the writer never blocks.
async fn read_bounded<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}

async fn join_reader(handle: tokio::task::JoinHandle<String>) -> String {
    let abort = handle.abort_handle();
    match tokio::time::timeout(DRAIN_GRACE, handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(error = %e, "Output reader failed");
            String::new()
        }
        Err(_) => {
            // A descendant escaped the group and still holds the pipe.
            abort.abort();
            String::new()
        }
    }
}

/// Kills the child's process group when dropped.
#[derive(Debug)]
struct ProcessGroupGuard(Option<u32>);

impl ProcessGroupGuard {
    fn kill(&self) {
        if let Some(pgid) = self.0 {
            kill_process_group(pgid);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    if pgid <= 1 {
        return;
    }
    // SAFETY: killpg takes plain integers and touches no memory; a group
    // that no longer exists yields ESRCH, which is ignored.
    let _ = unsafe { libc::killpg(pgid, libc::SIGKILL) };
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    async fn run_sh(script: &str, timeout: Duration) -> ProcessOutcome {
        let tmp = tempfile::tempdir().unwrap();
        TokioProcessRunner::default()
            .run("sh", &sh(script), tmp.path(), timeout)
            .await
    }

    fn ran(outcome: ProcessOutcome) -> ProcessOutput {
        match outcome {
            ProcessOutcome::Ran(output) => output,
            other => panic!("expected Ran, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let out = ran(run_sh("echo out; echo err >&2; exit 1", Duration::from_secs(10)).await);
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let out = ran(run_sh("exit 42", Duration::from_secs(10)).await);
        assert_eq!(out.exit_code, 42);
    }

    #[tokio::test]
    async fn runs_in_given_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();
        let out = ran(TokioProcessRunner::default()
            .run("sh", &sh("cat marker.txt"), tmp.path(), Duration::from_secs(10))
            .await);
        assert_eq!(out.stdout, "here");
    }

    #[tokio::test]
    async fn timeout_kills_and_reports_sentinel() {
        let start = Instant::now();
        let out = ran(run_sh("echo started; sleep 30", Duration::from_millis(300)).await);
        assert!(out.timed_out);
        assert_eq!(out.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(out.stdout, "started\n");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_grandchildren() {
        let out = ran(run_sh("sleep 30 & echo $!; wait", Duration::from_millis(300)).await);
        assert!(out.timed_out);
        let pid: u32 = out.stdout.trim().parse().unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
        // Gone, or a zombie waiting for a reaper.
        assert!(stat.is_empty() || stat.contains(") Z "), "still alive: {stat}");
    }

    #[tokio::test]
    async fn missing_binary_is_not_available() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = TokioProcessRunner::default()
            .run(
                "/definitely/not/a/real/tool",
                &[],
                tmp.path(),
                Duration::from_secs(1),
            )
            .await;
        assert!(matches!(outcome, ProcessOutcome::NotAvailable { .. }));
    }

    #[tokio::test]
    async fn output_is_bounded() {
        let tmp = tempfile::tempdir().unwrap();
        let out = ran(TokioProcessRunner::new(1000)
            .run(
                "sh",
                &sh("head -c 100000 /dev/zero | tr '\\0' 'a'"),
                tmp.path(),
                Duration::from_secs(10),
            )
            .await);
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.len(), 1000);
    }
}
