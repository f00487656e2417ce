//! # Sandboxed Process Handles
//!
//! The process contract every backend returns: pid, piped stdio, a kill
//! switch, and timeout-bounded output collection. Backends differ only in
//! how they compose the command line; spawning and supervision are shared
//! here.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};

/// Cap on captured bytes per stream.
const MAX_CAPTURED_OUTPUT: usize = 4 * 1024 * 1024;

/// Exit code reported when the timeout killed the child.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// A running agent process inside a sandbox.
pub struct SandboxProcess {
    pub pid: Option<u32>,
    pub backend: &'static str,
    child: Child,
}

impl SandboxProcess {
    /// Take the child's stdin pipe (present exactly once).
    pub fn stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Hard-kill the child. Tolerates an already-exited process.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "kill on exited child ignored");
        }
    }

    /// Wait for exit while collecting stdout/stderr, enforcing the
    /// timeout with a hard kill.
    ///
    /// `grace` extends the deadline for backends whose teardown takes a
    /// moment after the kill signal (container runtimes).
    pub async fn collect_output(mut self, timeout: Duration, grace: Duration) -> Result<SandboxOutput> {
        let start = Instant::now();

        let stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Io(std::io::Error::other("stdout pipe missing")))?;
        let stderr = self
            .child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Io(std::io::Error::other("stderr pipe missing")))?;

        let stdout_task = tokio::spawn(read_capped(BufReader::new(stdout)));
        let stderr_task = tokio::spawn(read_capped(BufReader::new(stderr)));

        let mut timed_out = false;
        let exit = match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(backend = self.backend, "sandbox timeout, killing child");
                timed_out = true;
                self.kill();
                match tokio::time::timeout(grace, self.child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        // The child ignored SIGKILL long enough to outlive
                        // the grace window; report the synthetic status.
                        warn!(backend = self.backend, "child survived kill grace window");
                        return Ok(SandboxOutput {
                            exit_code: TIMEOUT_EXIT_CODE,
                            stdout: collect_task(stdout_task).await,
                            stderr: collect_task(stderr_task).await,
                            duration: start.elapsed(),
                            timed_out: true,
                        });
                    }
                }
            }
        };

        let exit_code = if timed_out {
            TIMEOUT_EXIT_CODE
        } else {
            exit.code().unwrap_or(-1)
        };

        Ok(SandboxOutput {
            exit_code,
            stdout: collect_task(stdout_task).await,
            stderr: collect_task(stderr_task).await,
            duration: start.elapsed(),
            timed_out,
        })
    }
}

async fn collect_task(task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>) -> String {
    match task.await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}

/// Collected result of one sandboxed run.
#[derive(Debug)]
pub struct SandboxOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl SandboxOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Spawn the composed command with the sandbox stdio/env policy: piped
/// stdio, cleared environment plus `PATH`, `HOME`, and the config's
/// explicit variables, killed on drop.
pub fn spawn_composed(
    backend: &'static str,
    program_and_args: Vec<String>,
    config: &SandboxConfig,
) -> Result<SandboxProcess> {
    let (program, args) = program_and_args
        .split_first()
        .ok_or_else(|| SandboxError::InvalidCommand("empty command".into()))?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    if config.workspace.is_dir() {
        cmd.current_dir(&config.workspace);
    }
    cmd.env_clear();
    cmd.env("PATH", std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into()));
    cmd.env("HOME", &config.workspace);
    for (key, value) in &config.env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(SandboxError::Spawn)?;
    let pid = child.id();
    debug!(backend, pid, "sandbox child spawned");
    Ok(SandboxProcess {
        pid,
        backend,
        child,
    })
}

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(8 * 1024);
    let mut tmp = [0u8; 8192];
    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        if buf.len() < MAX_CAPTURED_OUTPUT {
            let take = n.min(MAX_CAPTURED_OUTPUT - buf.len());
            buf.extend_from_slice(&tmp[..take]);
        }
        // Keep draining past the cap so the child never blocks on a full
        // pipe.
    }
    Ok(buf)
}
