//! Command Executor
//!
//! Runs kubectl and helm as child processes under a hard wall-clock deadline.
//! A nonzero exit is a normal [`CommandResult`]; only failures to run the
//! process at all are errors.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::credentials::CredentialArtifact;
use crate::metrics::COMMAND_DURATION_SECONDS;

/// Exit code reported for a command that was killed at its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long a killed process gets to be reaped before we stop waiting.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Binary {
    Kubectl,
    Helm,
}

impl Binary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Binary::Kubectl => "kubectl",
            Binary::Helm => "helm",
        }
    }
}

impl std::fmt::Display for Binary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deadline class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Read,
    Write,
    /// Helm install and upgrade.
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub read: Duration,
    pub write: Duration,
    pub release: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(60),
            write: Duration::from_secs(60),
            release: Duration::from_secs(120),
        }
    }
}

impl Deadlines {
    pub fn for_class(&self, class: OperationClass) -> Duration {
        match class {
            OperationClass::Read => self.read,
            OperationClass::Write => self.write,
            OperationClass::Release => self.release,
        }
    }
}

/// A fully built command line. Never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub binary: Binary,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(binary: Binary, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            binary,
            args,
            stdin: None,
            timeout,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{binary} executable not found at '{}'", .path.display())]
    BinaryNotFound { binary: Binary, path: PathBuf },
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: Binary,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while running {binary}: {source}")]
    Io {
        binary: Binary,
        #[source]
        source: std::io::Error,
    },
    #[error("{binary} did not finish within {}s", .timeout.as_secs())]
    Timeout { binary: Binary, timeout: Duration },
    #[error("{binary} exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        binary: Binary,
        exit_code: i32,
        stderr: String,
    },
    #[error("Failed to materialize credentials: {0}")]
    Materialize(String),
}

/// Runs a command spec, optionally against a materialized kubeconfig.
///
/// The artifact is moved in so that it is erased as soon as the run ends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        spec: CommandSpec,
        artifact: Option<CredentialArtifact>,
    ) -> Result<CommandResult, ExecutionError>;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    kubectl: PathBuf,
    helm: PathBuf,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new("kubectl", "helm")
    }
}

impl ProcessRunner {
    pub fn new(kubectl: impl Into<PathBuf>, helm: impl Into<PathBuf>) -> Self {
        Self {
            kubectl: kubectl.into(),
            helm: helm.into(),
        }
    }

    pub fn program(&self, binary: Binary) -> &Path {
        match binary {
            Binary::Kubectl => &self.kubectl,
            Binary::Helm => &self.helm,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        spec: CommandSpec,
        artifact: Option<CredentialArtifact>,
    ) -> Result<CommandResult, ExecutionError> {
        let binary = spec.binary;
        let program = self.program(binary);

        let mut command = Command::new(program);
        if let Some(artifact) = &artifact {
            command.arg("--kubeconfig").arg(artifact.path());
        }
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so descendants can be killed with the child
        #[cfg(unix)]
        command.process_group(0);

        debug!(
            binary = %binary,
            args = ?spec.args,
            stdin = spec.stdin.is_some(),
            timeout_secs = spec.timeout.as_secs_f64(),
            "Executing command"
        );

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ExecutionError::BinaryNotFound {
                binary,
                path: program.to_path_buf(),
            },
            _ => ExecutionError::Spawn { binary, source },
        })?;

        let mut group = ProcessGroup::new(child.id());

        if let (Some(input), Some(mut stdin)) = (spec.stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(error = %e, "Child closed stdin before all input was written");
                }
            });
        }

        let stdout = child.stdout.take().map(OutputReader::spawn);
        let stderr = child.stderr.take().map(OutputReader::spawn);

        let (exit_code, timed_out) = match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|source| ExecutionError::Io { binary, source })?;
                // Leftover descendants would hold the output pipes open
                group.kill();
                (status.code().unwrap_or(-1), false)
            }
            Err(_) => {
                warn!(
                    binary = %binary,
                    timeout_secs = spec.timeout.as_secs_f64(),
                    "Command exceeded its deadline, killing it"
                );
                group.kill();
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Kill failed, process already gone");
                }
                if tokio::time::timeout(KILL_GRACE_PERIOD, child.wait()).await.is_err() {
                    warn!(binary = %binary, "Killed process was not reaped within the grace period");
                }
                (TIMEOUT_EXIT_CODE, true)
            }
        };

        let (stdout, stderr) = tokio::join!(
            collect(stdout, KILL_GRACE_PERIOD),
            collect(stderr, KILL_GRACE_PERIOD)
        );
        let duration = started.elapsed();

        COMMAND_DURATION_SECONDS
            .with_label_values(&[binary.as_str()])
            .observe(duration.as_secs_f64());
        debug!(
            binary = %binary,
            exit_code,
            timed_out,
            duration_ms = duration.as_millis() as u64,
            "Command finished"
        );

        drop(artifact);

        Ok(CommandResult {
            exit_code,
            stdout,
            stderr,
            duration,
            timed_out,
        })
    }
}

/// Process group led by a spawned child. Killed at most once; dropping it
/// kills whatever is left.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid.take() else {
            return;
        };
        let Ok(raw) = i32::try_from(pgid) else {
            return;
        };
        match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid, error = %e, "Failed to kill process group"),
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Drains a child pipe into a buffer that stays readable if the reader has
/// to be abandoned.
struct OutputReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl OutputReader {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(reader: R) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(drain(reader, buffer.clone()));
        Self { buffer, handle }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, buffer: Arc<Mutex<Vec<u8>>>) -> std::io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.lock().await.extend_from_slice(&chunk[..n]);
    }
}

// A process outside the group can keep the pipe open; whatever was read by
// then is kept.
async fn collect(reader: Option<OutputReader>, wait: Duration) -> Vec<u8> {
    let Some(OutputReader { buffer, mut handle }) = reader else {
        return Vec::new();
    };

    match tokio::time::timeout(wait, &mut handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => debug!(error = %e, "Failed to read command output"),
        Ok(Err(e)) => debug!(error = %e, "Output reader task failed"),
        Err(_) => {
            handle.abort();
            warn!("Output pipe still open after the grace period, keeping partial output");
        }
    }

    let mut buffer = buffer.lock().await;
    std::mem::take(&mut *buffer)
}
