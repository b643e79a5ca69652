#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Subprocess plumbing: spawn, feed a buffered stdin, collect bounded output.

use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    process::Stdio,
    time::Duration,
};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    time::timeout,
};

/// Size of the chunks pulled off the child's pipes.
const READ_CHUNK: usize = 8 * 1024;

/// Errors raised while driving a subprocess.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The program could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        source:  std::io::Error,
    },

    /// Reading a pipe or waiting on the child failed.
    #[error("{context}: {source}")]
    Io {
        /// What we were doing when it failed.
        context: &'static str,
        /// Underlying OS error.
        source:  std::io::Error,
    },

    /// The child outlived its deadline and was killed.
    #[error("subprocess timed out after {0:?}")]
    Timeout(Duration),

    /// The child wrote more to stdout than allowed and was killed.
    #[error("subprocess wrote more than {0} bytes to stdout")]
    OutputLimit(usize),
}

/// Drop guard that terminates a spawned child process, and every process it
/// started in its group, if callers forget to await it.
struct ChildDropGuard {
    /// The direct child, `None` once disarmed.
    child: Option<Child>,
    /// Process group led by the child.
    group: Option<u32>,
}

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        let group = child.id();
        Self {
            child: Some(child),
            group,
        }
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Result<&mut Child, ProcessError> {
        self.child.as_mut().ok_or_else(|| missing_pipe("child"))
    }

    /// Sends `SIGKILL` to the child's process group. Processes the child
    /// forked keep the pipes open after it exits; this releases them.
    fn kill_group(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.group.and_then(|id| i32::try_from(id).ok()) {
            use nix::{
                sys::signal::{Signal, killpg},
                unistd::Pid,
            };

            if killpg(Pid::from_raw(pgid), Signal::SIGKILL).is_ok() {
                tracing::debug!(pgid, "killed process group");
            }
        }
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.child = None;
        self.group = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        self.kill_group();
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status:           std::process::ExitStatus,
    /// Contents written to stdout.
    pub stdout:           Vec<u8>,
    /// Contents written to stderr, cut at the output cap.
    pub stderr:           Vec<u8>,
    /// Whether stderr was cut.
    pub stderr_truncated: bool,
}

/// Describes how stdin should be wired for the spawned process.
#[derive(Debug)]
pub enum StdinSource {
    /// Attach nothing to stdin.
    Null,
    /// Write the provided bytes, then close stdin.
    Bytes(Vec<u8>),
}

/// A fully described invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// Program to execute.
    pub program:   OsString,
    /// Arguments passed to the program.
    pub args:      Vec<OsString>,
    /// Working directory, if different from ours.
    pub cwd:       Option<PathBuf>,
    /// Environment variables to set.
    pub env:       Vec<(OsString, OsString)>,
    /// Start from an empty environment instead of inheriting ours.
    pub clear_env: bool,
}

/// Limits applied while collecting a subprocess.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Wall-clock deadline for the whole run.
    pub deadline:         Option<Duration>,
    /// Maximum stdout bytes before the child is killed.
    pub max_output_bytes: usize,
}

/// Outcome of draining one pipe.
struct Drained {
    /// Bytes kept.
    bytes:    Vec<u8>,
    /// Whether more than the cap arrived.
    overflow: bool,
}

/// Reads `reader` to EOF keeping at most `cap` bytes. When `stop_on_overflow`
/// is set the read ends as soon as the cap is crossed, otherwise the excess is
/// drained and dropped so the writer never blocks.
async fn drain_capped<R>(
    mut reader: R,
    cap: usize,
    stop_on_overflow: bool,
) -> Result<Drained, std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut overflow = false;
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        let room = cap.saturating_sub(bytes.len());
        if n > room {
            bytes.extend_from_slice(&chunk[..room]);
            overflow = true;
            if stop_on_overflow {
                break;
            }
        } else {
            bytes.extend_from_slice(&chunk[..n]);
        }
    }

    Ok(Drained { bytes, overflow })
}

/// Spawns a command, feeds stdin, and collects stdout/stderr under `limits`.
///
/// The child runs as the leader of a new process group. The group is killed
/// whenever this future returns early (timeout, stdout overflow, or the future
/// being dropped) and also once the child exits, so nothing it forked
/// outlives it.
pub async fn run_collect(
    spec: &CommandSpec,
    stdin: StdinSource,
    limits: Limits,
) -> Result<Collected, ProcessError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    match &stdin {
        StdinSource::Null => {
            cmd.stdin(Stdio::null());
        }
        StdinSource::Bytes(_) => {
            cmd.stdin(Stdio::piped());
        }
    }

    if spec.clear_env {
        cmd.env_clear();
    }
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program_name(&spec.program),
        source,
    })?;
    let mut guard = ChildDropGuard::new(child);
    tracing::debug!(pid = ?guard.child_mut()?.id(), "spawned {}", program_name(&spec.program));

    if let StdinSource::Bytes(bytes) = stdin
        && let Some(mut handle) = guard.child_mut()?.stdin.take()
    {
        tokio::spawn(async move {
            if !bytes.is_empty() {
                let _ = handle.write_all(&bytes).await;
            }
            let _ = handle.shutdown().await;
        });
    }

    let stdout = guard
        .child_mut()?
        .stdout
        .take()
        .ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = guard
        .child_mut()?
        .stderr
        .take()
        .ok_or_else(|| missing_pipe("stderr"))?;

    let cap = limits.max_output_bytes;
    let out_task = tokio::spawn(drain_capped(stdout, cap, true));
    let err_task = tokio::spawn(drain_capped(stderr, cap, false));

    let wait_future = async move {
        let mut guard = guard;
        let mut out_task = out_task;
        let mut early_out = None;

        let status = loop {
            tokio::select! {
                joined = &mut out_task, if early_out.is_none() => {
                    let out = flatten_drain(joined, "failed to read stdout")?;
                    if out.overflow {
                        return Err(ProcessError::OutputLimit(cap));
                    }
                    early_out = Some(out);
                }
                status = guard.child_mut()?.wait() => break status,
            }
        }
        .map_err(|source| ProcessError::Io {
            context: "failed to wait on process",
            source,
        })?;
        guard.kill_group();

        let out = match early_out {
            Some(out) => out,
            None => join_drain(out_task, "failed to read stdout").await?,
        };
        if out.overflow {
            return Err(ProcessError::OutputLimit(cap));
        }
        let err = join_drain(err_task, "failed to read stderr").await?;
        guard.disarm();
        Ok(Collected {
            status,
            stdout: out.bytes,
            stderr: err.bytes,
            stderr_truncated: err.overflow,
        })
    };

    match limits.deadline {
        Some(limit) => timeout(limit, wait_future)
            .await
            .map_err(|_| ProcessError::Timeout(limit))?,
        None => wait_future.await,
    }
}

/// Awaits a pipe-draining task and flattens join and I/O failures.
async fn join_drain(
    task: tokio::task::JoinHandle<Result<Drained, std::io::Error>>,
    context: &'static str,
) -> Result<Drained, ProcessError> {
    flatten_drain(task.await, context)
}

/// Flattens the result of a finished pipe-draining task.
fn flatten_drain(
    joined: Result<Result<Drained, std::io::Error>, tokio::task::JoinError>,
    context: &'static str,
) -> Result<Drained, ProcessError> {
    match joined {
        Ok(Ok(drained)) => Ok(drained),
        Ok(Err(source)) => Err(ProcessError::Io { context, source }),
        Err(join) => Err(ProcessError::Io {
            context,
            source: std::io::Error::other(join),
        }),
    }
}

/// Error for a pipe we asked for but did not get.
fn missing_pipe(which: &'static str) -> ProcessError {
    ProcessError::Io {
        context: "missing pipe",
        source:  std::io::Error::new(std::io::ErrorKind::BrokenPipe, which),
    }
}

/// Printable program name for diagnostics.
fn program_name(program: &OsStr) -> String {
    program.to_string_lossy().into_owned()
}
