#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Runs a submission in a throwaway interpreter and classifies the outcome.

use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{self, HarnessConfig},
    grade::{GradeReport, TestCase, grade},
    process::{self, Collected, Limits, ProcessError, StdinSource},
    python::{
        ProbeCall, Value,
        protocol::{DriverLimits, DriverReport, DriverRequest, ProbeRecord, SignedReport},
        util::driver_command,
        value::CallRecord,
    },
};

/// Source text a user wants executed and graded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeSubmission {
    /// The literal source.
    source: String,
    /// Canned input for `input()` prompts.
    #[serde(default)]
    stdin:  Option<String>,
}

impl CodeSubmission {
    /// Wraps source text.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            stdin:  None,
        }
    }

    /// Attaches the input stream fed to the program.
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Returns the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the attached input stream, if any.
    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }
}

/// Why a run counts as a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeErrorKind {
    /// The submitted code raised.
    Exception,
    /// The wall-clock limit passed.
    Timeout,
    /// Too much was written to stdout.
    OutputLimit,
    /// The interpreter died without reporting, e.g. on a resource limit.
    Crashed,
    /// The harness could not run the interpreter at all.
    Harness,
}

/// Outcome of running one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// Ran to completion.
    Success {
        /// Everything written to stdout.
        stdout:   String,
        /// Top-level bindings after the run.
        bindings: BTreeMap<String, Value>,
    },
    /// Rejected before execution.
    SyntaxError {
        /// `"<ErrorType>: <msg>"`.
        message: String,
        /// 1-based line, if known.
        line:    Option<usize>,
    },
    /// Started but did not complete normally.
    RuntimeError {
        /// `"<ExceptionType>: <str(exc)>"` or a description of the limit hit.
        message: String,
        /// What kind of failure this was.
        kind:    RuntimeErrorKind,
        /// Submission line the exception surfaced on, if known.
        line:    Option<usize>,
    },
}

impl ExecutionResult {
    /// Shorthand for a runtime error without a line.
    fn runtime(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        ExecutionResult::RuntimeError {
            message: message.into(),
            kind,
            line: None,
        }
    }

    /// Whether the run completed.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// Captured stdout for successful runs.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    /// Looks up a top-level binding of a successful run.
    pub fn binding(&self, name: &str) -> Option<&Value> {
        match self {
            ExecutionResult::Success { bindings, .. } => bindings.get(name),
            _ => None,
        }
    }

    /// Error message for failed runs.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::SyntaxError { message, .. }
            | ExecutionResult::RuntimeError { message, .. } => Some(message),
        }
    }
}

impl Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionResult::Success { stdout, .. } => write!(f, "{stdout}"),
            ExecutionResult::SyntaxError {
                message,
                line: Some(line),
            }
            | ExecutionResult::RuntimeError {
                message,
                line: Some(line),
                ..
            } => write!(f, "{message} (line {line})"),
            ExecutionResult::SyntaxError { message, .. }
            | ExecutionResult::RuntimeError { message, .. } => write!(f, "{message}"),
        }
    }
}

/// Scratch directory removed when dropped.
struct ScratchDir(PathBuf);

impl ScratchDir {
    /// Creates a uniquely named directory under `root`.
    fn create(root: &Path) -> Result<Self> {
        let path = root.join(format!("pygrade-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Could not create scratch directory {}", path.display()))?;
        Ok(Self(path))
    }

    /// Returns the directory path.
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            tracing::warn!("Could not remove scratch directory {}: {}", self.0.display(), e);
        }
    }
}

/// Runs submissions, one fresh interpreter per call.
#[derive(Debug, Clone)]
pub struct Executor {
    /// Limits and interpreter.
    config: Arc<HarnessConfig>,
}

impl Executor {
    /// Creates an executor with explicit settings.
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates an executor from the process-wide configuration.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config: config::ensure_initialized()?,
        })
    }

    /// Returns the settings in use.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs `submission` with `stdin_data` as its standard input.
    ///
    /// Never fails: every problem, including the harness being unable to
    /// start Python, comes back as an [`ExecutionResult`].
    pub async fn execute(&self, submission: &CodeSubmission, stdin_data: &str) -> ExecutionResult {
        self.execute_with_calls(submission, stdin_data, &[]).await
    }

    /// Like [`Executor::execute`], and afterwards performs `calls` inside the
    /// same interpreter, recording each outcome on the bound function value.
    pub async fn execute_with_calls(
        &self,
        submission: &CodeSubmission,
        stdin_data: &str,
        calls: &[ProbeCall],
    ) -> ExecutionResult {
        let result = match self.try_execute(submission, stdin_data, calls, false).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("harness failure: {:#}", e);
                ExecutionResult::runtime(RuntimeErrorKind::Harness, format!("HarnessError: {e:#}"))
            }
        };

        match &result {
            ExecutionResult::Success { stdout, bindings } => tracing::debug!(
                stdout_bytes = stdout.len(),
                bindings = bindings.len(),
                "submission completed"
            ),
            other => tracing::debug!("submission failed: {}", other),
        }
        result
    }

    /// Compiles `submission` in a fresh interpreter without running it.
    /// A clean compile is reported as a success with no output or bindings.
    pub async fn check(&self, submission: &CodeSubmission) -> ExecutionResult {
        match self.try_execute(submission, "", &[], true).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("harness failure: {:#}", e);
                ExecutionResult::runtime(RuntimeErrorKind::Harness, format!("HarnessError: {e:#}"))
            }
        }
    }

    /// Fallible core of [`Executor::execute_with_calls`] and
    /// [`Executor::check`]; errors here are harness problems, not problems
    /// with the submission.
    async fn try_execute(
        &self,
        submission: &CodeSubmission,
        stdin_data: &str,
        calls: &[ProbeCall],
        compile_only: bool,
    ) -> Result<ExecutionResult> {
        let scratch = ScratchDir::create(self.config.scratch_root())?;
        let request_path = scratch.path().join("request.json");
        let result_path = scratch.path().join("result.json");
        let work_dir = scratch.path().join("work");
        tokio::fs::create_dir(&work_dir)
            .await
            .with_context(|| format!("Could not create {}", work_dir.display()))?;
        let nonce = Uuid::new_v4().simple().to_string();

        let request = DriverRequest {
            source: submission.source(),
            nonce: &nonce,
            result_path: result_path.clone(),
            calls,
            compile_only,
            limits: DriverLimits {
                memory_bytes: self.config.memory_limit_bytes(),
                cpu_secs:     self.config.effective_cpu_limit_secs(),
                max_depth:    self.config.max_value_depth(),
                max_len:      self.config.max_collection_len(),
            },
        };
        let payload = serde_json::to_vec(&request).context("Could not encode driver request")?;
        tokio::fs::write(&request_path, payload)
            .await
            .with_context(|| format!("Could not write {}", request_path.display()))?;

        let spec = driver_command(self.config.python(), &request_path, &work_dir);
        let limits = Limits {
            deadline:         Some(self.config.timeout()),
            max_output_bytes: self.config.max_output_bytes(),
        };

        let collected =
            match process::run_collect(&spec, StdinSource::Bytes(stdin_data.as_bytes().to_vec()), limits)
                .await
            {
                Ok(collected) => collected,
                Err(ProcessError::Timeout(limit)) => {
                    tracing::info!("submission timed out after {:?}", limit);
                    return Ok(ExecutionResult::runtime(
                        RuntimeErrorKind::Timeout,
                        format!("TimeoutError: execution did not finish within {limit:?}"),
                    ));
                }
                Err(ProcessError::OutputLimit(bytes)) => {
                    tracing::info!("submission exceeded the {} byte output cap", bytes);
                    return Ok(ExecutionResult::runtime(
                        RuntimeErrorKind::OutputLimit,
                        format!("OutputLimitError: more than {bytes} bytes written to standard output"),
                    ));
                }
                Err(e) => return Err(e).context("Could not run the Python interpreter"),
            };

        let bytes = match tokio::fs::read(&result_path).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                return Ok(ExecutionResult::runtime(RuntimeErrorKind::Crashed, crash_message(&collected)));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ExecutionResult::runtime(RuntimeErrorKind::Crashed, crash_message(&collected)));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Could not read {}", result_path.display()));
            }
        };

        let Ok(signed) = serde_json::from_slice::<SignedReport>(&bytes) else {
            tracing::warn!("driver report could not be parsed");
            return Ok(ExecutionResult::runtime(
                RuntimeErrorKind::Crashed,
                "InterpreterCrash: the run ended without a complete report",
            ));
        };
        if signed.nonce != nonce {
            tracing::warn!("driver report carried the wrong token");
            return Ok(ExecutionResult::runtime(
                RuntimeErrorKind::Harness,
                "HarnessError: the report was not written by the harness",
            ));
        }
        let report = signed.report;

        Ok(match report {
            DriverReport::Success { mut bindings, calls } => {
                attach_calls(&mut bindings, calls);
                ExecutionResult::Success {
                    stdout: String::from_utf8_lossy(&collected.stdout).into_owned(),
                    bindings,
                }
            }
            DriverReport::SyntaxError { message, line } => {
                ExecutionResult::SyntaxError { message, line }
            }
            DriverReport::RuntimeError { message, line } => ExecutionResult::RuntimeError {
                message,
                kind: RuntimeErrorKind::Exception,
                line,
            },
            DriverReport::HarnessError { message } => {
                tracing::error!("driver failure: {}", message);
                ExecutionResult::runtime(RuntimeErrorKind::Harness, format!("HarnessError: {message}"))
            }
        })
    }
}

/// Moves probe results onto the function values they were made against.
fn attach_calls(bindings: &mut BTreeMap<String, Value>, calls: Vec<ProbeRecord>) {
    for record in calls {
        if let Some(Value::Function(func)) = bindings.get_mut(&record.name) {
            func.calls.push(CallRecord {
                args:    record.args,
                outcome: record.outcome,
            });
        }
    }
}

/// Describes an interpreter that exited without writing its report.
fn crash_message(collected: &Collected) -> String {
    let stderr = String::from_utf8_lossy(&collected.stderr);
    let last_line = stderr.lines().rev().find(|line| !line.trim().is_empty());
    let status = describe_status(collected.status);

    match last_line {
        Some(line) => format!("InterpreterCrash: {status}: {}", line.trim()),
        None => format!("InterpreterCrash: {status}"),
    }
}

/// Human-readable exit status, naming the signal on Unix.
fn describe_status(status: ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("interpreter killed by signal {signal}");
        }
    }
    match status.code() {
        Some(code) => format!("interpreter exited with code {code} before reporting"),
        None => "interpreter exited before reporting".to_string(),
    }
}

/// Executes and grades in one step.
#[derive(Debug, Clone)]
pub struct Harness {
    /// Executor used for every submission.
    executor: Executor,
}

impl Harness {
    /// Wraps an executor.
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Builds a harness from the process-wide configuration.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Executor::from_env()?))
    }

    /// Returns the underlying executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Runs `submission` (with its own stdin, or none) and grades the result
    /// against `cases`. Function cases are probed inside the same run.
    pub async fn run(&self, submission: &CodeSubmission, cases: &[TestCase]) -> GradeReport {
        let calls: Vec<ProbeCall> = cases.iter().flat_map(TestCase::probe_calls).collect();
        let result = self
            .executor
            .execute_with_calls(submission, submission.stdin().unwrap_or_default(), &calls)
            .await;
        let report = grade(&result, cases);
        tracing::info!(passed = report.passed, "{}", report.message);
        report
    }
}
