#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Harness limits and interpreter settings, sourced from the environment.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use bon::Builder;
use serde::Serialize;

use crate::python::util::python_path;

/// Default wall-clock budget for one submission.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default cap on captured stdout.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
/// Default address-space limit handed to the interpreter.
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 512;
/// How deep nested containers are rendered before degrading to `repr`.
pub const DEFAULT_MAX_VALUE_DEPTH: usize = 16;
/// How many elements of a container are rendered before degrading to `repr`.
pub const DEFAULT_MAX_COLLECTION_LEN: usize = 10_000;

/// Settings for one executor.
#[derive(Debug, Clone, Builder, Serialize)]
#[builder(on(PathBuf, into))]
pub struct HarnessConfig {
    /// Python interpreter used for every run.
    python:             PathBuf,
    /// Wall-clock limit per execution.
    #[builder(default = Duration::from_secs(DEFAULT_TIMEOUT_SECS))]
    timeout:            Duration,
    /// Captured stdout beyond this many bytes kills the run.
    #[builder(default = DEFAULT_MAX_OUTPUT_BYTES)]
    max_output_bytes:   usize,
    /// Address-space limit in MiB, `0` disables it.
    #[builder(default = DEFAULT_MEMORY_LIMIT_MB)]
    memory_limit_mb:    u64,
    /// CPU-seconds limit; defaults to the wall-clock timeout when unset.
    cpu_limit_secs:     Option<u64>,
    /// Nesting depth rendered into binding snapshots.
    #[builder(default = DEFAULT_MAX_VALUE_DEPTH)]
    max_value_depth:    usize,
    /// Container length rendered into binding snapshots.
    #[builder(default = DEFAULT_MAX_COLLECTION_LEN)]
    max_collection_len: usize,
    /// Parent directory for per-run scratch directories.
    #[builder(default = std::env::temp_dir())]
    scratch_root:       PathBuf,
}

impl HarnessConfig {
    /// Builds a configuration from `PYGRADE_*` environment variables, locating
    /// the interpreter on `PATH` unless `PYGRADE_PYTHON` names one.
    pub fn from_env() -> Result<Self> {
        let python = match std::env::var("PYGRADE_PYTHON") {
            Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
            _ => python_path()?,
        };

        let scratch_root = std::env::var("PYGRADE_SCRATCH_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        Ok(Self::builder()
            .python(python)
            .timeout(read_timeout_secs("PYGRADE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS))
            .max_output_bytes(read_number("PYGRADE_MAX_OUTPUT_BYTES", DEFAULT_MAX_OUTPUT_BYTES))
            .memory_limit_mb(read_number("PYGRADE_MEMORY_LIMIT_MB", DEFAULT_MEMORY_LIMIT_MB))
            .maybe_cpu_limit_secs(read_optional("PYGRADE_CPU_LIMIT_SECS"))
            .scratch_root(scratch_root)
            .build())
    }

    /// CPU limit actually applied: the explicit one, else the timeout rounded
    /// up to whole seconds.
    pub fn effective_cpu_limit_secs(&self) -> u64 {
        self.cpu_limit_secs.unwrap_or_else(|| {
            let secs = self.timeout.as_secs();
            if self.timeout.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
        })
    }

    /// Address-space limit in bytes, if any.
    pub fn memory_limit_bytes(&self) -> Option<u64> {
        (self.memory_limit_mb > 0).then(|| self.memory_limit_mb * 1024 * 1024)
    }

    /// Interpreter used for every run.
    pub fn python(&self) -> &Path {
        &self.python
    }

    /// Wall-clock limit per execution.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stdout cap in bytes.
    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Nesting depth rendered into binding snapshots.
    pub fn max_value_depth(&self) -> usize {
        self.max_value_depth
    }

    /// Container length rendered into binding snapshots.
    pub fn max_collection_len(&self) -> usize {
        self.max_collection_len
    }

    /// Parent directory for scratch directories.
    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Returns a copy with a different timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a copy with a different stdout cap.
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Returns a copy using a different interpreter.
    pub fn with_python(mut self, python: impl AsRef<Path>) -> Self {
        self.python = python.as_ref().to_path_buf();
        self
    }
}

/// Global storage for the lazily constructed configuration.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<HarnessConfig>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<HarnessConfig>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return it.
pub fn ensure_initialized() -> Result<Arc<HarnessConfig>> {
    let mut guard = slot()
        .lock()
        .map_err(|_| anyhow!("config slot poisoned"))?;
    if let Some(cfg) = guard.as_ref() {
        return Ok(Arc::clone(cfg));
    }

    let cfg = Arc::new(HarnessConfig::from_env().context("Failed to build harness configuration")?);
    *guard = Some(Arc::clone(&cfg));
    Ok(cfg)
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    Duration::from_secs(read_number(env, default_secs))
}

/// Parses a numeric environment variable with a fallback.
fn read_number<T: std::str::FromStr>(env: &str, default: T) -> T {
    read_optional(env).unwrap_or(default)
}

/// Parses a numeric environment variable, `None` when absent or malformed.
fn read_optional<T: std::str::FromStr>(env: &str) -> Option<T> {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let cfg = HarnessConfig::builder().python("/usr/bin/python3").build();
        assert_eq!(cfg.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(cfg.max_output_bytes(), DEFAULT_MAX_OUTPUT_BYTES);
        assert_eq!(cfg.memory_limit_bytes(), Some(DEFAULT_MEMORY_LIMIT_MB * 1024 * 1024));
    }

    #[test]
    fn cpu_limit_follows_timeout() {
        let cfg = HarnessConfig::builder()
            .python("python3")
            .timeout(Duration::from_millis(1500))
            .build();
        assert_eq!(cfg.effective_cpu_limit_secs(), 2);

        let cfg = cfg.with_timeout(Duration::from_millis(100));
        assert_eq!(cfg.effective_cpu_limit_secs(), 1);
    }

    #[test]
    fn explicit_cpu_limit_wins() {
        let cfg = HarnessConfig::builder()
            .python("python3")
            .cpu_limit_secs(3)
            .build();
        assert_eq!(cfg.effective_cpu_limit_secs(), 3);
    }

    #[test]
    fn zero_memory_limit_disables_it() {
        let cfg = HarnessConfig::builder()
            .python("python3")
            .memory_limit_mb(0)
            .build();
        assert_eq!(cfg.memory_limit_bytes(), None);
    }

    #[test]
    fn global_config_is_built_once() {
        let first = ensure_initialized().expect("python on PATH");
        let second = ensure_initialized().expect("python on PATH");
        assert!(Arc::ptr_eq(&first, &second));
    }
}
