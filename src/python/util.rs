#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Interpreter discovery and command construction.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, anyhow};
use which::which;

use super::DRIVER_SOURCE;
use crate::process::CommandSpec;

/// Finds a Python 3 interpreter on `PATH`, preferring `python3`.
pub fn python_path() -> Result<PathBuf> {
    which("python3")
        .or_else(|_| which("python"))
        .context("Cannot find a Python interpreter on path (python3 or python)")
}

/// Returns the interpreter's version string, e.g. `Python 3.12.1`.
pub fn python_version(python: &Path) -> Result<String> {
    let output = Command::new(python)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to run {}", python.display()))?;

    if !output.status.success() {
        return Err(anyhow!("{} --version exited with {}", python.display(), output.status));
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        // Python 2 prints to stderr
        Ok(String::from_utf8_lossy(&output.stderr).trim().to_string())
    } else {
        Ok(version)
    }
}

/// Builds the invocation that runs the driver against `request_path`.
///
/// The interpreter runs in isolated mode (`-I`: no user site, no `PYTHON*`
/// variables, script directory not on `sys.path`) with an environment that
/// only keeps `PATH`, and with `scratch` as both working and home directory.
pub fn driver_command(python: &Path, request_path: &Path, scratch: &Path) -> CommandSpec {
    let mut env: Vec<(OsString, OsString)> = vec![
        ("HOME".into(), scratch.as_os_str().to_os_string()),
        ("MPLBACKEND".into(), "Agg".into()),
        ("MPLCONFIGDIR".into(), scratch.as_os_str().to_os_string()),
        ("OPENBLAS_NUM_THREADS".into(), "1".into()),
        ("OMP_NUM_THREADS".into(), "1".into()),
    ];
    if let Some(path) = std::env::var_os("PATH") {
        env.push(("PATH".into(), path));
    }

    CommandSpec {
        program: python.as_os_str().to_os_string(),
        args: vec![
            "-I".into(),
            "-B".into(),
            "-c".into(),
            DRIVER_SOURCE.into(),
            request_path.as_os_str().to_os_string(),
        ],
        cwd: Some(scratch.to_path_buf()),
        env,
        clear_env: true,
    }
}
