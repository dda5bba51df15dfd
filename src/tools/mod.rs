//! Wrappers around the external search and distance tools

pub mod blast;
pub mod mash;
pub mod traits;

pub use blast::{BlastProgram, BlastSearch};
pub use mash::MashTool;
pub use traits::{DistanceTool, SearchTool};

use crate::MashtError;
use anyhow::{Context, Result};
use std::process::{Command, Output};
use tracing::debug;

/// Run a prepared command, failing with its stderr on a non-zero exit
pub(crate) fn run_command(cmd: &mut Command, tool: &str) -> Result<Output> {
    debug!("Running {:?}", cmd);
    let output = cmd
        .output()
        .with_context(|| format!("Failed to run {}", tool))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MashtError::Tool(format!(
            "{} failed with exit code {}: {}",
            tool,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        ))
        .into());
    }
    Ok(output)
}

/// Arguments of a command as strings, for inspection
#[cfg(test)]
pub(crate) fn args_of(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[cfg(all(test, unix))]
pub(crate) fn fake_tool(dir: &std::path::Path, name: &str, script: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
