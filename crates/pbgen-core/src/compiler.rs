use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::info;

use crate::process::{display_command, run_inherited};

/// Runs `compiler @<args_file>` with inherited stdio.
///
/// `plugin_dirs` are prepended to `PATH` so plugins also resolve by bare name.
///
/// # Errors
/// Returns [`crate::PbgenError::Subprocess`] with the full command line on spawn failure or a
/// non-zero exit. Nothing is retried.
pub fn invoke(compiler: &Path, args_file: &Path, plugin_dirs: &[PathBuf]) -> Result<()> {
    let mut arg = OsString::from("@");
    arg.push(args_file.as_os_str());
    let mut command = Command::new(compiler);
    command.arg(arg);
    if !plugin_dirs.is_empty() {
        command.env("PATH", search_path(plugin_dirs)?);
    }
    let rendered = display_command(&command);
    info!(command = %rendered, "compiler begin");
    run_inherited(command)?;
    info!(command = %rendered, "compiler ok");
    Ok(())
}

fn search_path(prefix: &[PathBuf]) -> Result<OsString> {
    let existing = env::var_os("PATH").unwrap_or_default();
    let joined = prefix
        .iter()
        .cloned()
        .chain(env::split_paths(&existing))
        .collect::<Vec<_>>();
    env::join_paths(joined).context("plugin directory cannot be placed on PATH")
}
