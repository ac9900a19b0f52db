use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use pbgen_domain::{ModuleDescriptor, PackageDescriptor};

use crate::error::PbgenError;
use crate::process::{display_command, run_captured, run_inherited};

pub const GO_BINARY_ENV: &str = "PBGEN_GO";

/// The go toolchain as seen by the pipeline: build-graph queries plus `go install`.
pub trait GoTool: Send + Sync {
    /// `go list -json -e [-tags ...] <pattern>`.
    ///
    /// A package that cannot be located is reported through [`PackageDescriptor::error`]; `Err`
    /// is reserved for process or decoding failures.
    fn list_package(&self, pattern: &str, tags: &[&str]) -> Result<PackageDescriptor>;
    /// `go list -m -json -e <module>`.
    fn list_module(&self, module: &str) -> Result<ModuleDescriptor>;
    /// `go install <spec>` with `GOBIN=<bin_dir>`, streaming output to the parent.
    fn install(&self, spec: &str, bin_dir: &Path) -> Result<()>;
    /// Executable suffix for installed binaries (`go env GOEXE`).
    fn exe_suffix(&self) -> Result<String>;
}

pub struct SystemGo {
    program: PathBuf,
}

impl SystemGo {
    /// Locates `go` through `PBGEN_GO` or `PATH`.
    ///
    /// # Errors
    /// Returns an error when no go binary can be found.
    pub fn detect() -> Result<Self> {
        if let Some(explicit) = env::var_os(GO_BINARY_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::new(PathBuf::from(explicit)));
        }
        let program = which::which("go")
            .context("go toolchain not found on PATH; set PBGEN_GO to the go binary")?;
        Ok(Self::new(program))
    }

    #[must_use]
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }
}

impl GoTool for SystemGo {
    fn list_package(&self, pattern: &str, tags: &[&str]) -> Result<PackageDescriptor> {
        let mut command = self.command();
        command.args(["list", "-json", "-e"]);
        if !tags.is_empty() {
            command.arg("-tags").arg(tags.join(","));
        }
        command.arg(pattern);
        let rendered = display_command(&command);
        let stdout = run_captured(command)?;
        PackageDescriptor::from_json(&stdout)
            .map_err(|err| PbgenError::graph(pattern, err))
            .with_context(|| format!("decoding output of [{rendered}]"))
    }

    fn list_module(&self, module: &str) -> Result<ModuleDescriptor> {
        let mut command = self.command();
        command.args(["list", "-m", "-json", "-e", module]);
        let rendered = display_command(&command);
        let stdout = run_captured(command)?;
        ModuleDescriptor::from_json(&stdout)
            .map_err(|err| PbgenError::graph(module, err))
            .with_context(|| format!("decoding output of [{rendered}]"))
    }

    fn install(&self, spec: &str, bin_dir: &Path) -> Result<()> {
        let mut command = self.command();
        command.args(["install", spec]).env("GOBIN", bin_dir);
        run_inherited(command)
    }

    fn exe_suffix(&self) -> Result<String> {
        let mut command = self.command();
        command.args(["env", "GOEXE"]);
        let stdout = run_captured(command)?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}
