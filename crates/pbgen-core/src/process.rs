use std::process::{Command, Stdio};

use anyhow::Result;
use tracing::debug;

use crate::error::PbgenError;

/// Renders a command the way a user would type it, including explicit env overrides.
pub(crate) fn display_command(command: &Command) -> String {
    let mut parts = Vec::new();
    for (key, value) in command.get_envs() {
        if let Some(value) = value {
            parts.push(format!(
                "{}={}",
                key.to_string_lossy(),
                quote(&value.to_string_lossy())
            ));
        }
    }
    parts.push(quote(&command.get_program().to_string_lossy()));
    for arg in command.get_args() {
        parts.push(quote(&arg.to_string_lossy()));
    }
    parts.join(" ")
}

fn quote(raw: &str) -> String {
    if raw.is_empty() || raw.contains(char::is_whitespace) {
        format!("\"{raw}\"")
    } else {
        raw.to_string()
    }
}

/// Runs `command` and returns its stdout; stderr is folded into the error on failure.
///
/// # Errors
/// Returns [`PbgenError::Subprocess`] when the program cannot be spawned or exits non-zero.
pub(crate) fn run_captured(mut command: Command) -> Result<Vec<u8>> {
    let rendered = display_command(&command);
    debug!(command = %rendered, "running");
    command.stdin(Stdio::null());
    let output = command.output().map_err(|err| PbgenError::Subprocess {
        command: rendered.clone(),
        status: format!("failed to start: {err}"),
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let status = if stderr.is_empty() {
            output.status.to_string()
        } else {
            format!("{}: {stderr}", output.status)
        };
        return Err(PbgenError::Subprocess {
            command: rendered,
            status,
        }
        .into());
    }
    Ok(output.stdout)
}

/// Runs `command` with the parent's stdout/stderr.
///
/// # Errors
/// Returns [`PbgenError::Subprocess`] carrying the full command line when the program cannot be
/// spawned or exits non-zero.
pub(crate) fn run_inherited(mut command: Command) -> Result<()> {
    let rendered = display_command(&command);
    debug!(command = %rendered, "running");
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let status = command.status().map_err(|err| PbgenError::Subprocess {
        command: rendered.clone(),
        status: format!("failed to start: {err}"),
    })?;
    if !status.success() {
        return Err(PbgenError::Subprocess {
            command: rendered,
            status: status.to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_env_and_quotes_spaces() {
        let mut command = Command::new("go");
        command
            .args(["install", "example.com/cmd/tool@v1.0.0"])
            .env("GOBIN", "/cache/my tools");
        assert_eq!(
            display_command(&command),
            "GOBIN=\"/cache/my tools\" go install example.com/cmd/tool@v1.0.0"
        );
    }

    #[test]
    fn missing_program_is_a_subprocess_error() {
        let command = Command::new("pbgen-definitely-missing-binary");
        let err = run_captured(command).expect_err("spawn must fail");
        match err.downcast_ref::<PbgenError>() {
            Some(PbgenError::Subprocess { command, status }) => {
                assert_eq!(command, "pbgen-definitely-missing-binary");
                assert!(status.starts_with("failed to start"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn captured_failure_carries_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo boom >&2; exit 4"]);
        let err = run_captured(command).expect_err("non-zero exit");
        let message = err.to_string();
        assert!(message.contains("sh -c"), "{message}");
        assert!(message.contains("exit status: 4"), "{message}");
        assert!(message.contains("boom"), "{message}");
    }
}
