//! Subprocess helpers for the external tools addons shell out to

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// Render a command line for logs and error messages
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command to completion, optionally feeding `stdin`, and return stdout.
///
/// A non-zero exit becomes [`Error::Command`] carrying stderr.
pub async fn run_command(program: &str, args: &[String], stdin: Option<&str>) -> Result<String> {
    let rendered = display_command(program, args);
    info!(command = %rendered, "Running command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::command(&rendered, format!("failed to spawn: {}", e)))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|e| Error::command(&rendered, format!("failed to write stdin: {}", e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::command(&rendered, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::command(
            rendered,
            format!("exit status {}: {}", output.status, stderr.trim()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!(bytes = stdout.len(), "command finished");
    Ok(stdout)
}

/// Check whether a binary is available on `PATH`
pub async fn binary_available(binary: &str) -> bool {
    match Command::new("which")
        .arg(binary)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(_) => false,
    }
}
