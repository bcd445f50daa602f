// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OS print spooler hand-off for inkjet and laser printers.
//
// The rendered document is passed to the platform print command with the
// printer's queue name (or its network address when no name is recorded).
// A non-zero exit status or anything written to stderr counts as a failure.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use printrelay_core::error::{AgentError, Result};

/// The program and leading arguments used to submit a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SpoolCommand {
    /// The native print command for this platform.
    pub fn platform() -> Self {
        if cfg!(windows) {
            Self {
                program: "powershell".into(),
                args: vec!["-NoProfile".into(), "-Command".into()],
            }
        } else {
            Self {
                program: "lp".into(),
                args: Vec::new(),
            }
        }
    }

    /// A custom command, e.g. `lpr` or a wrapper script. The destination and
    /// file path are appended as the last two arguments.
    pub fn custom(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Full argument vector for submitting `file` to `destination`.
    pub fn arguments(&self, destination: &str, file: &Path) -> Vec<String> {
        let mut args = self.args.clone();
        let file = file.display().to_string();
        if self.program == "lp" {
            args.extend(["-d".to_owned(), destination.to_owned(), file]);
        } else if self.program == "powershell" {
            args.push(format!(
                "Start-Process -FilePath '{}' -Verb PrintTo -ArgumentList '{}' -Wait",
                file.replace('\'', "''"),
                destination.replace('\'', "''")
            ));
        } else {
            args.extend([destination.to_owned(), file]);
        }
        args
    }
}

/// Submit `file` to the spooler queue `destination`.
pub async fn submit(command: &SpoolCommand, destination: &str, file: &Path) -> Result<()> {
    let args = command.arguments(destination, file);
    info!(program = %command.program, destination, file = %file.display(), "submitting to spooler");

    let output = Command::new(&command.program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| AgentError::Spooler(format!("cannot run {}: {e}", command.program)))?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    if !output.status.success() {
        return Err(AgentError::Spooler(format!(
            "{} exited with {}: {}",
            command.program, output.status, stderr
        )));
    }
    if !stderr.is_empty() {
        warn!(destination, stderr = %stderr, "spooler reported an error");
        return Err(AgentError::Spooler(stderr));
    }

    info!(destination, "spooler accepted job");
    Ok(())
}
