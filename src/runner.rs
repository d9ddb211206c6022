// AP Provisioner - Command Execution
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Everything that shells out goes through [`CommandRunner`], so the
//! pipeline can be exercised in tests without touching the host. The
//! production implementation is [`SystemRunner`]; tests use
//! [`fake::FakeRunner`] with scripted responses.

use std::process::Command;

use tracing::debug;

use crate::models::error::{Error, Result};

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Both streams joined, for diagnostics.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }
        text
    }
}

/// Seam between the pipeline and the host system.
pub trait CommandRunner {
    /// Run a command to completion and capture its output.
    ///
    /// Failure to spawn is an error; a nonzero exit is reported through
    /// [`CommandOutput::success`] and left to the caller.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Whether a program exists on the PATH.
    fn has_command(&self, program: &str) -> bool;

    /// Run a command and treat a nonzero exit as an error.
    fn run_ok(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(program, args)?;
        if !output.success {
            return Err(Error::command_failed(
                display_command(program, args),
                output.combined(),
            ));
        }
        Ok(output)
    }
}

fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Production runner backed by `std::process::Command`.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!("running: {}", display_command(program, args));
        let output = Command::new(program).args(args).output().map_err(|e| {
            Error::command_failed(display_command(program, args), e.to_string())
        })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn has_command(&self, program: &str) -> bool {
        Command::new("which")
            .arg(program)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}
