//! Compose command abstraction and builder utilities.
//!
//! Centralizes construction and execution of `docker compose` subcommands
//! with consistent error handling, logging and timeout enforcement.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use hovel_core::error::{HovelError, Result};

/// The rendered compose file name inside every branch workspace.
pub const COMPOSE_FILE: &str = "docker-compose.yaml";

/// Per-operation timeout bounds for container engine invocations.
#[derive(Debug, Clone, Copy)]
pub struct ComposeTimeouts {
    pub build: Duration,
    pub up: Duration,
    pub default: Duration,
}

impl Default for ComposeTimeouts {
    fn default() -> Self {
        Self {
            build: Duration::from_secs(600),
            up: Duration::from_secs(120),
            default: Duration::from_secs(60),
        }
    }
}

impl ComposeTimeouts {
    pub fn with_build_timeout(build_timeout_secs: u64) -> Self {
        Self {
            build: Duration::from_secs(build_timeout_secs),
            ..Self::default()
        }
    }
}

/// Captured result of a compose invocation.
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Combined stdout and stderr, trimmed to the last `kib` KiB.
    pub fn tail(&self, kib: usize) -> String {
        let combined = if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        };

        let max = kib * 1024;
        if combined.len() <= max {
            return combined;
        }
        // Cut on a char boundary near the tail.
        let mut start = combined.len() - max;
        while !combined.is_char_boundary(start) {
            start += 1;
        }
        combined[start..].to_string()
    }
}

/// Builder for `docker compose` commands run inside a branch workspace.
#[derive(Debug, Clone)]
pub struct ComposeCommand {
    workspace: PathBuf,
    subcommand: String,
    args: Vec<String>,
}

impl ComposeCommand {
    pub fn new<S: Into<String>>(workspace: &Path, subcommand: S) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            subcommand: subcommand.into(),
            args: Vec::new(),
        }
    }

    /// Add a single argument to the command.
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments to the command.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new("docker");
        cmd.arg("compose")
            .arg("-f")
            .arg(COMPOSE_FILE)
            .arg(&self.subcommand)
            .args(&self.args)
            .current_dir(&self.workspace)
            .stdin(Stdio::null());
        cmd
    }

    /// Execute the command, capturing output, bounded by `limit`.
    pub async fn run(self, limit: Duration) -> Result<CommandOutput> {
        let mut cmd = self.build_command();
        debug!(
            workspace = %self.workspace.display(),
            subcommand = %self.subcommand,
            "running compose command"
        );

        let output = timeout(limit, cmd.output())
            .await
            .map_err(|_| {
                HovelError::Timeout(format!(
                    "docker compose {} exceeded {}s",
                    self.subcommand,
                    limit.as_secs()
                ))
            })?
            .map_err(|e| {
                HovelError::Internal(format!(
                    "failed to execute docker compose {}: {}",
                    self.subcommand, e
                ))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Spawn the command without waiting, for long-lived in-container
    /// processes such as terminal sessions.
    pub fn spawn(self) -> Result<tokio::process::Child> {
        let mut cmd = self.build_command();
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        debug!(
            workspace = %self.workspace.display(),
            subcommand = %self.subcommand,
            "spawning compose command"
        );

        cmd.spawn().map_err(|e| {
            HovelError::Internal(format!(
                "failed to spawn docker compose {}: {}",
                self.subcommand, e
            ))
        })
    }
}

/// Checks if the container engine CLI is available in the system's PATH.
pub fn engine_installed() -> bool {
    which::which("docker").is_ok()
}
