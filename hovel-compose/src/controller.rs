//! `docker compose` implementation of the container runtime.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use hovel_core::error::{HovelError, Result};

use crate::command::{engine_installed, ComposeCommand, ComposeTimeouts};
use crate::runtime::{ContainerRuntime, ExecHandle, ServiceState, ServiceStatus};

/// How much of a failed build's output is kept in the error.
const BUILD_LOG_TAIL_KIB: usize = 8;

/// One line of `docker compose ps --format json` output.
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "State")]
    state: String,
}

/// Container runtime backed by the host's `docker compose` CLI.
pub struct ComposeController {
    timeouts: ComposeTimeouts,
}

impl ComposeController {
    pub fn new(timeouts: ComposeTimeouts) -> Result<Self> {
        if !engine_installed() {
            return Err(HovelError::Internal(
                "docker CLI not found in PATH".to_string(),
            ));
        }
        Ok(Self { timeouts })
    }

    /// Parse `ps --format json` output, which newer engines emit as one
    /// JSON object per line and older ones as a single JSON array.
    fn parse_ps_output(output: &str) -> Result<Vec<ServiceStatus>> {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            trimmed
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<std::result::Result<_, _>>()?
        };

        Ok(entries
            .into_iter()
            .map(|entry| ServiceStatus {
                state: ServiceState::from_engine(&entry.state),
                service: entry.service,
            })
            .collect())
    }
}

#[async_trait]
impl ContainerRuntime for ComposeController {
    async fn build(&self, workspace: &Path) -> Result<()> {
        let output = ComposeCommand::new(workspace, "build")
            .run(self.timeouts.build)
            .await?;
        if !output.success {
            return Err(HovelError::BuildFailed(output.tail(BUILD_LOG_TAIL_KIB)));
        }
        debug!(workspace = %workspace.display(), "compose build finished");
        Ok(())
    }

    async fn up(&self, workspace: &Path, services: &[String]) -> Result<()> {
        let output = ComposeCommand::new(workspace, "up")
            .arg("-d")
            .args(services.iter().cloned())
            .run(self.timeouts.up)
            .await?;
        if !output.success {
            if output.stderr.contains("no such service") {
                return Err(HovelError::UnknownService(output.stderr.trim().to_string()));
            }
            return Err(HovelError::StartFailed(output.stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn down(&self, workspace: &Path) -> Result<()> {
        let output = ComposeCommand::new(workspace, "down")
            .run(self.timeouts.default)
            .await?;
        if !output.success {
            return Err(HovelError::StopFailed(output.stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn restart(&self, workspace: &Path) -> Result<()> {
        self.down(workspace).await?;
        self.up(workspace, &[]).await
    }

    async fn status(&self, workspace: &Path) -> Result<Vec<ServiceStatus>> {
        let output = ComposeCommand::new(workspace, "ps")
            .arg("--format")
            .arg("json")
            .arg("-a")
            .run(self.timeouts.default)
            .await?;
        if !output.success {
            return Err(HovelError::QueryFailed(output.stderr.trim().to_string()));
        }
        Self::parse_ps_output(&output.stdout)
    }

    async fn logs(&self, workspace: &Path, lines: u32) -> Result<String> {
        let output = ComposeCommand::new(workspace, "logs")
            .arg("--tail")
            .arg(lines.to_string())
            .run(self.timeouts.default)
            .await?;
        if !output.success {
            return Err(HovelError::LogFailed(output.stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    async fn exec(&self, workspace: &Path, service: &str, cmd: &[String]) -> Result<ExecHandle> {
        // compose exec on a stopped service reports failure only after the
        // child is reaped; checking liveness first gives the caller a
        // proper NotRunning instead of a silent dead session.
        let statuses = self.status(workspace).await?;
        let live = statuses
            .iter()
            .any(|s| s.service == service && s.state == ServiceState::Running);
        if !live {
            return Err(HovelError::NotRunning(service.to_string()));
        }

        let child = ComposeCommand::new(workspace, "exec")
            .arg(service)
            .args(cmd.iter().cloned())
            .spawn()?;
        Ok(ExecHandle::new(child))
    }

    async fn purge(&self, workspace: &Path) -> Result<()> {
        let output = ComposeCommand::new(workspace, "down")
            .arg("--rmi")
            .arg("all")
            .arg("--volumes")
            .run(self.timeouts.default)
            .await?;
        if !output.success {
            warn!(
                workspace = %workspace.display(),
                stderr = %output.stderr.trim(),
                "compose purge reported errors"
            );
            return Err(HovelError::StopFailed(output.stderr.trim().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_output_ndjson() {
        let out = concat!(
            "{\"Service\":\"app-alpha\",\"State\":\"running\",\"Name\":\"x\"}\n",
            "{\"Service\":\"db-alpha\",\"State\":\"exited\",\"Name\":\"y\"}\n",
        );
        let statuses = ComposeController::parse_ps_output(out).unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].service, "app-alpha");
        assert_eq!(statuses[0].state, ServiceState::Running);
        assert_eq!(statuses[1].state, ServiceState::Exited);
    }

    #[test]
    fn test_parse_ps_output_array() {
        let out = r#"[{"Service":"app","State":"restarting"}]"#;
        let statuses = ComposeController::parse_ps_output(out).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, ServiceState::Restarting);
    }

    #[test]
    fn test_parse_ps_output_empty() {
        assert!(ComposeController::parse_ps_output("  \n").unwrap().is_empty());
    }
}
