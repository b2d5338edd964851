//! Container runtime trait and mock implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hovel_core::error::{HovelError, Result};

/// Liveness state of a single service in a container group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
    Restarting,
    Exited,
    Unknown,
}

impl ServiceState {
    /// Map a `docker compose ps` state string onto the coarse state set.
    pub fn from_engine(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "running" | "up" => ServiceState::Running,
            "restarting" => ServiceState::Restarting,
            "exited" => ServiceState::Exited,
            "stopped" | "dead" | "paused" => ServiceState::Stopped,
            _ => ServiceState::Unknown,
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
            ServiceState::Restarting => "restarting",
            ServiceState::Exited => "exited",
            ServiceState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Per-service liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub state: ServiceState,
}

/// Handle to a process started inside a running service.
///
/// Dropping the handle leaves the process running; the tokio runtime reaps
/// it once it exits.
#[derive(Debug)]
pub struct ExecHandle {
    child: Option<tokio::process::Child>,
}

impl ExecHandle {
    pub(crate) fn new(child: tokio::process::Child) -> Self {
        Self { child: Some(child) }
    }

    /// A handle with no underlying process, used by mock runtimes.
    pub fn detached() -> Self {
        Self { child: None }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Wait for the process to exit. Returns `None` for detached handles.
    pub async fn wait(mut self) -> Result<Option<std::process::ExitStatus>> {
        match self.child.take() {
            Some(mut child) => {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| HovelError::Internal(format!("wait failed: {}", e)))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }
}

/// Operations the engine needs from the host container engine, scoped to a
/// workspace directory containing a rendered compose file.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build all images declared by the workspace's compose file. Blocking;
    /// may take minutes.
    async fn build(&self, workspace: &Path) -> Result<()>;

    /// Start the given services (all when empty) in detached mode.
    /// Idempotent for already-running services.
    async fn up(&self, workspace: &Path, services: &[String]) -> Result<()>;

    /// Stop and remove all services. Idempotent.
    async fn down(&self, workspace: &Path) -> Result<()>;

    /// Stop then start all services.
    async fn restart(&self, workspace: &Path) -> Result<()>;

    /// Query per-service liveness.
    async fn status(&self, workspace: &Path) -> Result<Vec<ServiceStatus>>;

    /// Last `lines` lines of the combined service logs.
    async fn logs(&self, workspace: &Path, lines: u32) -> Result<String>;

    /// Start a process inside a running service.
    async fn exec(&self, workspace: &Path, service: &str, cmd: &[String]) -> Result<ExecHandle>;

    /// Tear down the group including images and volumes, for branch
    /// deletion. Errors are the caller's to downgrade.
    async fn purge(&self, workspace: &Path) -> Result<()>;
}

/// In-memory runtime for tests: tracks which services are "running" per
/// workspace and records every call.
#[derive(Default)]
pub struct MockRuntime {
    calls: Mutex<Vec<String>>,
    running: Mutex<HashMap<PathBuf, Vec<String>>>,
    fail_build: Mutex<bool>,
    fail_up: Mutex<bool>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `build` calls fail.
    pub fn fail_next_builds(&self) {
        *self.fail_build.lock().expect("mock lock poisoned") = true;
    }

    /// Make subsequent `up` calls fail.
    pub fn fail_next_ups(&self) {
        *self.fail_up.lock().expect("mock lock poisoned") = true;
    }

    /// Every call recorded so far, as `"<verb> <workspace>"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock lock poisoned").clone()
    }

    fn record(&self, verb: &str, workspace: &Path) {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .push(format!("{} {}", verb, workspace.display()));
    }

    /// Service names declared by the workspace's rendered compose file.
    fn declared_services(workspace: &Path) -> Result<Vec<String>> {
        let path = workspace.join(crate::command::COMPOSE_FILE);
        let content = std::fs::read_to_string(&path)?;
        let doc: serde_yaml_ng::Value = serde_yaml_ng::from_str(&content)?;
        let services = doc
            .get("services")
            .and_then(|s| s.as_mapping())
            .ok_or_else(|| {
                HovelError::QueryFailed(format!("no services in {}", path.display()))
            })?;
        Ok(services
            .keys()
            .filter_map(|k| k.as_str().map(String::from))
            .collect())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn build(&self, workspace: &Path) -> Result<()> {
        self.record("build", workspace);
        if *self.fail_build.lock().expect("mock lock poisoned") {
            return Err(HovelError::BuildFailed("mock build failure".to_string()));
        }
        Ok(())
    }

    async fn up(&self, workspace: &Path, services: &[String]) -> Result<()> {
        self.record("up", workspace);
        if *self.fail_up.lock().expect("mock lock poisoned") {
            return Err(HovelError::StartFailed("mock up failure".to_string()));
        }
        let started = if services.is_empty() {
            Self::declared_services(workspace)?
        } else {
            services.to_vec()
        };
        let mut running = self.running.lock().expect("mock lock poisoned");
        let entry = running.entry(workspace.to_path_buf()).or_default();
        for service in started {
            if !entry.contains(&service) {
                entry.push(service);
            }
        }
        Ok(())
    }

    async fn down(&self, workspace: &Path) -> Result<()> {
        self.record("down", workspace);
        self.running
            .lock()
            .expect("mock lock poisoned")
            .remove(workspace);
        Ok(())
    }

    async fn restart(&self, workspace: &Path) -> Result<()> {
        self.record("restart", workspace);
        self.down(workspace).await?;
        self.up(workspace, &[]).await
    }

    async fn status(&self, workspace: &Path) -> Result<Vec<ServiceStatus>> {
        self.record("status", workspace);
        let running = self.running.lock().expect("mock lock poisoned");
        let live = running.get(workspace).cloned().unwrap_or_default();
        let declared = Self::declared_services(workspace)?;
        Ok(declared
            .into_iter()
            .map(|service| {
                let state = if live.contains(&service) {
                    ServiceState::Running
                } else {
                    ServiceState::Stopped
                };
                ServiceStatus { service, state }
            })
            .collect())
    }

    async fn logs(&self, workspace: &Path, lines: u32) -> Result<String> {
        self.record("logs", workspace);
        Ok(format!("mock logs ({} lines)", lines))
    }

    async fn exec(&self, workspace: &Path, service: &str, cmd: &[String]) -> Result<ExecHandle> {
        self.record(&format!("exec {} {}", service, cmd.join(" ")), workspace);
        let running = self.running.lock().expect("mock lock poisoned");
        let live = running.get(workspace).cloned().unwrap_or_default();
        if !live.contains(&service.to_string()) {
            return Err(HovelError::NotRunning(service.to_string()));
        }
        Ok(ExecHandle::detached())
    }

    async fn purge(&self, workspace: &Path) -> Result<()> {
        self.record("purge", workspace);
        self.running
            .lock()
            .expect("mock lock poisoned")
            .remove(workspace);
        Ok(())
    }
}
