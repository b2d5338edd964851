//! Web-terminal sessions inside branch containers.
//!
//! A session is a `ttyd` process started inside the branch's primary
//! service, exposing the configured command-line tool on the branch's
//! derived terminal port. Sessions are one-shot (`ttyd -o` exits on client
//! disconnect); stale records are expected and simply overwritten by the
//! next start.

use chrono::Utc;
use tracing::info;

use hovel_core::error::{HovelError, Result};

use crate::branch::{Branch, BranchStatus, TerminalSession};
use crate::engine::BranchEngine;

pub struct TerminalSessionManager {
    engine: BranchEngine,
    host: String,
    tool_command: String,
}

impl TerminalSessionManager {
    pub fn new(engine: BranchEngine) -> Self {
        let settings = engine.settings();
        Self {
            host: settings.advertised_host.clone(),
            tool_command: settings.ttyd_command.clone(),
            engine,
        }
    }

    /// Start a terminal session in a running branch and persist the session
    /// record into the branch sidecar.
    pub async fn start(&self, branch_name: &str) -> Result<(Branch, TerminalSession)> {
        let lock = self.engine.lock_for(branch_name);
        let _guard = lock.lock().await;

        let mut branch = self.engine.registry().get(branch_name)?;
        if branch.status != BranchStatus::Running {
            return Err(HovelError::NotRunning(branch_name.to_string()));
        }

        let primary = branch
            .services
            .first()
            .cloned()
            .ok_or_else(|| HovelError::Internal("branch has no services".to_string()))?;
        let service_key = self.engine.compose_service_key(&branch, &primary)?;

        let ttyd_port = branch.derived_ttyd_port();
        let mut command: Vec<String> = vec![
            "ttyd".to_string(),
            "-o".to_string(),
            "-W".to_string(),
            "-p".to_string(),
            ttyd_port.to_string(),
        ];
        command.extend(self.tool_command.split_whitespace().map(String::from));

        let workspace = self.engine.workspace_dir(branch_name);
        let handle = self
            .engine
            .runtime()
            .exec(&workspace, &service_key, &command)
            .await
            .map_err(|e| match e {
                HovelError::NotRunning(s) => HovelError::NotRunning(s),
                other => HovelError::SessionStartFailed(other.to_string()),
            })?;

        let session = TerminalSession {
            port: ttyd_port,
            url: format!("http://{}:{}", self.host, ttyd_port),
            started_at: Utc::now(),
            command: command.join(" "),
        };

        branch.ttyd_port = Some(ttyd_port);
        branch.terminal_session = Some(session.clone());
        self.engine.registry().save(&branch)?;

        info!(
            branch = %branch_name,
            service = %service_key,
            port = ttyd_port,
            pid = ?handle.id(),
            "terminal session started"
        );
        Ok((branch, session))
    }
}
