use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The unit of isolation: one named workspace with its own port, git branch
/// and container group. The `.branch` sidecar in the workspace directory is
/// the source of truth for this record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Branch {
    pub branch_name: String,
    pub port: u16,

    /// Present only while a terminal session exists; always `port + 1000`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttyd_port: Option<u16>,

    #[schema(value_type = String)]
    pub workspace_path: PathBuf,

    /// Service names included in this branch's container group, in template
    /// order. Fixed at creation time.
    pub services: Vec<String>,

    pub status: BranchStatus,
    pub created_at: DateTime<Utc>,
    pub gemini_api_validated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_session: Option<TerminalSession>,
}

impl Branch {
    /// The web-terminal port derived from the branch port.
    pub fn derived_ttyd_port(&self) -> u16 {
        self.port + 1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    Created,
    Building,
    Running,
    Stopped,
    Failed,
    Deleting,
}

impl std::fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BranchStatus::Created => "created",
            BranchStatus::Building => "building",
            BranchStatus::Running => "running",
            BranchStatus::Stopped => "stopped",
            BranchStatus::Failed => "failed",
            BranchStatus::Deleting => "deleting",
        };
        write!(f, "{}", s)
    }
}

/// A web-terminal session inside the branch's primary container.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TerminalSession {
    pub port: u16,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBranchRequest {
    pub branch_name: String,

    /// Subset of the template's services to include; defaults to `app`.
    #[serde(default)]
    pub services: Vec<String>,

    /// Required; defaulted at the serde layer so a missing key surfaces as
    /// a validation error, not a deserialization failure.
    #[serde(default)]
    pub gemini_api_key: String,

    #[serde(default)]
    pub auto_start: bool,
}
