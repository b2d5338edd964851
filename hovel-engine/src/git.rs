//! Git branch management for the controller's working tree.
//!
//! Checking out a branch is a global operation on the working tree, so all
//! git invocations are serialized by a single mutex.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

use hovel_core::error::{HovelError, Result};

#[async_trait]
pub trait Vcs: Send + Sync {
    /// Create a branch from the current head and check it out.
    async fn create_branch(&self, name: &str) -> Result<()>;

    /// Delete a branch. Best-effort: a missing branch or failing git is not
    /// an error.
    async fn delete_branch(&self, name: &str) -> Result<()>;
}

pub struct GitVcs {
    repo_root: PathBuf,
    lock: Mutex<()>,
}

impl GitVcs {
    pub fn new(repo_root: PathBuf) -> Self {
        Self {
            repo_root,
            lock: Mutex::new(()),
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| HovelError::Vcs(format!("git not available: {}", e)))
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn create_branch(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        let probe = self.run_git(&["rev-parse", "--git-dir"]).await?;
        if !probe.status.success() {
            return Err(HovelError::Vcs(format!(
                "{} is not a git repository",
                self.repo_root.display()
            )));
        }

        let output = self.run_git(&["checkout", "-b", name]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("already exists") {
                return Err(HovelError::Vcs(format!("git branch {} already exists", name)));
            }
            return Err(HovelError::Vcs(format!(
                "git checkout -b {} failed: {}",
                name,
                stderr.trim()
            )));
        }

        info!(branch = %name, "created and checked out git branch");
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        match self.run_git(&["branch", "-D", name]).await {
            Ok(output) if output.status.success() => {
                info!(branch = %name, "deleted git branch");
            }
            Ok(output) => {
                warn!(
                    branch = %name,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "could not delete git branch"
                );
            }
            Err(e) => {
                warn!(branch = %name, error = %e, "could not delete git branch");
            }
        }
        Ok(())
    }
}
