//! Filesystem-backed branch registry.
//!
//! Each branch owns a subdirectory of the workspaces root; its `.branch`
//! sidecar holds the JSON branch record and is the source of truth. There
//! is no in-memory mirror: every read scans the filesystem, every write
//! lands atomically on disk, so a crashed controller recovers by rescanning.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use hovel_core::error::{HovelError, Result};
use hovel_core::fs::{remove_tree_if_exists, write_json_atomic};

use crate::branch::Branch;

/// Sidecar file name inside each branch workspace.
pub const BRANCH_FILE: &str = ".branch";

#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
}

impl Registry {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace directory for a branch name.
    pub fn branch_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn branch_file(&self, name: &str) -> PathBuf {
        self.branch_dir(name).join(BRANCH_FILE)
    }

    /// A branch is registered iff its sidecar exists.
    pub fn exists(&self, name: &str) -> bool {
        self.branch_file(name).is_file()
    }

    pub fn get(&self, name: &str) -> Result<Branch> {
        let path = self.branch_file(name);
        if !path.is_file() {
            return Err(HovelError::NotFound(name.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist a branch record atomically.
    pub fn save(&self, branch: &Branch) -> Result<()> {
        write_json_atomic(&self.branch_file(&branch.branch_name), branch)
    }

    /// Remove the branch directory tree. Missing paths are not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        remove_tree_if_exists(&self.branch_dir(name))
    }

    /// Enumerate all registered branches, sorted by name. Directories
    /// without a readable sidecar are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Branch>> {
        let mut branches = Vec::new();

        if !self.root.is_dir() {
            return Ok(branches);
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match self.get(&name) {
                Ok(branch) => branches.push(branch),
                Err(HovelError::NotFound(_)) => {
                    warn!(branch = %name, "directory without .branch sidecar, skipping");
                }
                Err(e) => {
                    warn!(branch = %name, error = %e, "unreadable .branch sidecar, skipping");
                }
            }
        }

        branches.sort_by(|a, b| a.branch_name.cmp(&b.branch_name));
        Ok(branches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::BranchStatus;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_branch(root: &Path, name: &str, port: u16) -> Branch {
        Branch {
            branch_name: name.to_string(),
            port,
            ttyd_port: None,
            workspace_path: root.join(name),
            services: vec!["app".to_string()],
            status: BranchStatus::Created,
            created_at: Utc::now(),
            gemini_api_validated: true,
            terminal_session: None,
        }
    }

    #[test]
    fn test_save_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().to_path_buf());
        let branch = sample_branch(dir.path(), "alpha", 8001);

        registry.save(&branch).unwrap();

        let loaded = registry.get("alpha").unwrap();
        assert_eq!(loaded.branch_name, "alpha");
        assert_eq!(loaded.port, 8001);
        assert_eq!(loaded.status, BranchStatus::Created);
        assert!(registry.exists("alpha"));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().to_path_buf());

        assert!(matches!(
            registry.get("ghost"),
            Err(HovelError::NotFound(_))
        ));
        assert!(!registry.exists("ghost"));
    }

    #[test]
    fn test_list_skips_directories_without_sidecar() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().to_path_buf());

        registry.save(&sample_branch(dir.path(), "alpha", 8001)).unwrap();
        registry.save(&sample_branch(dir.path(), "beta", 8002)).unwrap();
        fs::create_dir(dir.path().join("stray")).unwrap();
        fs::write(dir.path().join("loose-file"), "x").unwrap();

        let branches = registry.list().unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].branch_name, "alpha");
        assert_eq!(branches[1].branch_name, "beta");
    }

    #[test]
    fn test_list_skips_corrupt_sidecar() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().to_path_buf());

        registry.save(&sample_branch(dir.path(), "good", 8001)).unwrap();
        fs::create_dir(dir.path().join("bad")).unwrap();
        fs::write(dir.path().join("bad").join(BRANCH_FILE), "not json").unwrap();

        let branches = registry.list().unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].branch_name, "good");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().to_path_buf());

        registry.save(&sample_branch(dir.path(), "alpha", 8001)).unwrap();
        registry.delete("alpha").unwrap();
        registry.delete("alpha").unwrap();

        assert!(!registry.exists("alpha"));
        assert!(!dir.path().join("alpha").exists());
    }

    #[test]
    fn test_list_on_missing_root() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().join("never-created"));
        assert!(registry.list().unwrap().is_empty());
    }
}
