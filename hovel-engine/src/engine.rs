//! Branch lifecycle orchestration.
//!
//! `BranchEngine` ties the registry, port allocator, template renderer,
//! credential validator, git adapter and container runtime together and
//! enforces the lifecycle invariants. Per-branch operations are serialized
//! by a lazily-allocated lock per branch name; entries are never removed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{error, info, warn};

use hovel_compose::{ContainerRuntime, ServiceState, ServiceStatus};
use hovel_core::error::{HovelError, Result};
use hovel_core::fs::remove_tree_if_exists;
use hovel_core::settings::Settings;
use hovel_core::validation::validate_branch_name;

use crate::branch::{Branch, BranchStatus, CreateBranchRequest};
use crate::credential::CredentialValidator;
use crate::git::Vcs;
use crate::ports::PortAllocator;
use crate::registry::Registry;
use crate::template;

/// Service included when a create request names none.
const DEFAULT_SERVICE: &str = "app";

/// Aggregate container view returned by the status operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BranchStatusReport {
    pub branch: Branch,
    pub container_status: String,
    pub per_service: Vec<ServiceStatus>,
}

#[derive(Clone)]
pub struct BranchEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    settings: Settings,
    registry: Registry,
    ports: PortAllocator,
    runtime: Arc<dyn ContainerRuntime>,
    credentials: Arc<dyn CredentialValidator>,
    vcs: Arc<dyn Vcs>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    build_slots: Arc<Semaphore>,
}

impl BranchEngine {
    pub fn new(
        settings: Settings,
        runtime: Arc<dyn ContainerRuntime>,
        credentials: Arc<dyn CredentialValidator>,
        vcs: Arc<dyn Vcs>,
    ) -> Result<Self> {
        fs::create_dir_all(&settings.workspaces_root)?;
        let root = settings.workspaces_root.canonicalize()?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                ports: PortAllocator::new(settings.base_branch_port, settings.max_branch_port),
                registry: Registry::new(root),
                build_slots: Arc::new(Semaphore::new(settings.build_concurrency.max(1))),
                settings,
                runtime,
                credentials,
                vcs,
                locks: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.inner.runtime
    }

    pub(crate) fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.inner.locks.lock().expect("branch lock map poisoned");
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Rebuild in-memory state from the workspace scan and reconcile
    /// persisted statuses against actual container liveness.
    pub async fn recover(&self) -> Result<()> {
        let branches = self.inner.registry.list()?;
        info!(count = branches.len(), "recovering branches from workspace scan");

        for mut branch in branches {
            let name = branch.branch_name.clone();

            if branch.status == BranchStatus::Deleting {
                warn!(branch = %name, "resuming interrupted deletion");
                let workspace = self.inner.registry.branch_dir(&name);
                if let Err(e) = self.inner.runtime.purge(&workspace).await {
                    warn!(branch = %name, error = %e, "purge during recovery failed");
                }
                let _ = self.inner.vcs.delete_branch(&name).await;
                self.inner.registry.delete(&name)?;
                continue;
            }

            self.inner.ports.reserve(branch.port);

            let workspace = self.inner.registry.branch_dir(&name);
            let statuses = match self.inner.runtime.status(&workspace).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(branch = %name, error = %e, "status query during recovery failed");
                    continue;
                }
            };
            let any_running = statuses.iter().any(|s| s.state == ServiceState::Running);

            let reconciled = match (branch.status, any_running) {
                (BranchStatus::Running, false) => Some(BranchStatus::Stopped),
                // The controller died mid-build; the group never came up.
                (BranchStatus::Building, false) => Some(BranchStatus::Failed),
                (BranchStatus::Building, true) => Some(BranchStatus::Running),
                (BranchStatus::Created, true)
                | (BranchStatus::Stopped, true)
                | (BranchStatus::Failed, true) => Some(BranchStatus::Running),
                _ => None,
            };

            if let Some(status) = reconciled {
                info!(branch = %name, from = %branch.status, to = %status, "reconciled status");
                branch.status = status;
                self.inner.registry.save(&branch)?;
            }
        }

        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Branch>> {
        self.inner.registry.list()
    }

    pub fn get(&self, name: &str) -> Result<Branch> {
        self.inner.registry.get(name)
    }

    /// Create a branch: validate, allocate a port, cut the git branch,
    /// render the workspace, persist, and optionally schedule a background
    /// build-and-up job.
    pub async fn create(&self, req: CreateBranchRequest) -> Result<Branch> {
        validate_branch_name(&req.branch_name)?;
        if req.gemini_api_key.trim().is_empty() {
            return Err(HovelError::InvalidRequest(
                "gemini_api_key is required".to_string(),
            ));
        }

        let services = if req.services.is_empty() {
            vec![DEFAULT_SERVICE.to_string()]
        } else {
            req.services.clone()
        };
        let declared = template::declared_services(&self.inner.settings.template_path)?;
        for service in &services {
            if !declared.iter().any(|d| d.eq_ignore_ascii_case(service)) {
                return Err(HovelError::UnknownService(service.clone()));
            }
        }

        let lock = self.lock_for(&req.branch_name);
        let _guard = lock.lock().await;

        if self.inner.registry.exists(&req.branch_name) {
            return Err(HovelError::Conflict("branch exists".to_string()));
        }

        self.inner.credentials.validate(&req.gemini_api_key).await?;

        let port = self.inner.ports.allocate()?;

        if let Err(e) = self.inner.vcs.create_branch(&req.branch_name).await {
            self.inner.ports.release(port);
            return Err(e);
        }

        let workspace = self.inner.registry.branch_dir(&req.branch_name);
        let substitutions =
            template::branch_substitutions(&req.branch_name, port, &req.gemini_api_key);
        if let Err(e) = template::render(
            &self.inner.settings.template_path,
            &workspace,
            &substitutions,
            &services,
        ) {
            self.compensate_create(&req.branch_name, port, &workspace).await;
            return Err(e);
        }

        let mut branch = Branch {
            branch_name: req.branch_name.clone(),
            port,
            ttyd_port: None,
            workspace_path: workspace.clone(),
            services,
            status: BranchStatus::Created,
            created_at: Utc::now(),
            gemini_api_validated: true,
            terminal_session: None,
        };
        if let Err(e) = self.inner.registry.save(&branch) {
            self.compensate_create(&req.branch_name, port, &workspace).await;
            return Err(e);
        }

        if req.auto_start {
            branch.status = BranchStatus::Building;
            self.inner.registry.save(&branch)?;
            self.spawn_build_job(branch.branch_name.clone());
        }

        info!(branch = %branch.branch_name, port, status = %branch.status, "branch created");
        Ok(branch)
    }

    /// Undo the side effects of a partially completed create.
    async fn compensate_create(&self, name: &str, port: u16, workspace: &Path) {
        self.inner.ports.release(port);
        let _ = self.inner.vcs.delete_branch(name).await;
        if let Err(e) = remove_tree_if_exists(workspace) {
            warn!(branch = %name, error = %e, "could not remove partial workspace");
        }
    }

    /// Background build-and-up. The creating request has already returned;
    /// this transitions the branch to running or failed.
    fn spawn_build_job(&self, name: String) {
        let engine = self.clone();
        tokio::task::spawn(async move {
            let _permit = match engine.inner.build_slots.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            let lock = engine.lock_for(&name);
            let _guard = lock.lock().await;

            // The branch may have been deleted or moved on while queued.
            let mut branch = match engine.inner.registry.get(&name) {
                Ok(b) => b,
                Err(_) => return,
            };
            if branch.status != BranchStatus::Building {
                return;
            }

            let workspace = engine.inner.registry.branch_dir(&name);
            let result = async {
                engine.inner.runtime.build(&workspace).await?;
                engine.inner.runtime.up(&workspace, &[]).await
            }
            .await;

            branch.status = match result {
                Ok(()) => {
                    info!(branch = %name, "background build finished, containers up");
                    BranchStatus::Running
                }
                Err(e) => {
                    error!(branch = %name, error = %e, "background build failed");
                    BranchStatus::Failed
                }
            };
            if let Err(e) = engine.inner.registry.save(&branch) {
                error!(branch = %name, error = %e, "could not persist build outcome");
            }
        });
    }

    /// Tear down containers, git branch and workspace. Container and git
    /// failures are logged, not fatal; the registry entry always goes.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut branch = self.inner.registry.get(name)?;
        branch.status = BranchStatus::Deleting;
        self.inner.registry.save(&branch)?;

        let workspace = self.inner.registry.branch_dir(name);
        if let Err(e) = self.inner.runtime.purge(&workspace).await {
            warn!(branch = %name, error = %e, "container teardown during delete failed");
        }
        let _ = self.inner.vcs.delete_branch(name).await;

        self.inner.registry.delete(name)?;
        self.inner.ports.release(branch.port);

        info!(branch = %name, port = branch.port, "branch deleted");
        Ok(())
    }

    /// Start the branch's containers, optionally a subset of its services.
    pub async fn start(&self, name: &str, services: &[String]) -> Result<Branch> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut branch = self.inner.registry.get(name)?;
        let workspace = self.inner.registry.branch_dir(name);

        let compose_services = self.resolve_services(&branch, &workspace, services)?;
        self.inner.runtime.up(&workspace, &compose_services).await?;

        branch.status = BranchStatus::Running;
        self.inner.registry.save(&branch)?;
        Ok(branch)
    }

    pub async fn stop(&self, name: &str) -> Result<Branch> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut branch = self.inner.registry.get(name)?;
        let workspace = self.inner.registry.branch_dir(name);
        self.inner.runtime.down(&workspace).await?;

        branch.status = BranchStatus::Stopped;
        self.inner.registry.save(&branch)?;
        Ok(branch)
    }

    pub async fn restart(&self, name: &str) -> Result<Branch> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut branch = self.inner.registry.get(name)?;
        let workspace = self.inner.registry.branch_dir(name);
        self.inner.runtime.restart(&workspace).await?;

        branch.status = BranchStatus::Running;
        self.inner.registry.save(&branch)?;
        Ok(branch)
    }

    /// Live per-service container states plus an aggregate.
    pub async fn status(&self, name: &str) -> Result<BranchStatusReport> {
        let branch = self.inner.registry.get(name)?;
        let workspace = self.inner.registry.branch_dir(name);
        let per_service = self.inner.runtime.status(&workspace).await?;

        Ok(BranchStatusReport {
            container_status: aggregate_state(&per_service).to_string(),
            branch,
            per_service,
        })
    }

    pub async fn logs(&self, name: &str, lines: u32) -> Result<String> {
        if !self.inner.registry.exists(name) {
            return Err(HovelError::NotFound(name.to_string()));
        }
        let workspace = self.inner.registry.branch_dir(name);
        self.inner.runtime.logs(&workspace, lines).await
    }

    /// Map requested base service names onto the compose service keys of
    /// the rendered workspace. Empty input means all services.
    fn resolve_services(
        &self,
        branch: &Branch,
        workspace: &Path,
        requested: &[String],
    ) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        for service in requested {
            if !branch
                .services
                .iter()
                .any(|s| s.eq_ignore_ascii_case(service))
            {
                return Err(HovelError::UnknownService(service.clone()));
            }
        }

        let rendered = template::rendered_services(workspace)?;
        let mut resolved = Vec::with_capacity(requested.len());
        for service in requested {
            let key = rendered
                .iter()
                .find(|name| {
                    template::strip_service_suffix(name, &branch.branch_name)
                        .eq_ignore_ascii_case(service)
                })
                .ok_or_else(|| HovelError::UnknownService(service.clone()))?;
            resolved.push(key.clone());
        }
        Ok(resolved)
    }

    /// Compose service key for a branch's base service name.
    pub(crate) fn compose_service_key(&self, branch: &Branch, base: &str) -> Result<String> {
        let workspace = self.inner.registry.branch_dir(&branch.branch_name);
        let rendered = template::rendered_services(&workspace)?;
        rendered
            .into_iter()
            .find(|name| {
                template::strip_service_suffix(name, &branch.branch_name)
                    .eq_ignore_ascii_case(base)
            })
            .ok_or_else(|| HovelError::UnknownService(base.to_string()))
    }

    pub fn workspace_dir(&self, name: &str) -> PathBuf {
        self.inner.registry.branch_dir(name)
    }
}

/// Collapse per-service states into the single status string the API
/// reports.
fn aggregate_state(per_service: &[ServiceStatus]) -> ServiceState {
    if per_service.iter().any(|s| s.state == ServiceState::Running) {
        return ServiceState::Running;
    }
    if per_service.iter().any(|s| s.state == ServiceState::Restarting) {
        return ServiceState::Restarting;
    }
    if per_service.is_empty() {
        return ServiceState::Stopped;
    }
    if per_service.iter().all(|s| s.state == ServiceState::Exited) {
        return ServiceState::Exited;
    }
    if per_service
        .iter()
        .all(|s| matches!(s.state, ServiceState::Stopped | ServiceState::Exited))
    {
        return ServiceState::Stopped;
    }
    ServiceState::Unknown
}
