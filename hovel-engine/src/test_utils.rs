//! Shared fixtures for engine and API tests.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use hovel_compose::MockRuntime;
use hovel_core::error::{HovelError, Result};
use hovel_core::settings::Settings;

use crate::credential::GeminiValidator;
use crate::engine::BranchEngine;
use crate::git::Vcs;

/// Compose template with two branch-suffixed services, matching the shape
/// of the shipped app template.
pub const TEST_COMPOSE_TEMPLATE: &str = r#"services:
  app-{{BRANCH_NAME}}:
    build: .
    ports:
      - "{{PORT}}:8000"
    environment:
      - BRANCH_NAME={{BRANCH_NAME}}
      - PORT={{PORT}}
  db-{{BRANCH_NAME}}:
    image: postgres:16
networks:
  default:
    name: hovel-{{BRANCH_NAME}}
"#;

/// Git adapter that records nothing and always succeeds.
#[derive(Debug, Default)]
pub struct NoopVcs;

#[async_trait]
impl Vcs for NoopVcs {
    async fn create_branch(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_branch(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

/// Git adapter whose branch creation always fails, for compensation tests.
#[derive(Debug, Default)]
pub struct FailingVcs;

#[async_trait]
impl Vcs for FailingVcs {
    async fn create_branch(&self, name: &str) -> Result<()> {
        Err(HovelError::Vcs(format!(
            "simulated git failure for {}",
            name
        )))
    }

    async fn delete_branch(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

/// Populate `dir` with a minimal app template.
pub fn write_app_template(dir: &Path) {
    fs::write(
        dir.join(crate::template::COMPOSE_TEMPLATE_FILE),
        TEST_COMPOSE_TEMPLATE,
    )
    .expect("write compose template");
    fs::write(dir.join(".env"), "PORT={{PORT}}\nBRANCH_NAME={{BRANCH_NAME}}\n")
        .expect("write env template");
    fs::write(dir.join("app.py"), "PORT = {{PORT}}\n").expect("write app source");
    fs::create_dir_all(dir.join(".gemini")).expect("create gemini dir");
    fs::write(
        dir.join(".gemini/settings.template.json"),
        r#"{"apiKey": "{{GEMINI_API_KEY}}"}"#,
    )
    .expect("write gemini template");
}

/// Engine wired to temp directories, a mock runtime and a no-op git
/// adapter. Keep the context alive for the duration of the test: dropping
/// it removes the temp directories.
pub struct TestContext {
    pub template_dir: TempDir,
    pub workspaces_dir: TempDir,
    pub runtime: Arc<MockRuntime>,
    pub engine: BranchEngine,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_vcs(Arc::new(NoopVcs))
    }

    pub fn with_vcs(vcs: Arc<dyn Vcs>) -> Self {
        let template_dir = TempDir::new().expect("create template dir");
        write_app_template(template_dir.path());
        let workspaces_dir = TempDir::new().expect("create workspaces dir");

        let settings = test_settings(template_dir.path(), workspaces_dir.path());
        let runtime = Arc::new(MockRuntime::new());
        let credentials = Arc::new(GeminiValidator::new(settings.gemini_api_base.clone()));

        let engine = BranchEngine::new(settings, runtime.clone(), credentials, vcs)
            .expect("construct engine");

        Self {
            template_dir,
            workspaces_dir,
            runtime,
            engine,
        }
    }

    /// A second engine over the same directories, simulating a controller
    /// restart.
    pub fn restarted_engine(&self) -> BranchEngine {
        let settings = test_settings(self.template_dir.path(), self.workspaces_dir.path());
        let credentials = Arc::new(GeminiValidator::new(settings.gemini_api_base.clone()));
        BranchEngine::new(settings, self.runtime.clone(), credentials, Arc::new(NoopVcs))
            .expect("construct restarted engine")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn test_settings(template: &Path, workspaces: &Path) -> Settings {
    Settings {
        listen_port: 0,
        advertised_host: "localhost".to_string(),
        template_path: template.to_path_buf(),
        workspaces_root: workspaces.to_path_buf(),
        base_branch_port: 8001,
        max_branch_port: 8999,
        build_concurrency: 2,
        build_timeout_secs: 600,
        ttyd_command: "gemini".to_string(),
        // Unroutable: only the test key's short circuit may be used.
        gemini_api_base: "http://127.0.0.1:1".to_string(),
    }
}
