//! Integration tests for the branch lifecycle engine over a mock container
//! runtime and temp-directory template/workspace roots.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hovel_compose::ContainerRuntime;
use hovel_core::error::{HovelError, Result};
use hovel_engine::template::COMPOSE_OUTPUT_FILE;
use hovel_engine::test_utils::{FailingVcs, TestContext};
use hovel_engine::{
    Branch, BranchEngine, BranchStatus, CreateBranchRequest, TerminalSessionManager, Vcs,
    TEST_API_KEY,
};

fn create_request(name: &str) -> CreateBranchRequest {
    CreateBranchRequest {
        branch_name: name.to_string(),
        services: Vec::new(),
        gemini_api_key: TEST_API_KEY.to_string(),
        auto_start: false,
    }
}

async fn wait_for_status(engine: &BranchEngine, name: &str, status: BranchStatus) -> Branch {
    for _ in 0..100 {
        let branch = engine.get(name).expect("branch disappeared while waiting");
        if branch.status == status {
            return branch;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("branch {} never reached status {}", name, status);
}

#[tokio::test]
async fn test_create_with_defaults() {
    let ctx = TestContext::new();

    let branch = ctx.engine.create(create_request("alpha")).await.unwrap();

    assert_eq!(branch.branch_name, "alpha");
    assert_eq!(branch.port, 8001);
    assert_eq!(branch.services, vec!["app".to_string()]);
    assert_eq!(branch.status, BranchStatus::Created);
    assert!(branch.gemini_api_validated);
    assert!(branch.ttyd_port.is_none());

    let workspace = ctx.workspaces_dir.path().join("alpha");
    assert!(workspace.join(".branch").is_file());

    let compose = fs::read_to_string(workspace.join(COMPOSE_OUTPUT_FILE)).unwrap();
    assert!(compose.contains("app-alpha"));
    assert!(!compose.contains("db-alpha"));
    assert!(compose.contains("8001:8000"));

    let env = fs::read_to_string(workspace.join(".env")).unwrap();
    assert!(env.lines().any(|l| l == "PORT=8001"));

    let settings = fs::read_to_string(workspace.join(".gemini/settings.json")).unwrap();
    assert!(settings.contains(TEST_API_KEY));
}

#[tokio::test]
async fn test_create_allocates_sequential_ports() {
    let ctx = TestContext::new();

    let alpha = ctx.engine.create(create_request("alpha")).await.unwrap();
    let beta = ctx.engine.create(create_request("beta")).await.unwrap();

    assert_eq!(alpha.port, 8001);
    assert_eq!(beta.port, 8002);
}

#[tokio::test]
async fn test_create_multi_service() {
    let ctx = TestContext::new();

    let mut req = create_request("beta");
    req.services = vec!["app".to_string(), "db".to_string()];
    let branch = ctx.engine.create(req).await.unwrap();

    assert_eq!(branch.services, vec!["app".to_string(), "db".to_string()]);

    let compose = fs::read_to_string(
        ctx.workspaces_dir.path().join("beta").join(COMPOSE_OUTPUT_FILE),
    )
    .unwrap();
    assert!(compose.contains("app-beta"));
    assert!(compose.contains("db-beta"));
}

#[tokio::test]
async fn test_create_unknown_service_leaves_no_trace() {
    let ctx = TestContext::new();

    let mut req = create_request("gamma");
    req.services = vec!["app".to_string(), "nope".to_string()];
    let err = ctx.engine.create(req).await.unwrap_err();

    match err {
        HovelError::UnknownService(s) => assert_eq!(s, "nope"),
        other => panic!("expected UnknownService, got {other}"),
    }
    assert!(!ctx.workspaces_dir.path().join("gamma").exists());

    // The failed attempt burned no port.
    let next = ctx.engine.create(create_request("delta")).await.unwrap();
    assert_eq!(next.port, 8001);
}

#[tokio::test]
async fn test_create_duplicate_conflicts() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();

    let err = ctx.engine.create(create_request("alpha")).await.unwrap_err();
    match err {
        HovelError::Conflict(msg) => assert_eq!(msg, "branch exists"),
        other => panic!("expected Conflict, got {other}"),
    }
}

#[tokio::test]
async fn test_create_rejects_bad_names_and_empty_key() {
    let ctx = TestContext::new();

    let mut req = create_request("bad/name");
    req.branch_name = "bad/name".to_string();
    assert!(matches!(
        ctx.engine.create(req).await,
        Err(HovelError::InvalidRequest(_))
    ));

    let mut req = create_request("alpha");
    req.gemini_api_key = "".to_string();
    assert!(matches!(
        ctx.engine.create(req).await,
        Err(HovelError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_vcs_failure_releases_port_and_workspace() {
    let ctx = TestContext::with_vcs(Arc::new(FailingVcs));

    let err = ctx.engine.create(create_request("alpha")).await.unwrap_err();
    assert!(matches!(err, HovelError::Vcs(_)));
    assert!(!ctx.workspaces_dir.path().join("alpha").exists());
    assert!(ctx.engine.list().unwrap().is_empty());
}

/// Git adapter that fails while its flag is set, to observe the port
/// compensation from the outside.
#[derive(Default)]
struct FlakyVcs {
    fail: AtomicBool,
}

#[async_trait]
impl Vcs for FlakyVcs {
    async fn create_branch(&self, name: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HovelError::Vcs(format!("flaky failure for {}", name)));
        }
        Ok(())
    }

    async fn delete_branch(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_port_reusable_after_vcs_compensation() {
    let vcs = Arc::new(FlakyVcs::default());
    let ctx = TestContext::with_vcs(vcs.clone());

    vcs.fail.store(true, Ordering::SeqCst);
    assert!(ctx.engine.create(create_request("alpha")).await.is_err());

    vcs.fail.store(false, Ordering::SeqCst);
    let branch = ctx.engine.create(create_request("alpha")).await.unwrap();
    assert_eq!(branch.port, 8001);
}

#[tokio::test]
async fn test_auto_start_builds_in_background() {
    let ctx = TestContext::new();

    let mut req = create_request("alpha");
    req.auto_start = true;
    let branch = ctx.engine.create(req).await.unwrap();
    assert_eq!(branch.status, BranchStatus::Building);

    let branch = wait_for_status(&ctx.engine, "alpha", BranchStatus::Running).await;
    assert_eq!(branch.port, 8001);

    let calls = ctx.runtime.calls();
    assert!(calls.iter().any(|c| c.starts_with("build ")));
    assert!(calls.iter().any(|c| c.starts_with("up ")));
}

#[tokio::test]
async fn test_failed_build_keeps_workspace_for_inspection() {
    let ctx = TestContext::new();
    ctx.runtime.fail_next_builds();

    let mut req = create_request("alpha");
    req.auto_start = true;
    ctx.engine.create(req).await.unwrap();

    wait_for_status(&ctx.engine, "alpha", BranchStatus::Failed).await;
    assert!(ctx.workspaces_dir.path().join("alpha").join(".branch").is_file());
}

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();

    let branch = ctx.engine.start("alpha", &[]).await.unwrap();
    assert_eq!(branch.status, BranchStatus::Running);

    let report = ctx.engine.status("alpha").await.unwrap();
    assert_eq!(report.container_status, "running");

    let branch = ctx.engine.stop("alpha").await.unwrap();
    assert_eq!(branch.status, BranchStatus::Stopped);

    // Stopping an already stopped branch succeeds.
    let branch = ctx.engine.stop("alpha").await.unwrap();
    assert_eq!(branch.status, BranchStatus::Stopped);

    // Starting a running branch succeeds too.
    ctx.engine.start("alpha", &[]).await.unwrap();
    let branch = ctx.engine.start("alpha", &[]).await.unwrap();
    assert_eq!(branch.status, BranchStatus::Running);
}

#[tokio::test]
async fn test_start_with_service_subset() {
    let ctx = TestContext::new();
    let mut req = create_request("alpha");
    req.services = vec!["app".to_string(), "db".to_string()];
    ctx.engine.create(req).await.unwrap();

    ctx.engine
        .start("alpha", &["db".to_string()])
        .await
        .unwrap();

    let report = ctx.engine.status("alpha").await.unwrap();
    let db = report
        .per_service
        .iter()
        .find(|s| s.service == "db-alpha")
        .unwrap();
    assert_eq!(db.state.to_string(), "running");
    let app = report
        .per_service
        .iter()
        .find(|s| s.service == "app-alpha")
        .unwrap();
    assert_eq!(app.state.to_string(), "stopped");
}

#[tokio::test]
async fn test_start_rejects_service_outside_branch_set() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();

    let err = ctx
        .engine
        .start("alpha", &["db".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, HovelError::UnknownService(_)));
}

#[tokio::test]
async fn test_restart_marks_running() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();

    let branch = ctx.engine.restart("alpha").await.unwrap();
    assert_eq!(branch.status, BranchStatus::Running);
}

#[tokio::test]
async fn test_logs_requires_existing_branch() {
    let ctx = TestContext::new();

    assert!(matches!(
        ctx.engine.logs("ghost", 100).await,
        Err(HovelError::NotFound(_))
    ));

    ctx.engine.create(create_request("alpha")).await.unwrap();
    let logs = ctx.engine.logs("alpha", 25).await.unwrap();
    assert!(logs.contains("25"));
}

#[tokio::test]
async fn test_delete_frees_name_and_port() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();

    ctx.engine.delete("alpha").await.unwrap();

    assert!(!ctx.workspaces_dir.path().join("alpha").exists());
    assert!(matches!(
        ctx.engine.get("alpha"),
        Err(HovelError::NotFound(_))
    ));

    // Name and port are reusable.
    let branch = ctx.engine.create(create_request("alpha")).await.unwrap();
    assert_eq!(branch.port, 8001);
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let ctx = TestContext::new();
    assert!(matches!(
        ctx.engine.delete("ghost").await,
        Err(HovelError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_registry_survives_engine_restart() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();

    let restarted = ctx.restarted_engine();
    restarted.recover().await.unwrap();

    let branches = restarted.list().unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].branch_name, "alpha");
    assert_eq!(branches[0].port, 8001);

    // The recovered allocator must not hand out alpha's port again.
    let beta = restarted.create(create_request("beta")).await.unwrap();
    assert_eq!(beta.port, 8002);
}

#[tokio::test]
async fn test_recover_reconciles_dead_containers() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();
    ctx.engine.start("alpha", &[]).await.unwrap();

    // Containers vanish behind the engine's back.
    let workspace = ctx.engine.workspace_dir("alpha");
    ctx.runtime.down(&workspace).await.unwrap();

    let restarted = ctx.restarted_engine();
    restarted.recover().await.unwrap();

    let branch = restarted.get("alpha").unwrap();
    assert_eq!(branch.status, BranchStatus::Stopped);
}

#[tokio::test]
async fn test_terminal_session_round_trip() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();
    ctx.engine.start("alpha", &[]).await.unwrap();

    let terminal = TerminalSessionManager::new(ctx.engine.clone());
    let (branch, session) = terminal.start("alpha").await.unwrap();

    assert_eq!(session.port, 9001);
    assert_eq!(session.url, "http://localhost:9001");
    assert_eq!(session.command, "ttyd -o -W -p 9001 gemini");

    assert_eq!(branch.ttyd_port, Some(9001));
    let persisted = ctx.engine.get("alpha").unwrap();
    let persisted_session = persisted.terminal_session.unwrap();
    assert_eq!(persisted_session.port, persisted.port + 1000);
}

#[tokio::test]
async fn test_terminal_session_requires_running_branch() {
    let ctx = TestContext::new();
    ctx.engine.create(create_request("alpha")).await.unwrap();

    let terminal = TerminalSessionManager::new(ctx.engine.clone());
    assert!(matches!(
        terminal.start("alpha").await,
        Err(HovelError::NotRunning(_))
    ));
    assert!(matches!(
        terminal.start("ghost").await,
        Err(HovelError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_distinct_branches_never_share_ports() {
    let ctx = TestContext::new();
    for name in ["a1", "a2", "a3", "a4"] {
        ctx.engine.create(create_request(name)).await.unwrap();
    }

    let branches = ctx.engine.list().unwrap();
    let mut ports: Vec<u16> = branches.iter().map(|b| b.port).collect();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), branches.len());
}
