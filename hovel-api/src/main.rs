use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use hovel_api::create_app;
use hovel_compose::{ComposeController, ComposeTimeouts};
use hovel_core::{Settings, tracing_init};
use hovel_engine::{BranchEngine, GeminiValidator, GitVcs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init::init()?;

    let settings = Settings::from_env();
    info!(
        "Configuration loaded: bind_addr={}, template={}, workspaces={}",
        settings.bind_addr(),
        settings.template_path.display(),
        settings.workspaces_root.display()
    );

    let runtime = Arc::new(ComposeController::new(ComposeTimeouts::with_build_timeout(
        settings.build_timeout_secs,
    ))?);
    let credentials = Arc::new(GeminiValidator::new(settings.gemini_api_base.clone()));
    let vcs = Arc::new(GitVcs::new(std::env::current_dir()?));

    let engine = BranchEngine::new(settings.clone(), runtime, credentials, vcs)?;

    info!("Recovering branches from workspace scan...");
    engine.recover().await?;

    let app = create_app(engine);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr()).await?;
    info!("Listening on http://{}", settings.bind_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
