use std::sync::Arc;

use hovel_engine::{BranchEngine, TerminalSessionManager};

#[derive(Clone)]
pub struct AppState {
    pub engine: BranchEngine,
    pub terminal: Arc<TerminalSessionManager>,
}

impl AppState {
    pub fn new(engine: BranchEngine) -> Self {
        Self {
            terminal: Arc::new(TerminalSessionManager::new(engine.clone())),
            engine,
        }
    }
}
