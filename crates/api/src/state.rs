use std::sync::Arc;

use shellgate_core::definitions::{ScriptLoader, TokenLoader};
use shellgate_core::lock::{LockService, StateStore};
use shellgate_core::process::ProcessRunner;

use crate::config::ServerConfig;
use crate::scripting::ScriptOrchestrator;
use crate::ws::ConnectionHub;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Resolves bearer tokens for authentication.
    pub tokens: Arc<TokenLoader>,
    /// Pairs streaming invocations with websocket listeners.
    pub hub: Arc<ConnectionHub>,
    pub orchestrator: Arc<ScriptOrchestrator>,
}

impl AppState {
    /// Wire the services from `config`, the lock store and the process runner.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn StateStore>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let hub = Arc::new(ConnectionHub::new(config.rendezvous));
        let orchestrator = ScriptOrchestrator::new(
            ScriptLoader::new(&config.scripts_dir),
            LockService::new(store),
            runner,
            Arc::clone(&hub),
            config.execution.clone(),
        );

        Self {
            tokens: Arc::new(TokenLoader::new(&config.tokens_dir)),
            config: Arc::new(config),
            hub,
            orchestrator: Arc::new(orchestrator),
        }
    }
}
