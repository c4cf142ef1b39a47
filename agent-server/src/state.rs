//! Shared application state for the API server.

use std::sync::Arc;

use crate::orchestrator::Orchestrator;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
