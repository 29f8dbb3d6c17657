use crate::session::{SessionConfig, SessionCoordinator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Known sessions (session_id → coordinator), kept until deleted
    pub sessions: Arc<RwLock<HashMap<String, Arc<SessionCoordinator>>>>,

    /// Configuration applied to new sessions before request overrides
    pub defaults: Arc<SessionConfig>,
}

impl AppState {
    pub fn new(defaults: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            defaults: Arc::new(defaults),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
