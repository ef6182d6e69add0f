//! Application state
//!
//! Shared state across all handlers. The registry and the orchestrator are
//! owned here and injected into the router, never reached through globals.

use std::sync::Arc;

use w2lserve_config::Settings;
use w2lserve_engine::SpeechDecoder;

use crate::decode::DecodeService;
use crate::session::SessionRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Settings>,
    /// Session registry (owns the handle pool)
    pub registry: Arc<SessionRegistry>,
    /// Decode orchestrator
    pub decoder: Arc<DecodeService>,
    /// Vocabulary list served by `/tokens`
    pub tokens: Arc<Vec<String>>,
}

impl AppState {
    /// Create new application state over a loaded engine
    pub fn new(config: Settings, engine: Arc<dyn SpeechDecoder>, tokens: Vec<String>) -> Self {
        let registry = Arc::new(SessionRegistry::new(&config.session));
        let decoder = Arc::new(DecodeService::new(Arc::clone(&registry), engine));

        Self {
            config: Arc::new(config),
            registry,
            decoder,
            tokens: Arc::new(tokens),
        }
    }
}
