use std::sync::Arc;

use crate::analysis::Analyzer;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Pluggable analyzer. Production wires `Orchestrator<ProviderResolver>`.
    pub analyzer: Arc<dyn Analyzer>,
}
