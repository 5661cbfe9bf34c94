use std::sync::Arc;

use crate::metrics::Metrics;
use crate::runtime::ModelRuntime;
use crate::token_store::TokenStore;

/// Immutable gateway configuration, constructed once at startup. Handlers
/// read it through AppState instead of ambient process state.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub runtime_model: String,
    /// None when token expiration is disabled.
    pub token_ttl_ms: Option<u64>,
    pub log_prompts: bool,
    pub threads: u32,
    pub batch_size: u32,
    pub context_size: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<dyn ModelRuntime>,
    pub tokens: Arc<dyn TokenStore>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<GatewayConfig>,
}
