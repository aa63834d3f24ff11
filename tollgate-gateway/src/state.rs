//! Shared application state.

use std::sync::Arc;

use tollgate::gate::PaymentGate;
use tollgate_connectors::ConnectorService;
use tollgate_inference::InferenceRouter;
use tollgate_mcp::SessionPool;
use tollgate_registry::Registry;

/// Everything the route handlers need, shared behind one [`Arc`].
pub struct AppState {
    /// The payment gate bracketing billable routes.
    pub gate: PaymentGate,
    /// The multimodal inference router.
    pub inference: InferenceRouter,
    /// The aggregated model registry.
    pub registry: Arc<Registry>,
    /// The connector catalog and dispatcher.
    pub connectors: ConnectorService,
    /// The MCP session pool.
    pub pool: Arc<SessionPool>,
    /// Externally visible origin used to build resource URLs.
    pub public_base_url: Option<String>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

/// The state handle shared across handlers.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// The resource URL for a request path, preferring the configured
    /// public origin.
    #[must_use]
    pub fn resource_url(&self, path: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}{path}", base.trim_end_matches('/')),
            None => format!("http://localhost{path}"),
        }
    }
}
