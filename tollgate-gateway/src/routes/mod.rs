//! Route composition, CORS, and request logging.

use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use http::Method;
use http::header::{CONTENT_TYPE, HeaderName};
use tower_http::cors::{self, CorsLayer};

use crate::state::SharedState;

mod connectors;
mod health;
mod inference;
mod mcp;
mod registry;

/// Builds the gateway router.
pub fn app_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static("x-payment"),
            HeaderName::from_static("x-session-active"),
            HeaderName::from_static("x-session-budget-remaining"),
        ])
        .expose_headers(cors::Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/connectors", get(connectors::list))
        .route("/connectors/{id}", get(connectors::get_one))
        .route("/connectors/{id}/tools", get(connectors::tools))
        .route("/connectors/{id}/call", post(connectors::call))
        .route("/api/inference", post(inference::infer))
        .route("/api/inference/{model_id}", post(inference::infer_model))
        .route("/api/models", get(registry::models_openai_shaped))
        .route("/api/registry/models", get(registry::all_models))
        .route(
            "/api/registry/models/available",
            get(registry::available_models),
        )
        .route("/api/registry/models/{source}", get(registry::models_by_source))
        .route("/api/registry/model/{id}", get(registry::model_by_id))
        .route("/api/registry/refresh", post(registry::refresh))
        .route("/api/mcp/plugins", get(mcp::plugins))
        .route("/api/mcp/tools", get(mcp::tools))
        .route("/api/mcp/status", get(mcp::status))
        .route("/api/mcp/{plugin_id}/tools", get(mcp::plugin_tools))
        .route(
            "/api/mcp/{plugin_id}/tools/{tool_name}",
            get(mcp::plugin_tool),
        )
        .route("/api/mcp/{plugin_id}/execute", post(mcp::execute))
        .route("/api/mcp/servers", get(mcp::servers))
        .route("/api/mcp/servers/{slug}/call", post(mcp::server_call))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state)
}

/// One structured log line per request.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();
    let response = next.run(req).await;
    tracing::info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "request"
    );
    response
}
