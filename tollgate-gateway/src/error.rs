//! Error mapping into HTTP responses.

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tollgate::error::GatewayError;
use tollgate::gate::GateDenial;
use tollgate_connectors::ConnectorError;
use tollgate_mcp::McpError;

/// Wrapper making [`GatewayError`] an axum response.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}

impl From<McpError> for ApiError {
    fn from(e: McpError) -> Self {
        Self(mcp_to_gateway(e))
    }
}

/// Maps MCP runtime failures onto the gateway error kinds.
pub fn mcp_to_gateway(e: McpError) -> GatewayError {
    match e {
        McpError::Timeout(d) => GatewayError::Timeout(format!("mcp call exceeded {d:?}")),
        McpError::PoolFull(n) => GatewayError::Unavailable(format!("session pool is full ({n})")),
        McpError::SpawnConfig { ref detail, .. } if detail.contains("404") => {
            GatewayError::NotFound(e.to_string())
        }
        McpError::Connect(_) | McpError::Docker { .. } | McpError::SpawnConfig { .. } => {
            GatewayError::Unavailable(e.to_string())
        }
        McpError::Transport(_)
        | McpError::Rpc(_)
        | McpError::SessionClosed
        | McpError::Malformed(_) => GatewayError::Upstream(e.to_string()),
        _ => GatewayError::Internal(e.to_string()),
    }
}

/// Converts connector-surface failures, keeping the structured missing-env
/// body for unavailable connectors.
impl From<ConnectorError> for ApiError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::NotFound(id) => {
                Self(GatewayError::NotFound(format!("connector '{id}'")))
            }
            ConnectorError::Unavailable { id, missing } => Self(GatewayError::Unavailable(
                format!("connector '{id}' missing env: {}", missing.join(", ")),
            )),
            ConnectorError::Mcp(e) => Self(mcp_to_gateway(e)),
        }
    }
}

/// Builds the structured 503 for an unavailable connector.
#[must_use]
pub fn unavailable_connector_response(id: &str, missing: &[String]) -> Response {
    (
        http::StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "unavailable",
            "message": format!("connector '{id}' is not configured"),
            "missingEnv": missing,
        })),
    )
        .into_response()
}

/// Converts a gate denial (402 challenge or 503) into a response.
#[must_use]
pub fn denial_response(denial: GateDenial) -> Response {
    let mut response = (denial.status, Json(denial.body)).into_response();
    for (name, value) in denial.headers {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(&value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}
