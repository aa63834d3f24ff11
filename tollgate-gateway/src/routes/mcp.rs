//! MCP runtime routes: plugin listing, tool discovery, gated execution,
//! and the pass-through proxy for servers that bill their own x402
//! payments via MCP `_meta`.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tollgate::pricing::BillableTask;
use tollgate::proto::Base64Bytes;
use tollgate::{PAYMENT_HEADER, PAYMENT_REQUIRED_HEADER};
use tollgate::error::GatewayError;

use crate::error::{ApiError, denial_response};
use crate::state::SharedState;

/// MCP `_meta` key carrying a payment payload (client → server).
const PAYMENT_META_KEY: &str = "x402/payment";

/// MCP `_meta` key carrying a settlement response (server → client).
const PAYMENT_RESPONSE_META_KEY: &str = "x402/payment-response";

/// MCP error envelope key for payment-required results.
const PAYMENT_ERROR_KEY: &str = "x402/error";

/// `GET /api/mcp/plugins` — MCP-backed connectors with availability.
pub async fn plugins(State(state): State<SharedState>) -> Json<Value> {
    let plugins: Vec<_> = state
        .connectors
        .list()
        .into_iter()
        .filter(|c| !c.descriptor.http_based)
        .collect();
    Json(json!({ "plugins": plugins }))
}

/// `GET /api/mcp/tools` — tools of every live pooled session.
pub async fn tools(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "sessions": state.pool.sessions() }))
}

/// `GET /api/mcp/status`
pub async fn status(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "sessions": state.pool.sessions(),
        "count": state.pool.session_count(),
    }))
}

/// `GET /api/mcp/{plugin_id}/tools`
pub async fn plugin_tools(
    State(state): State<SharedState>,
    Path(plugin_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let (session_id, tools) = state.pool.get_server_tools(&plugin_id).await?;
    Ok(Json(json!({ "sessionId": session_id, "tools": tools })))
}

/// `GET /api/mcp/{plugin_id}/tools/{tool_name}`
pub async fn plugin_tool(
    State(state): State<SharedState>,
    Path((plugin_id, tool_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (_, tools) = state.pool.get_server_tools(&plugin_id).await?;
    let tool = tools
        .into_iter()
        .find(|t| t.name == tool_name)
        .ok_or_else(|| {
            GatewayError::NotFound(format!("tool '{tool_name}' on server '{plugin_id}'"))
        })?;
    Ok(Json(serde_json::to_value(tool).unwrap_or(Value::Null)))
}

/// Body of execute/call routes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    /// The tool to invoke.
    pub tool_name: String,
    /// Tool arguments.
    #[serde(default)]
    pub args: Value,
}

/// `POST /api/mcp/{plugin_id}/execute` — locally gated tool execution.
pub async fn execute(
    State(state): State<SharedState>,
    Path(plugin_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ExecuteBody>,
) -> Response {
    let price = BillableTask::McpToolRead.base_price_wei();
    let resource = state.resource_url(&format!("/api/mcp/{plugin_id}/execute"));
    let ctx = match state
        .gate
        .verify_and_reserve(&headers, "POST", &resource, price)
        .await
    {
        Ok(ctx) => ctx,
        Err(denial) => return denial_response(denial),
    };

    match state
        .pool
        .execute_server_tool(&plugin_id, &body.tool_name, body.args)
        .await
    {
        Ok(result) => {
            state.gate.settle(ctx, price).await;
            Json(serde_json::to_value(&result).unwrap_or(Value::Null)).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// `GET /api/mcp/servers`
pub async fn servers(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "servers": state.pool.sessions() }))
}

/// `POST /api/mcp/servers/{slug}/call` — pass-through proxy.
///
/// The `x-payment` header is forwarded to the MCP server in the request
/// `_meta` and the server's settlement/challenge metadata is passed back
/// verbatim; the server, not this gateway, is the biller.
pub async fn server_call(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ExecuteBody>,
) -> Response {
    let meta = headers
        .get(PAYMENT_HEADER)
        .and_then(|header| Base64Bytes::from(header.as_bytes()).decode().ok())
        .and_then(|raw| serde_json::from_slice::<Value>(&raw).ok())
        .map(|payload| json!({ PAYMENT_META_KEY: payload }));

    let result = match state
        .pool
        .execute_server_tool_with_meta(&slug, &body.tool_name, body.args, meta)
        .await
    {
        Ok(result) => result,
        Err(e) => return ApiError::from(e).into_response(),
    };

    // A payment-required result surfaces as 402 with the server's own
    // challenge so the client can sign and retry.
    if let Some(challenge) = result.raw.get(PAYMENT_ERROR_KEY) {
        let mut response =
            (StatusCode::PAYMENT_REQUIRED, Json(challenge.clone())).into_response();
        if let Ok(encoded) = serde_json::to_vec(challenge) {
            let header = Base64Bytes::encode(encoded);
            if let Ok(value) = http::HeaderValue::from_str(&header.to_string()) {
                response.headers_mut().insert(PAYMENT_REQUIRED_HEADER, value);
            }
        }
        return response;
    }

    let settlement = result
        .raw
        .get("_meta")
        .and_then(|meta| meta.get(PAYMENT_RESPONSE_META_KEY))
        .cloned();

    let mut response = Json(serde_json::to_value(&result).unwrap_or(Value::Null)).into_response();
    if let Some(settlement) = settlement {
        if let Ok(encoded) = serde_json::to_vec(&settlement) {
            let header = Base64Bytes::encode(encoded);
            if let Ok(value) = http::HeaderValue::from_str(&header.to_string()) {
                response
                    .headers_mut()
                    .insert("x-payment-response", value);
            }
        }
    }
    response
}
