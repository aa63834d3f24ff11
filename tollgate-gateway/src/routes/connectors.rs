//! Connector catalog and invocation routes.
//!
//! Listing is free. Invocations are billable: availability is checked
//! first (a missing credential must not cost a facilitator round-trip),
//! then the payment gate brackets the call.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tollgate::pricing::BillableTask;
use tollgate_connectors::ConnectorError;

use crate::error::{ApiError, denial_response, unavailable_connector_response};
use crate::state::SharedState;

/// `GET /connectors`
pub async fn list(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "connectors": state.connectors.list() }))
}

/// `GET /connectors/{id}`
pub async fn get_one(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let status = state.connectors.get(&id)?;
    Ok(Json(serde_json::to_value(status).unwrap_or(Value::Null)))
}

/// `GET /connectors/{id}/tools`
pub async fn tools(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    match state.connectors.list_tools(&id).await {
        Ok(tools) => Json(json!({ "tools": tools })).into_response(),
        Err(ConnectorError::Unavailable { id, missing }) => {
            unavailable_connector_response(&id, &missing)
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Body of `POST /connectors/{id}/call`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallBody {
    /// The tool to invoke.
    pub tool_name: String,
    /// Tool arguments.
    #[serde(default)]
    pub args: Value,
}

/// Write tools settle at the transaction price; reads at the tool-read
/// price.
fn price_for_tool(tool_name: &str) -> BillableTask {
    if matches!(tool_name, "post_tweet") {
        BillableTask::ToolTransaction
    } else {
        BillableTask::McpToolRead
    }
}

/// `POST /connectors/{id}/call`
pub async fn call(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CallBody>,
) -> Response {
    // Availability first: an unconfigured connector never reaches the
    // facilitator.
    if let Err(e) = state.connectors.get(&id).and_then(|status| {
        if status.available {
            Ok(())
        } else {
            Err(ConnectorError::Unavailable {
                id: id.clone(),
                missing: status.missing_env,
            })
        }
    }) {
        return match e {
            ConnectorError::Unavailable { id, missing } => {
                unavailable_connector_response(&id, &missing)
            }
            other => ApiError::from(other).into_response(),
        };
    }

    let price = price_for_tool(&body.tool_name).base_price_wei();
    let resource = state.resource_url(&format!("/connectors/{id}/call"));
    let ctx = match state
        .gate
        .verify_and_reserve(&headers, "POST", &resource, price)
        .await
    {
        Ok(ctx) => ctx,
        Err(denial) => return denial_response(denial),
    };

    match state.connectors.call_tool(&id, &body.tool_name, body.args).await {
        Ok(result) => {
            state.gate.settle(ctx, price).await;
            Json(serde_json::to_value(&result).unwrap_or(Value::Null)).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
