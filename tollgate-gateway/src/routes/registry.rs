//! Model registry routes.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use tollgate::error::GatewayError;
use tollgate_registry::Source;

use crate::error::ApiError;
use crate::state::SharedState;

/// `GET /api/models` — available models in the OpenAI list shape.
pub async fn models_openai_shaped(State(state): State<SharedState>) -> Json<Value> {
    let models = state.registry.available_models().await;
    let data: Vec<Value> = models
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "object": "model",
                "owned_by": m.owned_by,
                "task": m.task,
                "context_length": m.context_length,
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

/// `GET /api/registry/models`
pub async fn all_models(State(state): State<SharedState>) -> Json<Value> {
    let catalog = state.registry.catalog().await;
    Json(serde_json::to_value(catalog.as_ref()).unwrap_or(Value::Null))
}

/// `GET /api/registry/models/available`
pub async fn available_models(State(state): State<SharedState>) -> Json<Value> {
    let models = state.registry.available_models().await;
    Json(json!({ "models": models }))
}

/// `GET /api/registry/models/{source}`
pub async fn models_by_source(
    State(state): State<SharedState>,
    Path(source): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let source = Source::parse(&source)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown source '{source}'")))?;
    let models = state.registry.models_for_source(source).await;
    Ok(Json(json!({ "source": source, "models": models })))
}

/// `GET /api/registry/model/{id}`
pub async fn model_by_id(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let model = state
        .registry
        .model_info(&id)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("unknown model '{id}'")))?;
    Ok(Json(serde_json::to_value(model).unwrap_or(Value::Null)))
}

/// `POST /api/registry/refresh`
pub async fn refresh(State(state): State<SharedState>) -> Json<Value> {
    let catalog = state.registry.refresh().await;
    Json(json!({
        "refreshed": true,
        "models": catalog.models.len(),
        "sources": catalog.sources,
        "lastUpdated": catalog.last_updated,
    }))
}
