//! The billable inference route.
//!
//! `verify` happens before any provider work; streaming responses settle
//! in the stream's finish hook after the last byte, single-shot responses
//! settle before the response is returned. A handler failure after a
//! successful verify never settles.

use std::collections::HashMap;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use http::{HeaderMap, StatusCode, header};
use serde_json::{Value, json};
use tollgate::COST_HEADER;
use tollgate::error::GatewayError;
use tollgate_inference::InferenceOutcome;
use tollgate_inference::handlers::FinishHook;
use tollgate_registry::ModelTask;

use crate::error::{ApiError, denial_response};
use crate::state::SharedState;

/// `POST /api/inference`
pub async fn infer(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    infer_impl(state, None, query, headers, body).await
}

/// `POST /api/inference/{model_id}`
pub async fn infer_model(
    State(state): State<SharedState>,
    Path(model_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    infer_impl(state, Some(model_id), query, headers, body).await
}

async fn infer_impl(
    state: SharedState,
    path_model: Option<String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    raw_body: Bytes,
) -> Response {
    let body = match parse_body(&headers, &raw_body) {
        Ok(body) => body,
        Err(e) => return ApiError(e).into_response(),
    };

    let Some(model_id) = path_model.or_else(|| {
        body.get("modelId")
            .or_else(|| body.get("model"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }) else {
        return ApiError(GatewayError::InvalidInput(
            "model id is required (path, 'modelId', or 'model')".into(),
        ))
        .into_response();
    };

    let explicit_task = query
        .get("task")
        .map(String::as_str)
        .or_else(|| body.get("task").and_then(Value::as_str));
    let (task, source) = state.inference.resolve(&model_id, explicit_task, &body).await;

    let path = path_model_path(&model_id, &body);
    let resource = state.resource_url(&path);
    let ceiling = state.inference.ceiling_wei(task, &model_id).await;

    let ctx = match state
        .gate
        .verify_and_reserve(&headers, "POST", &resource, ceiling)
        .await
    {
        Ok(ctx) => ctx,
        Err(denial) => return denial_response(denial),
    };

    let streaming = matches!(
        task,
        ModelTask::TextGeneration | ModelTask::Conversational | ModelTask::Unknown
    );

    if streaming {
        let gate = state.gate.clone();
        let inference = state.inference.clone();
        let hook_model = model_id.clone();
        let on_finish: FinishHook = Box::new(move |usage| {
            Box::pin(async move {
                let cost = inference.cost_for(&hook_model, usage).await;
                tracing::info!(
                    model = %hook_model,
                    total_tokens = usage.total_tokens,
                    cost_usd = %cost.total,
                    amount_wei = cost.total_wei,
                    "settling streamed inference"
                );
                gate.settle(ctx, cost.total_wei).await;
            })
        });

        return match state
            .inference
            .handle(task, source, &model_id, &body, on_finish)
            .await
        {
            Ok(InferenceOutcome::Stream(chat)) => Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive")
                .body(Body::from_stream(chat.stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
            Ok(_) => ApiError(GatewayError::Internal(
                "streaming task produced a single-shot result".into(),
            ))
            .into_response(),
            Err(e) => ApiError(e).into_response(),
        };
    }

    let noop: FinishHook = Box::new(|_| Box::pin(async {}));
    match state
        .inference
        .handle(task, source, &model_id, &body, noop)
        .await
    {
        Ok(InferenceOutcome::Binary(output)) => {
            let (cost, amount) = state.inference.settle_amount(task, &model_id, output.usage).await;
            state.gate.settle(ctx, amount).await;
            Response::builder()
                .header(header::CONTENT_TYPE, output.content_type)
                .header(COST_HEADER, cost.total.to_string())
                .body(Body::from(output.bytes))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Ok(InferenceOutcome::Json(output)) => {
            let (cost, amount) = state.inference.settle_amount(task, &model_id, output.usage).await;
            state.gate.settle(ctx, amount).await;
            let mut response = Json(output.body).into_response();
            if let Ok(value) = http::HeaderValue::from_str(&cost.total.to_string()) {
                response.headers_mut().insert(COST_HEADER, value);
            }
            response
        }
        Ok(InferenceOutcome::Stream(_)) => ApiError(GatewayError::Internal(
            "single-shot task produced a stream".into(),
        ))
        .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// The path the resource URL is built from.
fn path_model_path(model_id: &str, body: &Value) -> String {
    // Body-supplied model ids keep the bare inference path.
    let from_body = body
        .get("modelId")
        .or_else(|| body.get("model"))
        .and_then(Value::as_str)
        == Some(model_id);
    if from_body {
        "/api/inference".to_owned()
    } else {
        format!("/api/inference/{model_id}")
    }
}

/// Parses the request body: JSON stays as-is, a raw binary body (audio
/// uploads) is wrapped as `{ "audio": <base64> }`.
fn parse_body(headers: &HeaderMap, raw: &Bytes) -> Result<Value, GatewayError> {
    if raw.is_empty() {
        return Ok(json!({}));
    }
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    if is_json {
        return serde_json::from_slice(raw)
            .map_err(|e| GatewayError::InvalidInput(format!("invalid JSON body: {e}")));
    }
    if let Ok(parsed) = serde_json::from_slice(raw) {
        return Ok(parsed);
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
    Ok(json!({ "audio": encoded }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_binary_bodies_become_base64_audio() {
        let headers = HeaderMap::new();
        let body = parse_body(&headers, &Bytes::from_static(&[0xFF, 0xD8, 0x00])).unwrap();
        assert!(body.get("audio").is_some());

        let body = parse_body(&headers, &Bytes::from_static(b"{\"prompt\":\"x\"}")).unwrap();
        assert_eq!(body["prompt"], "x");
    }

    #[test]
    fn json_content_type_must_parse() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let err = parse_body(&headers, &Bytes::from_static(b"not json")).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }
}
