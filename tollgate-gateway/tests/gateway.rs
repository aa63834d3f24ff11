//! End-to-end gateway tests: the 402 handshake, paid streaming with
//! post-stream settlement, and connector availability gating.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tollgate::facilitator::{BoxFuture, Facilitator, FacilitatorClient};
use tollgate::gate::{GateConfig, PaymentGate};
use tollgate::proto::Base64Bytes;
use tollgate_connectors::ConnectorService;
use tollgate_gateway::{AppState, app_router};
use tollgate_inference::InferenceRouter;
use tollgate_inference::providers::{ProviderEndpoints, Providers};
use tollgate_mcp::pool::{SessionPool, SessionSpawner};
use tollgate_mcp::session::McpSession;
use tollgate_mcp::McpError;
use tollgate_registry::model::{ModelInfo, ModelTask};
use tollgate_registry::sources::ModelSource;
use tollgate_registry::{Registry, Source};
use tollgate::config::ProviderKeys;

/// A registry source serving a fixed catalog.
struct FixedSource(Vec<ModelInfo>);

impl ModelSource for FixedSource {
    fn source(&self) -> Source {
        Source::AsiOne
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        let models = self.0.clone();
        Box::pin(async move { models })
    }
}

/// MCP spawner that always fails; these tests exercise no MCP servers.
struct NoSpawner;

impl SessionSpawner for NoSpawner {
    fn spawn<'a>(
        &'a self,
        _server_id: &'a str,
    ) -> BoxFuture<'a, Result<Arc<McpSession>, McpError>> {
        Box::pin(async { Err(McpError::Connect("no mcp in tests".into())) })
    }
}

fn asi1_mini() -> ModelInfo {
    ModelInfo {
        id: "asi1-mini".into(),
        name: "ASI1 Mini".into(),
        owned_by: "fetchai".into(),
        source: Source::AsiOne,
        task: ModelTask::TextGeneration,
        context_length: Some(128_000),
        architecture: None,
        providers: Vec::new(),
        pricing: None,
        available: true,
    }
}

async fn test_app(
    facilitator: &MockServer,
    provider: &MockServer,
    env: HashMap<String, String>,
) -> Router {
    let client = reqwest::Client::new();
    let facilitator_client = FacilitatorClient::try_from(facilitator.uri().as_str()).unwrap();
    let gate = PaymentGate::new(
        Arc::new(facilitator_client) as Arc<dyn Facilitator>,
        GateConfig {
            network: "eip155:84532".into(),
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".into(),
            pay_to: "0xRecipient".into(),
        },
    );

    let registry = Arc::new(Registry::new(vec![Arc::new(FixedSource(vec![
        asi1_mini(),
    ]))]));

    let keys = ProviderKeys {
        asi_one: Some("asi-key".into()),
        ..ProviderKeys::default()
    };
    let providers = Providers::new(client.clone(), keys).with_endpoints(ProviderEndpoints {
        asi_one: provider.uri(),
        ..ProviderEndpoints::default()
    });
    let inference = InferenceRouter::new(providers, Arc::clone(&registry));

    let pool = Arc::new(SessionPool::new(Arc::new(NoSpawner)));
    let connectors = ConnectorService::new(client, env, Arc::clone(&pool));

    let state = Arc::new(AppState {
        gate,
        inference,
        registry,
        connectors,
        pool,
        public_base_url: Some("https://gateway.test".into()),
    });
    app_router(state)
}

fn payment_header() -> String {
    let payload = json!({ "signature": "0xSig", "from": "0xPayer" });
    Base64Bytes::encode(serde_json::to_vec(&payload).unwrap()).to_string()
}

fn sse_fixture() -> String {
    [
        r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
        "",
        r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":7,"total_tokens":10}}"#,
        "",
        "data: [DONE]",
        "",
        "",
    ]
    .join("\n")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

#[tokio::test]
async fn inference_without_payment_gets_upto_challenge() {
    let facilitator = MockServer::start().await;
    let provider = MockServer::start().await;
    let app = test_app(&facilitator, &provider, HashMap::new()).await;

    let response = app
        .oneshot(
            Request::post("/api/inference")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "messages": [{ "role": "user", "content": "hi" }],
                        "modelId": "asi1-mini"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(response.headers().contains_key("x-payment-required"));
    let body = body_json(response).await;
    assert_eq!(body["error"], "payment_required");
    let accept = &body["accepts"][0];
    assert_eq!(accept["scheme"], "upto");
    assert_eq!(accept["payTo"], "0xRecipient");
    // asi1-mini curated rates: $0.10 in / $0.40 out per mtok. Worst case
    // at the 200k cap is $0.08 provider + $0.02 platform = $0.10.
    assert_eq!(accept["maxAmount"], "100000");
    assert_eq!(accept["resource"], "https://gateway.test/api/inference");
}

#[tokio::test]
async fn paid_inference_streams_and_settles_metered_cost() {
    let facilitator = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "valid", "payer": "0xPayer" })),
        )
        .expect(1)
        .mount(&facilitator)
        .await;
    // 3 in + 7 out at $0.10/$0.40 per mtok + $0.10/mtok platform fee,
    // rounded up to whole wei, is 5.
    Mock::given(method("POST"))
        .and(path("/settle"))
        .and(body_partial_json(json!({ "amount": "5" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "receipt": {
                "transaction": "0xTx",
                "network": "eip155:84532",
                "payer": "0xPayer",
                "amount": "5"
            }
        })))
        .expect(1)
        .mount(&facilitator)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(sse_fixture(), "text/event-stream"),
        )
        .expect(1)
        .mount(&provider)
        .await;

    let app = test_app(&facilitator, &provider, HashMap::new()).await;
    let response = app
        .oneshot(
            Request::post("/api/inference")
                .header("content-type", "application/json")
                .header("x-payment", payment_header())
                .body(Body::from(
                    json!({
                        "messages": [{ "role": "user", "content": "hi" }],
                        "modelId": "asi1-mini"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    assert_eq!(bytes.as_ref(), sse_fixture().as_bytes());

    // Settlement runs in the finish hook after the last byte.
    tokio::time::sleep(Duration::from_millis(200)).await;
    facilitator.verify().await;
}

#[tokio::test]
async fn invalid_payment_is_rechallenged_without_provider_work() {
    let facilitator = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "invalid",
            "reason": "insufficient_funds"
        })))
        .expect(1)
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;

    let app = test_app(&facilitator, &provider, HashMap::new()).await;
    let response = app
        .oneshot(
            Request::post("/api/inference")
                .header("content-type", "application/json")
                .header("x-payment", payment_header())
                .body(Body::from(
                    json!({
                        "messages": [{ "role": "user", "content": "hi" }],
                        "modelId": "asi1-mini"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "insufficient_funds");
    provider.verify().await;
    facilitator.verify().await;
}

#[tokio::test]
async fn unconfigured_connector_is_503_and_never_reaches_the_facilitator() {
    let facilitator = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&facilitator)
        .await;

    let app = test_app(&facilitator, &provider, HashMap::new()).await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/connectors/x/tools")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    let missing = body["missingEnv"].as_array().unwrap();
    assert_eq!(missing.len(), 5);

    let response = app
        .oneshot(
            Request::post("/connectors/x/call")
                .header("content-type", "application/json")
                .header("x-payment", payment_header())
                .body(Body::from(
                    json!({ "toolName": "post_tweet", "args": { "text": "hi" } }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    facilitator.verify().await;
}

#[tokio::test]
async fn health_reports_service_and_version() {
    let facilitator = MockServer::start().await;
    let provider = MockServer::start().await;
    let app = test_app(&facilitator, &provider, HashMap::new()).await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "tollgate-gateway");
    assert!(body["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn registry_routes_serve_and_refresh_the_catalog() {
    let facilitator = MockServer::start().await;
    let provider = MockServer::start().await;
    let app = test_app(&facilitator, &provider, HashMap::new()).await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/registry/model/asi1-mini")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "asi1-mini");
    assert_eq!(body["source"], "asi-one");
    // Curated pricing overlays the fetcher's empty pricing.
    assert_eq!(body["pricing"]["provider"], "asi-one");

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/registry/model/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::post("/api/registry/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["refreshed"], true);
    assert_eq!(body["models"], 1);
}

#[tokio::test]
async fn unknown_source_and_model_routes_are_404() {
    let facilitator = MockServer::start().await;
    let provider = MockServer::start().await;
    let app = test_app(&facilitator, &provider, HashMap::new()).await;

    let response = app
        .oneshot(
            Request::get("/api/registry/models/not-a-source")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "not_found");
}
