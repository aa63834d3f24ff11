//! Text-to-image and image-to-image generation with provider fallback.

use serde_json::{Value, json};
use tollgate::error::GatewayError;
use tollgate::pricing::TokenUsage;

use super::{BinaryOutput, prompt_of};
use crate::fallback::{ChainError, IMAGE_TO_IMAGE_CHAIN, TEXT_TO_IMAGE_CHAIN, run_chain};
use crate::providers::Providers;

/// Safe substitute suggested when a chain exhausts on an unknown model.
const FALLBACK_SUGGESTION: &str = "black-forest-labs/FLUX.1-schnell";

/// Token-equivalents charged per generated image.
const IMAGE_TOKEN_EQUIVALENT: u64 = 500;

/// Generates an image, walking the task's provider chain in order.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidInput`] without a prompt (or, for
/// image-to-image, without an input image), [`GatewayError::Unavailable`]
/// when the model is cold-loading, and [`GatewayError::Upstream`] when the
/// chain exhausts or fails fatally.
pub async fn generate_image(
    providers: &Providers,
    model_id: &str,
    body: &Value,
    image_to_image: bool,
) -> Result<BinaryOutput, GatewayError> {
    let prompt = prompt_of(body)
        .ok_or_else(|| GatewayError::InvalidInput("'prompt' is required".into()))?;

    let mut payload = json!({ "inputs": prompt });
    if image_to_image {
        let image = body
            .get("image")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidInput("'image' is required".into()))?;
        payload["image"] = json!(image);
    }
    if let Some(parameters) = body.get("parameters") {
        payload["parameters"] = parameters.clone();
    }

    let chain = if image_to_image {
        IMAGE_TO_IMAGE_CHAIN
    } else {
        TEXT_TO_IMAGE_CHAIN
    };

    let outcome = run_chain(chain, model_id, |provider| {
        let payload = payload.clone();
        async move {
            providers
                .hf_provider_call(&provider, model_id, &payload)
                .await
        }
    })
    .await;

    match outcome {
        Ok((provider, (bytes, _content_type))) => {
            tracing::info!(model_id, provider = %provider, size = bytes.len(), "image generated");
            Ok(BinaryOutput {
                content_type: "image/png".to_owned(),
                bytes,
                usage: TokenUsage::new(IMAGE_TOKEN_EQUIVALENT, IMAGE_TOKEN_EQUIVALENT),
            })
        }
        Err(e @ ChainError::Loading { .. }) => Err(GatewayError::Unavailable(e.to_string())),
        Err(ChainError::Exhausted {
            model_id,
            tried,
            last_error,
        }) => Err(GatewayError::Upstream(format!(
            "no provider could serve '{model_id}' (tried {}): {last_error}; try a known-good model such as {FALLBACK_SUGGESTION}",
            tried.join(", ")
        ))),
        Err(e @ ChainError::Fatal { .. }) => Err(GatewayError::Upstream(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderEndpoints;
    use tollgate::config::ProviderKeys;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 1x1 transparent PNG.
    const PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
    ];

    fn providers(server: &MockServer) -> Providers {
        Providers::new(
            reqwest::Client::new(),
            ProviderKeys {
                huggingface: Some("hf".into()),
                ..ProviderKeys::default()
            },
        )
        .with_endpoints(ProviderEndpoints {
            hf_router: server.uri(),
            ..ProviderEndpoints::default()
        })
    }

    #[tokio::test]
    async fn fallback_rotates_to_the_first_working_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hf-inference/models/some/model"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PRO required"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wavespeed/models/some/model"))
            .respond_with(ResponseTemplate::new(400).set_body_string("not available"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/replicate/models/some/model"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(PNG),
            )
            .mount(&server)
            .await;

        let output = generate_image(
            &providers(&server),
            "some/model",
            &serde_json::json!({ "prompt": "a rusty gate" }),
            false,
        )
        .await
        .unwrap();

        assert_eq!(output.content_type, "image/png");
        assert_eq!(output.bytes, PNG);
        assert_eq!(output.usage.total_tokens, 1000);
    }

    #[tokio::test]
    async fn loading_stops_without_rotating() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hf-inference/models/m"))
            .respond_with(
                ResponseTemplate::new(503).set_body_string("Model m is currently loading"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = generate_image(
            &providers(&server),
            "m",
            &serde_json::json!({ "prompt": "x" }),
            false,
        )
        .await
        .unwrap_err();
        match err {
            GatewayError::Unavailable(message) => {
                assert!(message.contains("20-30 seconds"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn exhausted_chain_suggests_a_substitute() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let err = generate_image(
            &providers(&server),
            "ghost/model",
            &serde_json::json!({ "prompt": "x" }),
            false,
        )
        .await
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ghost/model"));
        assert!(message.contains(FALLBACK_SUGGESTION));
    }

    #[tokio::test]
    async fn image_to_image_starts_at_wavespeed_and_sends_the_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wavespeed/models/m"))
            .and(body_partial_json(
                serde_json::json!({ "inputs": "edit it", "image": "aGVsbG8=" }),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(PNG),
            )
            .expect(1)
            .mount(&server)
            .await;

        let output = generate_image(
            &providers(&server),
            "m",
            &serde_json::json!({ "prompt": "edit it", "image": "aGVsbG8=" }),
            true,
        )
        .await
        .unwrap();
        assert_eq!(output.bytes, PNG);
    }

    #[tokio::test]
    async fn missing_prompt_is_invalid() {
        let server = MockServer::start().await;
        let err = generate_image(&providers(&server), "m", &serde_json::json!({}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }
}
