//! Feature extraction and sentence similarity.

use serde_json::{Value, json};
use tollgate::error::GatewayError;
use tollgate::pricing::TokenUsage;

use super::JsonOutput;
use crate::providers::Providers;

/// Computes embeddings or similarity scores, returning
/// `{ embeddings, dimensions }`.
///
/// Sentence similarity takes `{ source_sentence, sentences[] }`; feature
/// extraction takes `{ inputs }`.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidInput`] on a malformed body, otherwise
/// the provider error.
pub async fn embed(
    providers: &Providers,
    model_id: &str,
    body: &Value,
    sentence_similarity: bool,
) -> Result<JsonOutput, GatewayError> {
    let (payload, billed_text) = if sentence_similarity {
        let source = body
            .get("source_sentence")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidInput("'source_sentence' is required".into()))?;
        let sentences = body
            .get("sentences")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::InvalidInput("'sentences' array is required".into()))?;
        let billed: usize = sentences
            .iter()
            .filter_map(Value::as_str)
            .map(str::len)
            .sum::<usize>()
            + source.len();
        (
            json!({ "inputs": { "source_sentence": source, "sentences": sentences } }),
            billed,
        )
    } else {
        let inputs = body
            .get("inputs")
            .ok_or_else(|| GatewayError::InvalidInput("'inputs' is required".into()))?;
        let billed = match inputs {
            Value::String(s) => s.len(),
            Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::len).sum(),
            _ => 0,
        };
        (json!({ "inputs": inputs }), billed)
    };

    let (bytes, _) = providers
        .hf_provider_call("hf-inference", model_id, &payload)
        .await
        .map_err(|e| GatewayError::Upstream(format!("{}: {}", e.provider, e.message)))?;

    let embeddings: Value = serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::Upstream(format!("embedding parse: {e}")))?;
    let dimensions = dimensions_of(&embeddings);

    Ok(JsonOutput {
        body: json!({ "embeddings": embeddings, "dimensions": dimensions }),
        usage: TokenUsage::new((billed_text as u64).div_ceil(4), 0),
    })
}

/// The innermost vector length of an embeddings response.
fn dimensions_of(embeddings: &Value) -> usize {
    match embeddings {
        Value::Array(items) => match items.first() {
            Some(Value::Array(inner)) => inner.len(),
            _ => items.len(),
        },
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderEndpoints;
    use tollgate::config::ProviderKeys;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

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
    async fn feature_extraction_reports_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hf-inference/models/BAAI/bge-small-en"))
            .and(body_json(json!({ "inputs": "hello" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([[0.1, 0.2, 0.3, 0.4]])),
            )
            .mount(&server)
            .await;

        let output = embed(
            &providers(&server),
            "BAAI/bge-small-en",
            &json!({ "inputs": "hello" }),
            false,
        )
        .await
        .unwrap();

        assert_eq!(output.body["dimensions"], 4);
        assert_eq!(output.body["embeddings"][0][1], 0.2);
    }

    #[tokio::test]
    async fn sentence_similarity_sends_source_and_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hf-inference/models/sentence-transformers/all-MiniLM-L6-v2"))
            .and(body_json(json!({
                "inputs": {
                    "source_sentence": "a cat",
                    "sentences": ["a feline", "a truck"]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([0.91, 0.12])))
            .mount(&server)
            .await;

        let output = embed(
            &providers(&server),
            "sentence-transformers/all-MiniLM-L6-v2",
            &json!({ "source_sentence": "a cat", "sentences": ["a feline", "a truck"] }),
            true,
        )
        .await
        .unwrap();

        assert_eq!(output.body["dimensions"], 2);
        assert_eq!(output.body["embeddings"][0], 0.91);
    }

    #[tokio::test]
    async fn missing_inputs_is_invalid() {
        let server = MockServer::start().await;
        let err = embed(&providers(&server), "m", &json!({}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }
}
