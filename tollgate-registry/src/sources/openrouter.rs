//! OpenRouter model fetcher.
//!
//! OpenRouter publishes per-token USD prices as decimal strings; the
//! fetcher converts them to per-million-token rates.

use rust_decimal::Decimal;
use serde::Deserialize;
use tollgate::facilitator::BoxFuture;
use tollgate::pricing::ModelRates;

use super::{FETCH_TIMEOUT, ModelSource};
use crate::model::{
    Architecture, ModelInfo, ModelPricing, ModelTask, Source, classify_model_id,
};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Deserialize)]
struct OpenRouterPricing {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    completion: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenRouterArchitecture {
    #[serde(default)]
    input_modalities: Vec<String>,
    #[serde(default)]
    output_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    architecture: Option<OpenRouterArchitecture>,
    #[serde(default)]
    pricing: Option<OpenRouterPricing>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterList {
    #[serde(default)]
    data: Vec<OpenRouterModel>,
}

/// Fetches the OpenRouter model catalog from `GET /api/v1/models`.
#[derive(Debug, Clone)]
pub struct OpenRouterSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenRouterSource {
    /// Creates a fetcher with the given credential.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key,
        }
    }

    /// Overrides the base URL (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_inner(&self) -> Vec<ModelInfo> {
        let url = format!("{}/models", self.base_url);
        let list: OpenRouterList = match self.client.get(&url).timeout(FETCH_TIMEOUT).send().await {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(error = %e, "openrouter model list parse failed");
                    return Vec::new();
                }
            },
            Ok(r) => {
                tracing::warn!(status = %r.status(), "openrouter model list fetch rejected");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "openrouter model list fetch failed");
                return Vec::new();
            }
        };

        let available = self.api_key.is_some();
        list.data
            .into_iter()
            .map(|m| {
                let owned_by = m
                    .id
                    .split_once('/')
                    .map_or("openrouter", |(org, _)| org)
                    .to_owned();
                let pricing = m.pricing.as_ref().and_then(per_token_to_rates).map(|rates| {
                    ModelPricing {
                        provider: Source::Openrouter.to_string(),
                        rates,
                    }
                });
                let task = classify_model_id(&m.id).unwrap_or(ModelTask::TextGeneration);
                ModelInfo {
                    name: m.name.unwrap_or_else(|| m.id.clone()),
                    id: m.id,
                    owned_by,
                    source: Source::Openrouter,
                    task,
                    context_length: m.context_length,
                    architecture: m.architecture.map(|a| Architecture {
                        input_modalities: a.input_modalities,
                        output_modalities: a.output_modalities,
                    }),
                    providers: Vec::new(),
                    pricing,
                    available,
                }
            })
            .collect()
    }
}

/// Converts OpenRouter per-token prices into per-million-token rates.
fn per_token_to_rates(pricing: &OpenRouterPricing) -> Option<ModelRates> {
    let mtok = Decimal::from(1_000_000_u64);
    let prompt: Decimal = pricing.prompt.as_deref()?.parse().ok()?;
    let completion: Decimal = pricing.completion.as_deref()?.parse().ok()?;
    Some(ModelRates {
        input: prompt * mtok,
        output: completion * mtok,
    })
}

impl ModelSource for OpenRouterSource {
    fn source(&self) -> Source {
        Source::Openrouter
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        Box::pin(self.fetch_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_converts_per_token_pricing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "meta-llama/llama-3.3-70b-instruct",
                    "name": "Llama 3.3 70B Instruct",
                    "context_length": 131072,
                    "architecture": {
                        "input_modalities": ["text"],
                        "output_modalities": ["text"]
                    },
                    "pricing": { "prompt": "0.00000012", "completion": "0.0000003" }
                }]
            })))
            .mount(&server)
            .await;

        let source = OpenRouterSource::new(reqwest::Client::new(), Some("or-key".into()))
            .with_base_url(server.uri());
        let models = source.fetch().await;
        assert_eq!(models.len(), 1);
        let model = &models[0];
        assert_eq!(model.owned_by, "meta-llama");
        assert_eq!(model.context_length, Some(131_072));

        let pricing = model.pricing.as_ref().unwrap();
        assert_eq!(pricing.provider, "openrouter");
        assert_eq!(pricing.rates.input, "0.12".parse::<Decimal>().unwrap());
        assert_eq!(pricing.rates.output, "0.30".parse::<Decimal>().unwrap());
    }
}
