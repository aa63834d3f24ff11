//! Anthropic model fetcher.

use serde::Deserialize;
use tollgate::facilitator::BoxFuture;

use super::{FETCH_TIMEOUT, ModelSource};
use crate::model::{ModelInfo, ModelTask, Source};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// API version header value required by the Anthropic API.
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct AnthropicModel {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicList {
    #[serde(default)]
    data: Vec<AnthropicModel>,
}

/// Fetches the Anthropic model catalog from `GET /v1/models`.
///
/// Every Anthropic model is chat-capable; the catalog carries no task
/// variety to classify.
#[derive(Debug, Clone)]
pub struct AnthropicSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicSource {
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
        let mut request = self.client.get(&url).timeout(FETCH_TIMEOUT);
        if let Some(key) = &self.api_key {
            request = request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION);
        }
        let list: AnthropicList = match request.send().await {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(error = %e, "anthropic model list parse failed");
                    return Vec::new();
                }
            },
            Ok(r) => {
                tracing::warn!(status = %r.status(), "anthropic model list fetch rejected");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "anthropic model list fetch failed");
                return Vec::new();
            }
        };

        let available = self.api_key.is_some();
        list.data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.display_name.unwrap_or_else(|| m.id.clone()),
                id: m.id,
                owned_by: "anthropic".to_owned(),
                source: Source::Anthropic,
                task: ModelTask::TextGeneration,
                context_length: None,
                architecture: None,
                providers: Vec::new(),
                pricing: None,
                available,
            })
            .collect()
    }
}

impl ModelSource for AnthropicSource {
    fn source(&self) -> Source {
        Source::Anthropic
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        Box::pin(self.fetch_inner())
    }
}
