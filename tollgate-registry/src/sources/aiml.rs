//! AIML aggregator model fetcher.

use tollgate::facilitator::BoxFuture;

use super::{ModelSource, fetch_openai_shaped};
use crate::model::{ModelInfo, Source};

const DEFAULT_BASE_URL: &str = "https://api.aimlapi.com/v1";

/// Fetches the AIML model catalog, an OpenAI-shaped `GET /v1/models`.
#[derive(Debug, Clone)]
pub struct AimlSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AimlSource {
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
}

impl ModelSource for AimlSource {
    fn source(&self) -> Source {
        Source::Aiml
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        Box::pin(async move {
            let url = format!("{}/models", self.base_url);
            fetch_openai_shaped(&self.client, &url, self.api_key.as_deref(), Source::Aiml).await
        })
    }
}
