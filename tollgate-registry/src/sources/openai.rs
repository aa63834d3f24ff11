//! OpenAI model fetcher.

use tollgate::facilitator::BoxFuture;

use super::{ModelSource, fetch_openai_shaped};
use crate::model::{ModelInfo, Source};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model ids with these substrings are not inference-routable and are
/// dropped from the catalog.
const EXCLUDED: &[&str] = &["moderation", "realtime", "batch", "babbage", "davinci"];

/// Fetches the OpenAI model catalog from `GET /v1/models`.
#[derive(Debug, Clone)]
pub struct OpenAiSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiSource {
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

impl ModelSource for OpenAiSource {
    fn source(&self) -> Source {
        Source::Openai
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        Box::pin(async move {
            let url = format!("{}/models", self.base_url);
            let mut models = fetch_openai_shaped(
                &self.client,
                &url,
                self.api_key.as_deref(),
                Source::Openai,
            )
            .await;
            models.retain(|m| !EXCLUDED.iter().any(|e| m.id.contains(e)));
            models
        })
    }
}
