//! Google AI (Gemini family) model fetcher.

use serde::Deserialize;
use tollgate::facilitator::BoxFuture;

use super::{FETCH_TIMEOUT, ModelSource};
use crate::model::{ModelInfo, ModelTask, Source};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleModel {
    /// Resource name, e.g. `models/gemini-2.0-flash`.
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    input_token_limit: Option<u64>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleList {
    #[serde(default)]
    models: Vec<GoogleModel>,
}

/// Fetches the Google model catalog from `GET /v1beta/models`.
#[derive(Debug, Clone)]
pub struct GoogleSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleSource {
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
            request = request.query(&[("key", key.as_str())]);
        }
        let list: GoogleList = match request.send().await {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(error = %e, "google model list parse failed");
                    return Vec::new();
                }
            },
            Ok(r) => {
                tracing::warn!(status = %r.status(), "google model list fetch rejected");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "google model list fetch failed");
                return Vec::new();
            }
        };

        let available = self.api_key.is_some();
        list.models
            .into_iter()
            .filter_map(|m| {
                let id = m.name.strip_prefix("models/").unwrap_or(&m.name).to_owned();
                let task = classify_google_model(&id, &m.supported_generation_methods)?;
                Some(ModelInfo {
                    name: m.display_name.unwrap_or_else(|| id.clone()),
                    id,
                    owned_by: "google".to_owned(),
                    source: Source::Google,
                    task,
                    context_length: m.input_token_limit,
                    architecture: None,
                    providers: Vec::new(),
                    pricing: None,
                    available,
                })
            })
            .collect()
    }
}

/// Task classification for Google models from id and generation methods.
///
/// Returns `None` for entries that expose no generation method the gateway
/// can route (e.g. tuning-only models).
fn classify_google_model(id: &str, methods: &[String]) -> Option<ModelTask> {
    let id = id.to_ascii_lowercase();
    let has = |m: &str| methods.iter().any(|x| x == m);

    if id.contains("veo") {
        return Some(ModelTask::TextToVideo);
    }
    if id.contains("lyria") {
        return Some(ModelTask::TextToAudio);
    }
    if id.contains("imagen") || id.ends_with("-image") {
        return Some(ModelTask::TextToImage);
    }
    if has("embedContent") || has("embedText") {
        return Some(ModelTask::FeatureExtraction);
    }
    if has("bidiGenerateContent") {
        return Some(ModelTask::Conversational);
    }
    if has("generateContent") || has("predict") || has("predictLongRunning") {
        return Some(ModelTask::TextGeneration);
    }
    None
}

impl ModelSource for GoogleSource {
    fn source(&self) -> Source {
        Source::Google
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        Box::pin(self.fetch_inner())
    }
}
