//! Per-provider model fetchers.
//!
//! Each source implements [`ModelSource`]. Fetchers are infallible by
//! contract: a failing source logs and contributes an empty list so one
//! provider outage never fails the aggregate refresh.

use std::time::Duration;

use serde::Deserialize;
use tollgate::facilitator::BoxFuture;

use crate::model::{ModelInfo, ModelTask, Source, classify_model_id};

pub mod aiml;
pub mod anthropic;
pub mod asi;
pub mod google;
pub mod huggingface;
pub mod openai;
pub mod openrouter;

pub use aiml::AimlSource;
pub use anthropic::AnthropicSource;
pub use asi::{AsiCloudSource, AsiOneSource};
pub use google::GoogleSource;
pub use huggingface::HuggingFaceSource;
pub use openai::OpenAiSource;
pub use openrouter::OpenRouterSource;

/// Default timeout for one catalog HTTP call.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A provider source that can enumerate its models.
pub trait ModelSource: Send + Sync {
    /// The source identity of every model this fetcher returns.
    fn source(&self) -> Source;

    /// Fetches the source's models. Errors are logged and yield `[]`.
    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>>;
}

/// One entry of an OpenAI-shaped `GET /models` response.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiShapedModel {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
    #[serde(default)]
    pub context_length: Option<u64>,
}

/// An OpenAI-shaped `GET /models` response body.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiShapedList {
    #[serde(default)]
    pub data: Vec<OpenAiShapedModel>,
}

/// Fetches an OpenAI-shaped `/models` endpoint with a bearer credential and
/// converts the entries into [`ModelInfo`]s for `source`.
///
/// Entries whose id classifies as a non-inference task (via
/// [`classify_model_id`]) keep that task; everything else is treated as
/// chat-capable text generation.
pub(crate) async fn fetch_openai_shaped(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    source: Source,
) -> Vec<ModelInfo> {
    let mut request = client.get(url).timeout(FETCH_TIMEOUT);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(%source, url, error = %e, "model list fetch failed");
            return Vec::new();
        }
    };
    if !response.status().is_success() {
        tracing::warn!(%source, url, status = %response.status(), "model list fetch rejected");
        return Vec::new();
    }
    let list: OpenAiShapedList = match response.json().await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!(%source, url, error = %e, "model list parse failed");
            return Vec::new();
        }
    };

    let available = api_key.is_some();
    list.data
        .into_iter()
        .map(|m| {
            let task = classify_model_id(&m.id).unwrap_or(ModelTask::TextGeneration);
            ModelInfo {
                name: m.id.clone(),
                owned_by: m.owned_by.unwrap_or_else(|| source.to_string()),
                id: m.id,
                source,
                task,
                context_length: m.context_length,
                architecture: None,
                providers: Vec::new(),
                pricing: None,
                available,
            }
        })
        .collect()
}
