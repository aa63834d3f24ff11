//! HuggingFace router model fetcher.
//!
//! Enumerates hub models task by task (`inference_provider=all`), then
//! joins the router's `/v1/models` catalog to attach per-provider pricing.
//! Hub enumeration is batched — five tasks at a time with a 100 ms pause
//! between batches — to stay under the hub's burst limits.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Deserialize;
use tollgate::facilitator::BoxFuture;
use tollgate::pricing::ModelRates;

use super::{FETCH_TIMEOUT, ModelSource};
use crate::model::{ModelInfo, ModelTask, ProviderPricing, ProviderStatus, Source};

const DEFAULT_HUB_BASE_URL: &str = "https://huggingface.co";
const DEFAULT_ROUTER_BASE_URL: &str = "https://router.huggingface.co";

/// Tasks enumerated from the hub, in priority order.
const HUB_TASKS: &[(&str, ModelTask)] = &[
    ("text-generation", ModelTask::TextGeneration),
    ("text-to-image", ModelTask::TextToImage),
    ("image-to-image", ModelTask::ImageToImage),
    ("text-to-speech", ModelTask::TextToSpeech),
    (
        "automatic-speech-recognition",
        ModelTask::AutomaticSpeechRecognition,
    ),
    ("text-to-video", ModelTask::TextToVideo),
    ("text-to-audio", ModelTask::TextToAudio),
    ("feature-extraction", ModelTask::FeatureExtraction),
];

/// Tasks fetched per batch.
const TASK_BATCH_SIZE: usize = 5;

/// Pause between task batches.
const BATCH_DELAY: Duration = Duration::from_millis(100);

/// Models requested per task.
const PER_TASK_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct HubModel {
    #[serde(alias = "modelId")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct RouterProvider {
    provider: String,
    #[serde(default)]
    status: Option<ProviderStatus>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    pricing: Option<ModelRates>,
    #[serde(default)]
    supports_tools: Option<bool>,
    #[serde(default)]
    supports_structured_output: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RouterModel {
    id: String,
    #[serde(default)]
    providers: Vec<RouterProvider>,
}

#[derive(Debug, Deserialize)]
struct RouterList {
    #[serde(default)]
    data: Vec<RouterModel>,
}

/// Fetches inference-provider-routed models from the HuggingFace hub and
/// router.
#[derive(Debug, Clone)]
pub struct HuggingFaceSource {
    client: reqwest::Client,
    hub_base_url: String,
    router_base_url: String,
    token: Option<String>,
}

impl HuggingFaceSource {
    /// Creates a fetcher with the given inference token.
    #[must_use]
    pub fn new(client: reqwest::Client, token: Option<String>) -> Self {
        Self {
            client,
            hub_base_url: DEFAULT_HUB_BASE_URL.to_owned(),
            router_base_url: DEFAULT_ROUTER_BASE_URL.to_owned(),
            token,
        }
    }

    /// Overrides the hub base URL (tests).
    #[must_use]
    pub fn with_hub_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.hub_base_url = base_url.into();
        self
    }

    /// Overrides the router base URL (tests).
    #[must_use]
    pub fn with_router_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.router_base_url = base_url.into();
        self
    }

    /// Enumerates hub models for one pipeline task.
    async fn fetch_task(&self, pipeline_tag: &str, task: ModelTask) -> Vec<ModelInfo> {
        let url = format!("{}/api/models", self.hub_base_url);
        let limit = PER_TASK_LIMIT.to_string();
        let mut request = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .query(&[
                ("pipeline_tag", pipeline_tag),
                ("inference_provider", "all"),
                ("limit", limit.as_str()),
            ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let entries: Vec<HubModel> = match request.send().await {
            Ok(r) if r.status().is_success() => r.json().await.unwrap_or_default(),
            Ok(r) => {
                tracing::warn!(pipeline_tag, status = %r.status(), "hub model fetch rejected");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(pipeline_tag, error = %e, "hub model fetch failed");
                return Vec::new();
            }
        };

        let available = self.token.is_some();
        entries
            .into_iter()
            .map(|m| {
                let owned_by = m
                    .id
                    .split_once('/')
                    .map_or("huggingface", |(org, _)| org)
                    .to_owned();
                ModelInfo {
                    name: m.id.clone(),
                    owned_by,
                    id: m.id,
                    source: Source::Huggingface,
                    task,
                    context_length: None,
                    architecture: None,
                    providers: Vec::new(),
                    pricing: None,
                    available,
                }
            })
            .collect()
    }

    /// Fetches the router catalog keyed by model id.
    async fn fetch_router_providers(&self) -> HashMap<String, Vec<ProviderPricing>> {
        let url = format!("{}/v1/models", self.router_base_url);
        let mut request = self.client.get(&url).timeout(FETCH_TIMEOUT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let list: RouterList = match request.send().await {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(error = %e, "router catalog parse failed");
                    return HashMap::new();
                }
            },
            Ok(r) => {
                tracing::warn!(status = %r.status(), "router catalog fetch rejected");
                return HashMap::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "router catalog fetch failed");
                return HashMap::new();
            }
        };

        list.data
            .into_iter()
            .map(|m| {
                let providers = m
                    .providers
                    .into_iter()
                    .map(|p| ProviderPricing {
                        provider: p.provider,
                        status: p.status.unwrap_or(ProviderStatus::Offline),
                        context_length: p.context_length,
                        pricing: p.pricing,
                        supports_tools: p.supports_tools,
                        supports_structured_output: p.supports_structured_output,
                    })
                    .collect();
                (m.id, providers)
            })
            .collect()
    }

    async fn fetch_inner(&self) -> Vec<ModelInfo> {
        let mut models: Vec<ModelInfo> = Vec::new();
        for batch in HUB_TASKS.chunks(TASK_BATCH_SIZE) {
            if !models.is_empty() {
                tokio::time::sleep(BATCH_DELAY).await;
            }
            let fetched = join_all(
                batch
                    .iter()
                    .map(|&(tag, task)| self.fetch_task(tag, task)),
            )
            .await;
            models.extend(fetched.into_iter().flatten());
        }

        // A model enumerated under several pipeline tags keeps its first
        // (highest-priority) task.
        let mut seen = std::collections::HashSet::new();
        models.retain(|m| seen.insert(m.id.clone()));

        let provider_map = self.fetch_router_providers().await;
        for model in &mut models {
            if let Some(providers) = provider_map.get(&model.id) {
                model.providers = providers.clone();
                model.choose_cheapest_live_pricing();
            }
        }
        models
    }
}

impl ModelSource for HuggingFaceSource {
    fn source(&self) -> Source {
        Source::Huggingface
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        Box::pin(self.fetch_inner())
    }
}
