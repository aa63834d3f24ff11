//! The TTL-cached catalog handle.
//!
//! One [`Registry`] lives for the process lifetime. The catalog is built
//! lazily on first query, rebuilt by [`Registry::refresh`], and swapped in
//! as a complete [`Arc`] snapshot so readers never observe a half-merged
//! state.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tollgate::config::ProviderKeys;
use tollgate::pricing::{InferenceCost, ModelRates, TokenUsage, inference_cost};

use crate::model::{ModelCatalog, ModelInfo, Source};
use crate::normalize::deduplicate;
use crate::pricing_table::overlay_pricing;
use crate::sources::{
    AimlSource, AnthropicSource, AsiCloudSource, AsiOneSource, GoogleSource, HuggingFaceSource,
    ModelSource, OpenAiSource, OpenRouterSource,
};

/// How long a built catalog stays fresh.
pub const REGISTRY_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// A built catalog with its freshness deadline.
struct CacheState {
    catalog: Arc<ModelCatalog>,
    expires_at: Instant,
}

/// The aggregated model registry.
pub struct Registry {
    sources: Vec<Arc<dyn ModelSource>>,
    ttl: Duration,
    cache: RwLock<Option<CacheState>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sources", &self.sources.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Creates a registry over the given fetchers.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn ModelSource>>) -> Self {
        Self {
            sources,
            ttl: REGISTRY_TTL,
            cache: RwLock::new(None),
        }
    }

    /// Overrides the cache TTL (tests).
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Creates a registry with every production fetcher, wired to the
    /// configured credentials.
    #[must_use]
    pub fn from_keys(client: reqwest::Client, keys: &ProviderKeys) -> Self {
        let sources: Vec<Arc<dyn ModelSource>> = vec![
            Arc::new(HuggingFaceSource::new(
                client.clone(),
                keys.huggingface.clone(),
            )),
            Arc::new(AsiOneSource::new(client.clone(), keys.asi_one.clone())),
            Arc::new(AsiCloudSource::new(client.clone(), keys.asi_cloud.clone())),
            Arc::new(OpenAiSource::new(client.clone(), keys.openai.clone())),
            Arc::new(AnthropicSource::new(client.clone(), keys.anthropic.clone())),
            Arc::new(GoogleSource::new(client.clone(), keys.google.clone())),
            Arc::new(OpenRouterSource::new(
                client.clone(),
                keys.openrouter.clone(),
            )),
            Arc::new(AimlSource::new(client, keys.aiml.clone())),
        ];
        Self::new(sources)
    }

    /// Builds a fresh catalog from every source.
    async fn build(&self) -> Arc<ModelCatalog> {
        let fetched = join_all(self.sources.iter().map(|s| {
            let source = s.source();
            async move { (source, s.fetch().await) }
        }))
        .await;

        let mut contributing: Vec<Source> = Vec::new();
        let mut models: Vec<ModelInfo> = Vec::new();
        for (source, mut list) in fetched {
            if list.is_empty() {
                continue;
            }
            if !contributing.contains(&source) {
                contributing.push(source);
            }
            models.append(&mut list);
        }

        let total = models.len();
        let mut models = deduplicate(models);
        overlay_pricing(&mut models);
        tracing::info!(
            total,
            deduped = models.len(),
            sources = contributing.len(),
            "model catalog rebuilt"
        );

        Arc::new(ModelCatalog {
            models,
            last_updated: epoch_millis(),
            sources: contributing,
        })
    }

    /// Returns the current catalog snapshot, building it on first use or
    /// after TTL expiry.
    pub async fn catalog(&self) -> Arc<ModelCatalog> {
        {
            let guard = self.cache.read().await;
            if let Some(state) = guard.as_ref() {
                if Instant::now() < state.expires_at {
                    return Arc::clone(&state.catalog);
                }
            }
        }
        self.refresh().await
    }

    /// Rebuilds the catalog and swaps it in atomically.
    pub async fn refresh(&self) -> Arc<ModelCatalog> {
        let catalog = self.build().await;
        let mut guard = self.cache.write().await;
        *guard = Some(CacheState {
            catalog: Arc::clone(&catalog),
            expires_at: Instant::now() + self.ttl,
        });
        catalog
    }

    /// Finds a model by its source-native id. O(n) over the snapshot.
    pub async fn model_info(&self, id: &str) -> Option<ModelInfo> {
        self.catalog().await.model(id).cloned()
    }

    /// Models contributed by one source.
    pub async fn models_for_source(&self, source: Source) -> Vec<ModelInfo> {
        self.catalog()
            .await
            .models
            .iter()
            .filter(|m| m.source == source)
            .cloned()
            .collect()
    }

    /// Models whose source credential is present.
    pub async fn available_models(&self) -> Vec<ModelInfo> {
        self.catalog()
            .await
            .models
            .iter()
            .filter(|m| m.available)
            .cloned()
            .collect()
    }

    /// The chosen rates for a model, with the provider they belong to.
    pub async fn rates_for(&self, id: &str) -> Option<(String, ModelRates)> {
        let model = self.model_info(id).await?;
        model.pricing.map(|p| (p.provider, p.rates))
    }

    /// Computes the metered cost of an inference call against the model's
    /// chosen rates. Unpriced models bill only the platform fee.
    pub async fn inference_cost_for(
        &self,
        id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> InferenceCost {
        let rates = self.rates_for(id).await;
        inference_cost(
            rates.as_ref().map(|(_, r)| r),
            rates.as_ref().map(|(p, _)| p.as_str()),
            TokenUsage::new(input_tokens, output_tokens),
        )
    }
}

/// Milliseconds since the Unix epoch.
fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
