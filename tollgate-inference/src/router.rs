//! Task detection and dispatch.
//!
//! Detection precedence: explicit `task` in the request, the registry
//! entry's task, model-id heuristics, then the text-generation default.
//! After that, a request carrying an `image` upgrades text-to-image and
//! text-generation to image-to-image. The heuristics live in one ordered
//! list so the same model id always resolves the same way regardless of
//! which source advertised it.

use std::sync::Arc;

use serde_json::Value;
use tollgate::error::GatewayError;
use tollgate::pricing::{
    BillableTask, InferenceCost, ModelRates, TokenUsage, inference_ceiling_wei, inference_cost,
};
use tollgate_registry::model::classify_model_id;
use tollgate_registry::{ModelTask, Registry, Source};

use crate::handlers::{
    self, BinaryOutput, ChatStream, FinishHook, JsonOutput,
};
use crate::providers::Providers;

/// Detects the task for a request.
#[must_use]
pub fn detect_task(
    explicit: Option<&str>,
    registry_task: Option<ModelTask>,
    model_id: &str,
    body: &Value,
) -> ModelTask {
    let detected = explicit
        .and_then(parse_task)
        .or(registry_task)
        .filter(|t| *t != ModelTask::Unknown)
        .or_else(|| classify_model_id(model_id))
        .unwrap_or(ModelTask::TextGeneration);

    // A request carrying an input image upgrades to image-to-image.
    let has_image = body.get("image").is_some_and(|v| !v.is_null());
    if has_image && matches!(detected, ModelTask::TextToImage | ModelTask::TextGeneration) {
        return ModelTask::ImageToImage;
    }
    detected
}

/// Parses an explicit task string.
fn parse_task(value: &str) -> Option<ModelTask> {
    serde_json::from_value(Value::String(value.to_owned())).ok()
}

/// What a handler produced.
#[derive(Debug)]
pub enum InferenceOutcome {
    /// A live SSE stream; settlement runs in its finish hook.
    Stream(ChatStream),
    /// A single-shot binary payload.
    Binary(BinaryOutput),
    /// A single-shot JSON payload.
    Json(JsonOutput),
}

/// The multimodal router.
#[derive(Debug, Clone)]
pub struct InferenceRouter {
    providers: Providers,
    registry: Arc<Registry>,
}

impl InferenceRouter {
    /// Creates a router over the provider set and registry.
    #[must_use]
    pub fn new(providers: Providers, registry: Arc<Registry>) -> Self {
        Self {
            providers,
            registry,
        }
    }

    /// The registry this router resolves models against.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolves the task and chat source for a model, consulting the
    /// registry snapshot.
    pub async fn resolve(
        &self,
        model_id: &str,
        explicit_task: Option<&str>,
        body: &Value,
    ) -> (ModelTask, Source) {
        let model = self.registry.model_info(model_id).await;
        let task = detect_task(
            explicit_task,
            model.as_ref().map(|m| m.task),
            model_id,
            body,
        );
        // Unknown models route like their id looks: org-scoped ids go to
        // HuggingFace routing, bare ids to ASI-One.
        let source = model.map_or_else(
            || {
                if model_id.contains('/') {
                    Source::Huggingface
                } else {
                    Source::AsiOne
                }
            },
            |m| m.source,
        );
        (task, source)
    }

    /// Dispatches one request to its task handler.
    ///
    /// `on_finish` is consumed by the streaming handler; for single-shot
    /// tasks the caller settles from the returned usage instead.
    ///
    /// # Errors
    ///
    /// Propagates the handler error; see each handler for its conditions.
    pub async fn handle(
        &self,
        task: ModelTask,
        source: Source,
        model_id: &str,
        body: &Value,
        on_finish: FinishHook,
    ) -> Result<InferenceOutcome, GatewayError> {
        match task {
            ModelTask::TextGeneration | ModelTask::Conversational | ModelTask::Unknown => {
                let stream =
                    handlers::stream_chat(&self.providers, source, model_id, body, on_finish)
                        .await?;
                Ok(InferenceOutcome::Stream(stream))
            }
            ModelTask::TextToImage => {
                let output =
                    handlers::generate_image(&self.providers, model_id, body, false).await?;
                Ok(InferenceOutcome::Binary(output))
            }
            ModelTask::ImageToImage => {
                let output =
                    handlers::generate_image(&self.providers, model_id, body, true).await?;
                Ok(InferenceOutcome::Binary(output))
            }
            ModelTask::TextToSpeech => {
                let output = handlers::text_to_speech(&self.providers, model_id, body).await?;
                Ok(InferenceOutcome::Binary(output))
            }
            ModelTask::AutomaticSpeechRecognition => {
                let audio = extract_audio(body)?;
                let output = handlers::speech_to_text(&self.providers, model_id, audio).await?;
                Ok(InferenceOutcome::Json(output))
            }
            ModelTask::TextToVideo => {
                let output = handlers::generate_video(&self.providers, model_id, body).await?;
                Ok(InferenceOutcome::Json(output))
            }
            ModelTask::TextToAudio => {
                let output = handlers::generate_audio(&self.providers, model_id, body).await?;
                Ok(InferenceOutcome::Binary(output))
            }
            ModelTask::FeatureExtraction => {
                let output = handlers::embed(&self.providers, model_id, body, false).await?;
                Ok(InferenceOutcome::Json(output))
            }
            ModelTask::SentenceSimilarity => {
                let output = handlers::embed(&self.providers, model_id, body, true).await?;
                Ok(InferenceOutcome::Json(output))
            }
        }
    }

    /// The authorization ceiling for one request, in wei.
    pub async fn ceiling_wei(&self, task: ModelTask, model_id: &str) -> u128 {
        if is_token_metered(task) {
            let rates = self.registry.rates_for(model_id).await.map(|(_, r)| r);
            inference_ceiling_wei(rates.as_ref())
        } else {
            billable_task(task, model_id).base_price_wei()
        }
    }

    /// The amount to settle for a completed single-shot call, in wei.
    ///
    /// Token-metered tasks settle the metered cost; flat-priced tasks
    /// settle their base price (there is no measured provider cost on
    /// this path).
    pub async fn settle_amount(
        &self,
        task: ModelTask,
        model_id: &str,
        usage: TokenUsage,
    ) -> (InferenceCost, u128) {
        let cost = self.cost_for(model_id, usage).await;
        let amount = if is_token_metered(task) {
            cost.total_wei
        } else {
            billable_task(task, model_id).base_price_wei()
        };
        (cost, amount)
    }

    /// The metered cost of usage against a model's chosen rates.
    pub async fn cost_for(&self, model_id: &str, usage: TokenUsage) -> InferenceCost {
        let rates: Option<(String, ModelRates)> = self.registry.rates_for(model_id).await;
        inference_cost(
            rates.as_ref().map(|(_, r)| r),
            rates.as_ref().map(|(p, _)| p.as_str()),
            usage,
        )
    }
}

/// Whether settlement follows token usage rather than a flat price.
#[must_use]
pub fn is_token_metered(task: ModelTask) -> bool {
    matches!(
        task,
        ModelTask::TextGeneration
            | ModelTask::Conversational
            | ModelTask::Unknown
            | ModelTask::FeatureExtraction
            | ModelTask::SentenceSimilarity
    )
}

/// Maps a task (and model id, for image classes) onto its price-table row.
#[must_use]
pub fn billable_task(task: ModelTask, model_id: &str) -> BillableTask {
    match task {
        ModelTask::TextToImage | ModelTask::ImageToImage => {
            if model_id.to_ascii_lowercase().contains("flux") {
                BillableTask::ImageGenFlux
            } else {
                BillableTask::ImageGenSdxl
            }
        }
        ModelTask::TextToSpeech | ModelTask::TextToAudio => BillableTask::AudioTts,
        ModelTask::AutomaticSpeechRecognition => BillableTask::AudioAsr,
        ModelTask::TextToVideo => BillableTask::VideoGen,
        ModelTask::TextGeneration
        | ModelTask::Conversational
        | ModelTask::FeatureExtraction
        | ModelTask::SentenceSimilarity
        | ModelTask::Unknown => BillableTask::AgentChat,
    }
}

/// Pulls ASR audio out of the request body: base64 in `audio` or
/// `inputs`.
fn extract_audio(body: &Value) -> Result<Vec<u8>, GatewayError> {
    use base64::Engine;
    let encoded = body
        .get("audio")
        .or_else(|| body.get("inputs"))
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidInput("'audio' (base64) is required".into()))?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| GatewayError::InvalidInput(format!("audio is not valid base64: {e}")))
}
