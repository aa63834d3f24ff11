//! Catalog data model and model-id task classification.

use serde::{Deserialize, Serialize};
use tollgate::pricing::ModelRates;

/// A provider source the registry aggregates models from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// ASI-Cloud native models.
    AsiCloud,
    /// ASI-One native models.
    AsiOne,
    /// Google AI (Gemini family).
    Google,
    /// OpenAI.
    Openai,
    /// Anthropic.
    Anthropic,
    /// HuggingFace router (multi-provider).
    Huggingface,
    /// OpenRouter aggregator.
    Openrouter,
    /// AIML aggregator.
    Aiml,
}

impl Source {
    /// Deduplication priority; lower wins.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::AsiCloud => 1,
            Self::AsiOne => 2,
            Self::Google | Self::Openai | Self::Anthropic => 3,
            Self::Huggingface => 4,
            Self::Openrouter => 5,
            Self::Aiml => 6,
        }
    }

    /// The kebab-case wire name of the source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AsiCloud => "asi-cloud",
            Self::AsiOne => "asi-one",
            Self::Google => "google",
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Huggingface => "huggingface",
            Self::Openrouter => "openrouter",
            Self::Aiml => "aiml",
        }
    }

    /// Parses a kebab-case source name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asi-cloud" => Some(Self::AsiCloud),
            "asi-one" => Some(Self::AsiOne),
            "google" => Some(Self::Google),
            "openai" => Some(Self::Openai),
            "anthropic" => Some(Self::Anthropic),
            "huggingface" => Some(Self::Huggingface),
            "openrouter" => Some(Self::Openrouter),
            "aiml" => Some(Self::Aiml),
            _ => None,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The task a model performs, as advertised by its source or inferred from
/// its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTask {
    /// Chat / completion text generation.
    TextGeneration,
    /// Prompt-to-image generation.
    TextToImage,
    /// Image editing / transformation guided by a prompt.
    ImageToImage,
    /// Speech synthesis.
    TextToSpeech,
    /// Prompt-to-video generation.
    TextToVideo,
    /// Prompt-to-audio (music) generation.
    TextToAudio,
    /// Speech transcription.
    AutomaticSpeechRecognition,
    /// Embedding extraction.
    FeatureExtraction,
    /// Sentence similarity scoring.
    SentenceSimilarity,
    /// Bidirectional / realtime conversation.
    Conversational,
    /// Anything the source advertises that the gateway does not route.
    #[serde(other)]
    Unknown,
}

impl ModelTask {
    /// The kebab-case wire name of the task.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TextGeneration => "text-generation",
            Self::TextToImage => "text-to-image",
            Self::ImageToImage => "image-to-image",
            Self::TextToSpeech => "text-to-speech",
            Self::TextToVideo => "text-to-video",
            Self::TextToAudio => "text-to-audio",
            Self::AutomaticSpeechRecognition => "automatic-speech-recognition",
            Self::FeatureExtraction => "feature-extraction",
            Self::SentenceSimilarity => "sentence-similarity",
            Self::Conversational => "conversational",
            Self::Unknown => "unknown",
        }
    }
}

/// Classifies a model by identifier alone.
///
/// The predicates are ordered; the same model id can appear in several
/// sources with inconsistent task tags, so this list is the tie-breaker
/// and must not be reordered.
#[must_use]
pub fn classify_model_id(id: &str) -> Option<ModelTask> {
    let id = id.to_ascii_lowercase();
    let rules: &[(fn(&str) -> bool, ModelTask)] = &[
        (
            |id| {
                ["flux", "stable-diffusion", "sdxl", "dall"]
                    .iter()
                    .any(|m| id.contains(m))
            },
            ModelTask::TextToImage,
        ),
        (
            |id| ["whisper", "speech-to-text"].iter().any(|m| id.contains(m)),
            ModelTask::AutomaticSpeechRecognition,
        ),
        (
            |id| {
                ["tts", "text-to-speech", "bark", "speecht5"]
                    .iter()
                    .any(|m| id.contains(m))
            },
            ModelTask::TextToSpeech,
        ),
        (
            |id| {
                ["embed", "e5", "bge", "minilm", "sentence-transformer"]
                    .iter()
                    .any(|m| id.contains(m))
            },
            ModelTask::FeatureExtraction,
        ),
        (|id| id.contains("veo"), ModelTask::TextToVideo),
        (|id| id.contains("lyria"), ModelTask::TextToAudio),
        (
            |id| id.contains("imagen") || id.ends_with("-image"),
            ModelTask::TextToImage,
        ),
    ];
    rules
        .iter()
        .find(|(predicate, _)| predicate(&id))
        .map(|(_, task)| *task)
}

/// Provider availability status on the HuggingFace router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Serving traffic.
    Live,
    /// Deployed but not production-ready.
    Staging,
    /// Not serving.
    Offline,
}

/// One provider's offering of a model, with optional pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPricing {
    /// Provider name (e.g. `hf-inference`, `replicate`).
    pub provider: String,
    /// Availability status.
    pub status: ProviderStatus,
    /// Context window, when the provider reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    /// USD per-million-token rates, when published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelRates>,
    /// Whether the provider supports tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_tools: Option<bool>,
    /// Whether the provider supports structured output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_structured_output: Option<bool>,
}

/// Input/output modalities of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Architecture {
    /// Accepted input modalities (`text`, `image`, ...).
    pub input_modalities: Vec<String>,
    /// Produced output modalities.
    pub output_modalities: Vec<String>,
}

/// The chosen pricing for a model: the cheapest live provider for
/// HF-routed models, or the source's native rates otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    /// Provider the rates belong to; one of the model's `providers`, or
    /// equal to the model's source name.
    pub provider: String,
    /// USD per-million-token rates.
    #[serde(flatten)]
    pub rates: ModelRates,
}

/// One model in the aggregated catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Source-native model identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owning organization.
    pub owned_by: String,
    /// The source this entry came from.
    pub source: Source,
    /// The task the model performs.
    pub task: ModelTask,
    /// Context window, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    /// Input/output modalities, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    /// Per-provider offerings (HF-routed models).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderPricing>,
    /// The chosen top-level pricing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,
    /// Whether the source's credential is present.
    pub available: bool,
}

impl ModelInfo {
    /// Picks the cheapest live provider with published pricing and promotes
    /// it to the model's top-level pricing. No-op when no provider
    /// qualifies.
    pub fn choose_cheapest_live_pricing(&mut self) {
        let cheapest = self
            .providers
            .iter()
            .filter(|p| p.status == ProviderStatus::Live)
            .filter_map(|p| p.pricing.map(|rates| (p, rates)))
            .min_by_key(|(_, rates)| rates.input + rates.output);
        if let Some((provider, rates)) = cheapest {
            self.pricing = Some(ModelPricing {
                provider: provider.provider.clone(),
                rates,
            });
        }
    }
}

/// The aggregated, deduplicated catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalog {
    /// Deduplicated models.
    pub models: Vec<ModelInfo>,
    /// Build time, epoch milliseconds.
    pub last_updated: u64,
    /// Sources that contributed at least one model.
    pub sources: Vec<Source>,
}

impl ModelCatalog {
    /// Finds a model by its source-native id.
    #[must_use]
    pub fn model(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }
}
