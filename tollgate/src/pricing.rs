//! Per-task price tables and token-metered cost computation.
//!
//! Prices are denominated in the smallest unit of a 6-decimal stablecoin
//! ("wei"), so 1 USDC = 1_000_000 wei. Non-token tasks bill a flat base
//! price; inference is metered from token usage plus a platform fee of
//! $0.10 per million tokens.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Hard cap on tokens billed for a single call. Authorization ceilings and
/// settlement amounts are both computed under this cap.
pub const MAX_TOKENS_PER_CALL: u64 = 200_000;

/// Platform surcharge in USD per million tokens.
#[must_use]
pub fn platform_fee_per_mtok() -> Decimal {
    // $0.10
    Decimal::new(10, 2)
}

/// One million, as a decimal, for per-mtok rate math.
fn mtok() -> Decimal {
    Decimal::from(1_000_000_u64)
}

/// The billable task classes the gateway prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillableTask {
    /// A chat / text-generation inference call.
    AgentChat,
    /// A read-only MCP tool invocation.
    McpToolRead,
    /// A state-changing tool invocation.
    ToolTransaction,
    /// Image generation on a FLUX-class model.
    ImageGenFlux,
    /// Image generation on an SDXL-class model.
    ImageGenSdxl,
    /// Text-to-speech synthesis.
    AudioTts,
    /// Automatic speech recognition.
    AudioAsr,
    /// Video generation.
    VideoGen,
    /// Memory search.
    MemSearch,
    /// Memory insertion.
    MemAdd,
}

impl BillableTask {
    /// Base price in token wei (6-decimal stablecoin smallest units).
    ///
    /// For non-token tasks this is the full price unless the provider
    /// returns a measured cost; for inference it is the floor under the
    /// metered cost ceiling.
    #[must_use]
    pub const fn base_price_wei(self) -> u128 {
        match self {
            Self::AgentChat => 5_000,
            Self::McpToolRead => 1_000,
            Self::ToolTransaction => 5_000,
            Self::ImageGenFlux => 100_000,
            Self::ImageGenSdxl => 50_000,
            Self::AudioTts => 20_000,
            Self::AudioAsr => 15_000,
            Self::VideoGen => 500_000,
            Self::MemSearch => 500,
            Self::MemAdd => 1_000,
        }
    }
}

/// Token usage extracted from a provider response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt-side tokens.
    pub input_tokens: u64,
    /// Completion-side tokens.
    pub output_tokens: u64,
    /// Reasoning tokens, when the provider reports them separately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    /// Total billed tokens.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Creates usage from input/output counts, deriving the total.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            reasoning_tokens: None,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Parses a provider `usage` object, accepting both the
    /// `prompt_tokens`/`completion_tokens` and `input_tokens`/`output_tokens`
    /// field conventions.
    #[must_use]
    pub fn from_provider_json(usage: &serde_json::Value) -> Self {
        let field = |names: &[&str]| -> u64 {
            names
                .iter()
                .find_map(|n| usage.get(n).and_then(serde_json::Value::as_u64))
                .unwrap_or(0)
        };
        let input = field(&["prompt_tokens", "input_tokens", "promptTokens"]);
        let output = field(&["completion_tokens", "output_tokens", "completionTokens"]);
        let reasoning = usage
            .get("completion_tokens_details")
            .and_then(|d| d.get("reasoning_tokens"))
            .and_then(serde_json::Value::as_u64);
        let total = field(&["total_tokens", "totalTokens"]).max(input + output);
        Self {
            input_tokens: input,
            output_tokens: output,
            reasoning_tokens: reasoning,
            total_tokens: total,
        }
    }

    /// Clamps usage to [`MAX_TOKENS_PER_CALL`]. Overflow is removed from
    /// the output side first so prompt accounting stays intact.
    #[must_use]
    pub fn capped(self) -> Self {
        let total = self.input_tokens + self.output_tokens;
        if total <= MAX_TOKENS_PER_CALL {
            return Self {
                total_tokens: self.total_tokens.min(MAX_TOKENS_PER_CALL),
                ..self
            };
        }
        let input = self.input_tokens.min(MAX_TOKENS_PER_CALL);
        let output = MAX_TOKENS_PER_CALL - input;
        Self {
            input_tokens: input,
            output_tokens: output,
            reasoning_tokens: self.reasoning_tokens,
            total_tokens: MAX_TOKENS_PER_CALL,
        }
    }
}

/// Per-million-token USD rates for one model on one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRates {
    /// USD per million input tokens.
    pub input: Decimal,
    /// USD per million output tokens.
    pub output: Decimal,
}

/// The metered cost of one inference call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceCost {
    /// The provider's share in USD.
    pub provider_cost: Decimal,
    /// The platform fee in USD.
    pub platform_fee: Decimal,
    /// Total in USD.
    pub total: Decimal,
    /// Total in token wei.
    pub total_wei: u128,
    /// The provider whose rates were applied, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Converts a USD amount into 6-decimal token wei, rounding up so metered
/// fractions are never billed below cost.
#[must_use]
pub fn usd_to_wei(usd: Decimal) -> u128 {
    let scaled = (usd * mtok()).ceil();
    scaled.to_u128().unwrap_or(0)
}

/// Computes the metered cost of an inference call.
///
/// Usage is clamped to [`MAX_TOKENS_PER_CALL`] first. Without rates the
/// provider cost is zero and only the platform fee is charged.
#[must_use]
pub fn inference_cost(
    rates: Option<&ModelRates>,
    provider: Option<&str>,
    usage: TokenUsage,
) -> InferenceCost {
    let usage = usage.capped();
    let provider_cost = rates.map_or(Decimal::ZERO, |r| {
        Decimal::from(usage.input_tokens) / mtok() * r.input
            + Decimal::from(usage.output_tokens) / mtok() * r.output
    });
    let platform_fee = Decimal::from(usage.total_tokens) / mtok() * platform_fee_per_mtok();
    let total = provider_cost + platform_fee;
    InferenceCost {
        provider_cost,
        platform_fee,
        total,
        total_wei: usd_to_wei(total),
        provider: rates.and(provider).map(str::to_owned),
    }
}

/// Computes the authorization ceiling for an inference call, in wei.
///
/// The worst case prices every capped token at the model's more expensive
/// side plus the platform fee, floored at the flat chat base price so
/// unpriced models still present a nonzero ceiling.
#[must_use]
pub fn inference_ceiling_wei(rates: Option<&ModelRates>) -> u128 {
    let cap = Decimal::from(MAX_TOKENS_PER_CALL);
    let worst_rate = rates.map_or(Decimal::ZERO, |r| r.input.max(r.output));
    let usd = cap / mtok() * worst_rate + cap / mtok() * platform_fee_per_mtok();
    usd_to_wei(usd).max(BillableTask::AgentChat.base_price_wei())
}
