//! Environment-driven gateway configuration.
//!
//! Variable names are contracts with the facilitator and the providers and
//! must stay stable:
//!
//! - `FACILITATOR_URL` — base URL of the payment facilitator
//! - `USE_MAINNET` — `true` settles on Base mainnet, otherwise Base Sepolia
//! - `PAYMENT_RECIPIENT` — address settled amounts are paid to
//! - `CONNECTOR_REGISTRY_URL` — connector service holding MCP spawn configs
//! - `PUBLIC_BASE_URL` — externally visible origin for resource URLs
//! - Provider credentials: `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//!   `GOOGLE_API_KEY`, `ASI_ONE_API_KEY`, `ASI_CLOUD_API_KEY`,
//!   `OPENROUTER_API_KEY`, `AIML_API_KEY`, `HF_TOKEN`

use crate::gate::GateConfig;

/// USDC contract on Base mainnet (`eip155:8453`).
pub const USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

/// USDC contract on Base Sepolia (`eip155:84532`).
pub const USDC_BASE_SEPOLIA: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

/// Default facilitator when `FACILITATOR_URL` is unset.
pub const DEFAULT_FACILITATOR_URL: &str = "https://x402.org/facilitator";

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

/// Per-provider API credentials. Absence of a credential marks the
/// corresponding model source unavailable without failing startup.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    /// OpenAI API key.
    pub openai: Option<String>,
    /// Anthropic API key.
    pub anthropic: Option<String>,
    /// Google AI API key.
    pub google: Option<String>,
    /// ASI-One API key.
    pub asi_one: Option<String>,
    /// ASI-Cloud API key.
    pub asi_cloud: Option<String>,
    /// OpenRouter API key.
    pub openrouter: Option<String>,
    /// AIML API key.
    pub aiml: Option<String>,
    /// HuggingFace inference token.
    pub huggingface: Option<String>,
}

impl ProviderKeys {
    /// Reads all provider credentials from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            openai: non_empty_var("OPENAI_API_KEY"),
            anthropic: non_empty_var("ANTHROPIC_API_KEY"),
            google: non_empty_var("GOOGLE_API_KEY"),
            asi_one: non_empty_var("ASI_ONE_API_KEY"),
            asi_cloud: non_empty_var("ASI_CLOUD_API_KEY"),
            openrouter: non_empty_var("OPENROUTER_API_KEY"),
            aiml: non_empty_var("AIML_API_KEY"),
            huggingface: non_empty_var("HF_TOKEN"),
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the payment facilitator.
    pub facilitator_url: String,
    /// Whether payments settle on mainnet.
    pub use_mainnet: bool,
    /// Recipient address for settled amounts.
    pub pay_to: String,
    /// Base URL of the connector service holding MCP spawn configs.
    pub connector_registry_url: Option<String>,
    /// Externally visible origin used to build resource URLs.
    pub public_base_url: Option<String>,
    /// Per-provider API credentials.
    pub keys: ProviderKeys,
}

impl GatewayConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] when `PAYMENT_RECIPIENT` is
    /// unset; every other variable has a default or is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pay_to =
            non_empty_var("PAYMENT_RECIPIENT").ok_or(ConfigError::MissingVar("PAYMENT_RECIPIENT"))?;
        Ok(Self {
            facilitator_url: non_empty_var("FACILITATOR_URL")
                .unwrap_or_else(|| DEFAULT_FACILITATOR_URL.to_owned()),
            use_mainnet: non_empty_var("USE_MAINNET")
                .is_some_and(|v| matches!(v.as_str(), "true" | "1" | "yes")),
            pay_to,
            connector_registry_url: non_empty_var("CONNECTOR_REGISTRY_URL"),
            public_base_url: non_empty_var("PUBLIC_BASE_URL"),
            keys: ProviderKeys::from_env(),
        })
    }

    /// CAIP-2 chain ID payments settle on.
    #[must_use]
    pub const fn network(&self) -> &'static str {
        if self.use_mainnet {
            "eip155:8453"
        } else {
            "eip155:84532"
        }
    }

    /// Stablecoin contract payments are priced in.
    #[must_use]
    pub const fn asset(&self) -> &'static str {
        if self.use_mainnet {
            USDC_BASE
        } else {
            USDC_BASE_SEPOLIA
        }
    }

    /// The gate configuration derived from chain selection and recipient.
    #[must_use]
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            network: self.network().to_owned(),
            asset: self.asset().to_owned(),
            pay_to: self.pay_to.clone(),
        }
    }
}

/// Reads an environment variable, treating empty values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
