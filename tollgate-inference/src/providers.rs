//! Upstream provider HTTP plumbing.
//!
//! Chat traffic goes to each source's OpenAI-compatible
//! `/chat/completions` endpoint; multimodal tasks run over the
//! HuggingFace router's per-provider routes or Google's
//! `generateContent`. Every base URL is overridable so tests can point at
//! a mock server.

use http::StatusCode;
use serde_json::{Value, json};
use tollgate::config::ProviderKeys;
use tollgate::error::GatewayError;
use tollgate_registry::Source;

use crate::fallback::ProviderFailure;

/// Per-source endpoint bases.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// OpenAI API base.
    pub openai: String,
    /// Anthropic OpenAI-compatible base.
    pub anthropic: String,
    /// Google Generative Language base.
    pub google: String,
    /// Google OpenAI-compatible base.
    pub google_openai: String,
    /// ASI-One base.
    pub asi_one: String,
    /// ASI-Cloud base.
    pub asi_cloud: String,
    /// OpenRouter base.
    pub openrouter: String,
    /// AIML base.
    pub aiml: String,
    /// HuggingFace router base (chat + per-provider multimodal routes).
    pub hf_router: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/v1".into(),
            anthropic: "https://api.anthropic.com/v1".into(),
            google: "https://generativelanguage.googleapis.com/v1beta".into(),
            google_openai: "https://generativelanguage.googleapis.com/v1beta/openai".into(),
            asi_one: "https://api.asi1.ai/v1".into(),
            asi_cloud: "https://api.asicloud.ai/v1".into(),
            openrouter: "https://openrouter.ai/api/v1".into(),
            aiml: "https://api.aimlapi.com/v1".into(),
            hf_router: "https://router.huggingface.co".into(),
        }
    }
}

/// Provider HTTP client: shared reqwest client, credentials, endpoints.
#[derive(Debug, Clone)]
pub struct Providers {
    client: reqwest::Client,
    keys: ProviderKeys,
    endpoints: ProviderEndpoints,
}

impl Providers {
    /// Creates the provider set with production endpoints.
    #[must_use]
    pub fn new(client: reqwest::Client, keys: ProviderKeys) -> Self {
        Self {
            client,
            keys,
            endpoints: ProviderEndpoints::default(),
        }
    }

    /// Overrides the endpoint bases (tests).
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The Google API base and key, for the video/audio handlers.
    pub(crate) fn google(&self) -> Result<(&str, &str), GatewayError> {
        let key = self
            .keys
            .google
            .as_deref()
            .ok_or_else(|| GatewayError::Unavailable("GOOGLE_API_KEY is not set".into()))?;
        Ok((&self.endpoints.google, key))
    }

    /// Chat-completions base URL and credential for a source.
    fn chat_base(&self, source: Source) -> Result<(&str, Option<&str>), GatewayError> {
        let unavailable =
            |name: &str| GatewayError::Unavailable(format!("{name} credential is not set"));
        let (base, key, name) = match source {
            Source::Openai => (&self.endpoints.openai, &self.keys.openai, "OPENAI_API_KEY"),
            Source::Anthropic => (
                &self.endpoints.anthropic,
                &self.keys.anthropic,
                "ANTHROPIC_API_KEY",
            ),
            Source::Google => (
                &self.endpoints.google_openai,
                &self.keys.google,
                "GOOGLE_API_KEY",
            ),
            Source::AsiOne => (
                &self.endpoints.asi_one,
                &self.keys.asi_one,
                "ASI_ONE_API_KEY",
            ),
            Source::AsiCloud => (
                &self.endpoints.asi_cloud,
                &self.keys.asi_cloud,
                "ASI_CLOUD_API_KEY",
            ),
            Source::Openrouter => (
                &self.endpoints.openrouter,
                &self.keys.openrouter,
                "OPENROUTER_API_KEY",
            ),
            Source::Aiml => (&self.endpoints.aiml, &self.keys.aiml, "AIML_API_KEY"),
            Source::Huggingface => (
                &self.endpoints.hf_router,
                &self.keys.huggingface,
                "HF_TOKEN",
            ),
        };
        let key = key.as_deref().ok_or_else(|| unavailable(name))?;
        Ok((base.as_str(), Some(key)))
    }

    /// Opens a streaming chat completion against the source's
    /// OpenAI-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] for a missing credential and
    /// [`GatewayError::Upstream`] for transport failures or non-2xx.
    pub async fn open_chat_stream(
        &self,
        source: Source,
        body: &Value,
    ) -> Result<reqwest::Response, GatewayError> {
        let (base, key) = self.chat_base(source)?;
        let url = match source {
            Source::Huggingface => format!("{base}/v1/chat/completions"),
            _ => format!("{base}/chat/completions"),
        };
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("{source}: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream(format!(
                "{source} returned {status}: {detail}"
            )));
        }
        Ok(response)
    }

    /// Runs one multimodal inference call on a HuggingFace routing
    /// provider, returning the raw response bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderFailure`] carrying the status and body for the
    /// fallback classifier.
    pub async fn hf_provider_call(
        &self,
        provider: &str,
        model_id: &str,
        body: &Value,
    ) -> Result<(Vec<u8>, Option<String>), ProviderFailure> {
        let url = format!(
            "{}/{provider}/models/{model_id}",
            self.endpoints.hf_router
        );
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = self.keys.huggingface.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| ProviderFailure {
            provider: provider.to_owned(),
            status: None,
            message: e.to_string(),
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(|e| ProviderFailure {
            provider: provider.to_owned(),
            status: Some(status),
            message: e.to_string(),
        })?;

        if status.is_success() {
            Ok((bytes.to_vec(), content_type))
        } else {
            Err(ProviderFailure {
                provider: provider.to_owned(),
                status: Some(status),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            })
        }
    }

    /// Like [`Providers::hf_provider_call`], but POSTs a raw body (audio
    /// uploads for speech recognition).
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderFailure`] carrying the status and body.
    pub async fn hf_provider_call_bytes(
        &self,
        provider: &str,
        model_id: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<Vec<u8>, ProviderFailure> {
        let url = format!(
            "{}/{provider}/models/{model_id}",
            self.endpoints.hf_router
        );
        let mut request = self
            .client
            .post(&url)
            .header(http::header::CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = self.keys.huggingface.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| ProviderFailure {
            provider: provider.to_owned(),
            status: None,
            message: e.to_string(),
        })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| ProviderFailure {
            provider: provider.to_owned(),
            status: Some(status),
            message: e.to_string(),
        })?;
        if status.is_success() {
            Ok(bytes.to_vec())
        } else {
            Err(ProviderFailure {
                provider: provider.to_owned(),
                status: Some(status),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            })
        }
    }

    /// POSTs a Google `generateContent` request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] without a Google key,
    /// [`GatewayError::Upstream`] on failure.
    pub async fn google_generate(
        &self,
        model_id: &str,
        body: &Value,
    ) -> Result<Value, GatewayError> {
        let (base, key) = self.google()?;
        let url = format!("{base}/models/{model_id}:generateContent");
        let response = self
            .client
            .post(&url)
            .query(&[("key", key)])
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("google: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                return Err(GatewayError::NotFound(format!(
                    "google model '{model_id}' not found"
                )));
            }
            return Err(GatewayError::Upstream(format!(
                "google returned {status}: {detail}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("google response parse: {e}")))
    }

    /// Fetches a URL's bytes (inline audio/video delivered by reference).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Upstream`] on failure.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("fetch {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "fetch {url}: status {}",
                response.status()
            )));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| GatewayError::Upstream(format!("fetch {url}: {e}")))
    }

    /// Builds the default OpenAI-shaped streaming chat body.
    #[must_use]
    pub fn chat_body(model_id: &str, request_body: &Value) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": request_body.get("messages").cloned().unwrap_or_else(|| json!([])),
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        for passthrough in ["temperature", "max_tokens", "tools", "tool_choice", "top_p"] {
            if let Some(value) = request_body.get(passthrough) {
                body[passthrough] = value.clone();
            }
        }
        body
    }
}
