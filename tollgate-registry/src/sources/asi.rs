//! ASI-One and ASI-Cloud model fetchers.
//!
//! Both speak the OpenAI-shaped `GET /v1/models` protocol and differ only
//! in endpoint, credential, and catalog priority.

use tollgate::facilitator::BoxFuture;

use super::{ModelSource, fetch_openai_shaped};
use crate::model::{ModelInfo, Source};

const ASI_ONE_BASE_URL: &str = "https://api.asi1.ai/v1";
const ASI_CLOUD_BASE_URL: &str = "https://api.asicloud.ai/v1";

/// Fetches the ASI-One native model catalog.
#[derive(Debug, Clone)]
pub struct AsiOneSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AsiOneSource {
    /// Creates a fetcher with the given credential.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: ASI_ONE_BASE_URL.to_owned(),
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

impl ModelSource for AsiOneSource {
    fn source(&self) -> Source {
        Source::AsiOne
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        Box::pin(async move {
            let url = format!("{}/models", self.base_url);
            fetch_openai_shaped(&self.client, &url, self.api_key.as_deref(), Source::AsiOne).await
        })
    }
}

/// Fetches the ASI-Cloud model catalog.
#[derive(Debug, Clone)]
pub struct AsiCloudSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AsiCloudSource {
    /// Creates a fetcher with the given credential.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: ASI_CLOUD_BASE_URL.to_owned(),
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

impl ModelSource for AsiCloudSource {
    fn source(&self) -> Source {
        Source::AsiCloud
    }

    fn fetch(&self) -> BoxFuture<'_, Vec<ModelInfo>> {
        Box::pin(async move {
            let url = format!("{}/models", self.base_url);
            fetch_openai_shaped(
                &self.client,
                &url,
                self.api_key.as_deref(),
                Source::AsiCloud,
            )
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn asi_one_models_carry_their_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "asi1-mini", "owned_by": "fetchai" }]
            })))
            .mount(&server)
            .await;

        let source = AsiOneSource::new(reqwest::Client::new(), Some("key".into()))
            .with_base_url(server.uri());
        let models = source.fetch().await;
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].source, Source::AsiOne);
        assert_eq!(models[0].id, "asi1-mini");
    }

    #[tokio::test]
    async fn missing_credential_marks_models_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "llama-3.3-70b" }]
            })))
            .mount(&server)
            .await;

        let source =
            AsiCloudSource::new(reqwest::Client::new(), None).with_base_url(server.uri());
        let models = source.fetch().await;
        assert_eq!(models.len(), 1);
        assert!(!models[0].available);
    }
}
