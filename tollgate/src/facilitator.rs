//! The [`Facilitator`] trait and its remote HTTP client.
//!
//! The facilitator is the external service trusted to validate and execute
//! payment authorizations against the underlying ledger; the gateway never
//! holds private keys. The trait is dyn-compatible so the gate can hold a
//! `Arc<dyn Facilitator>` and tests can substitute mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use reqwest::Client;
use url::Url;

use crate::proto::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

/// Boxed future type alias for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur while talking to a facilitator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FacilitatorError {
    /// URL construction failed.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport failure (connection refused, timeout, TLS, ...).
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The facilitator answered with an unexpected status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// The facilitator answered 200 with a body that did not parse.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// Trait defining the asynchronous interface to a payment facilitator.
///
/// Dyn-compatible: instances are stored as `Arc<dyn Facilitator>` in the
/// payment gate and swapped for mocks in tests.
pub trait Facilitator: Send + Sync {
    /// Validates a payment authorization against its requirements.
    ///
    /// A rejected authorization is a successful call returning
    /// [`VerifyResponse::Invalid`]; the error type covers transport and
    /// protocol failures only.
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>>;

    /// Transfers the settled amount from the payer to the recipient.
    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>>;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        self.as_ref().settle(request)
    }
}

/// A client for a remote facilitator speaking `POST /verify` and
/// `POST /settle` over JSON HTTP.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator.
    base_url: Url,
    /// Full URL for `POST /verify` requests.
    verify_url: Url,
    /// Full URL for `POST /settle` requests.
    settle_url: Url,
    /// Shared reqwest HTTP client.
    client: Client,
    /// Optional per-request timeout.
    timeout: Option<Duration>,
}

impl FacilitatorClient {
    /// Constructs a client from a base URL, deriving the `./verify` and
    /// `./settle` endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError::UrlParse`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorError> {
        let verify_url = base_url
            .join("./verify")
            .map_err(|e| FacilitatorError::UrlParse {
                context: "Failed to construct ./verify URL",
                source: e,
            })?;
        let settle_url = base_url
            .join("./settle")
            .map_err(|e| FacilitatorError::UrlParse {
                context: "Failed to construct ./settle URL",
                source: e,
            })?;
        Ok(Self {
            base_url,
            verify_url,
            settle_url,
            client: Client::new(),
            timeout: None,
        })
    }

    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Generic POST helper handling JSON serialization, timeout application,
    /// and error mapping.
    ///
    /// `context` is a human-readable identifier used in error messages
    /// (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| FacilitatorError::Http { context, source: e })?;

        if response.status() == StatusCode::OK {
            response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorError::JsonDeserialization { context, source: e })
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FacilitatorError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

impl Facilitator for FacilitatorClient {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        Box::pin(async move {
            self.post_json(&self.verify_url, "POST /verify", &request)
                .await
        })
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        Box::pin(async move {
            self.post_json(&self.settle_url, "POST /settle", &request)
                .await
        })
    }
}

/// Converts a string URL into a [`FacilitatorClient`], normalizing the
/// trailing slash so relative joins behave.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::PaymentRequirements;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn requirements(resource: &str) -> PaymentRequirements {
        PaymentRequirements::upto("eip155:84532", "0xToken", "0xTo", resource, 10_000)
    }

    #[tokio::test]
    async fn verify_posts_to_verify_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(json!({
                "paymentRequirements": { "scheme": "upto", "maxAmount": "10000" }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "valid", "payer": "0xPayer" })),
            )
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let response = client
            .verify(VerifyRequest {
                payment_payload: json!({ "signature": "0xSig" }),
                payment_requirements: requirements("https://r"),
                method: "POST".into(),
            })
            .await
            .unwrap();
        assert!(matches!(response, VerifyResponse::Valid { payer } if payer == "0xPayer"));
    }

    #[tokio::test]
    async fn settle_posts_amount_as_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .and(body_partial_json(json!({ "amount": "420" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "receipt": {
                    "transaction": "0xTx",
                    "network": "eip155:84532",
                    "payer": "0xPayer",
                    "amount": "420"
                }
            })))
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let response = client
            .settle(SettleRequest {
                payment_payload: json!({ "signature": "0xSig" }),
                payment_requirements: requirements("https://r"),
                amount: 420,
            })
            .await
            .unwrap();
        match response {
            SettleResponse::Success { receipt } => {
                assert_eq!(receipt.amount, 420);
                assert_eq!(receipt.transaction, "0xTx");
            }
            SettleResponse::Error { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn non_200_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let err = client
            .verify(VerifyRequest {
                payment_payload: json!({}),
                payment_requirements: requirements("https://r"),
                method: "POST".into(),
            })
            .await
            .unwrap_err();
        match err {
            FacilitatorError::HttpStatus { status, body, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
