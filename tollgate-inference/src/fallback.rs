//! Provider fallback chains and upstream error classification.
//!
//! Each multimodal task has an ordered provider list. Upstream errors are
//! classified into three buckets: `Skip` rotates to the next provider,
//! `StopLoading` short-circuits without rotating (the provider will be hot
//! for the next request), and `Fatal` aborts the chain.

use http::StatusCode;

/// Text-to-image provider order on HuggingFace routing.
pub const TEXT_TO_IMAGE_CHAIN: &[&str] = &["hf-inference", "wavespeed", "replicate", "novita"];

/// Image-to-image provider order.
pub const IMAGE_TO_IMAGE_CHAIN: &[&str] = &["wavespeed", "hf-inference", "replicate", "novita"];

/// One provider's failure, as observed by a handler.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    /// The provider that failed.
    pub provider: String,
    /// The HTTP status, when the provider answered at all.
    pub status: Option<StatusCode>,
    /// The provider's error text.
    pub message: String,
}

/// What a failure means for the rest of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Provider cannot serve this model; try the next one.
    Skip,
    /// Model is cold-loading; stop the chain and tell the client to retry.
    StopLoading,
    /// Unrecoverable; abort the chain.
    Fatal,
}

/// Classifies one provider failure.
///
/// Substring rules come before status rules so a 503 carrying a
/// "not supported" body still rotates.
#[must_use]
pub fn classify(failure: &ProviderFailure) -> FailureClass {
    let message = failure.message.to_ascii_lowercase();
    if message.contains("pro required")
        || message.contains("not supported")
        || message.contains("not available")
    {
        return FailureClass::Skip;
    }
    if message.contains("loading") || failure.status == Some(StatusCode::SERVICE_UNAVAILABLE) {
        return FailureClass::StopLoading;
    }
    if failure.status == Some(StatusCode::NOT_FOUND) {
        return FailureClass::Skip;
    }
    FailureClass::Fatal
}

/// The terminal state of a fallback chain.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// A provider reported the model cold-loading.
    #[error("model is loading on {provider}; try again in 20-30 seconds")]
    Loading {
        /// The provider that reported loading.
        provider: String,
    },
    /// Every provider was tried and none served the request.
    #[error("all providers failed for '{model_id}': {last_error}")]
    Exhausted {
        /// The model the chain ran for.
        model_id: String,
        /// Providers tried, in order.
        tried: Vec<String>,
        /// The final provider's error text.
        last_error: String,
    },
    /// A provider failed unrecoverably.
    #[error("{provider}: {message}")]
    Fatal {
        /// The provider that failed.
        provider: String,
        /// Its error text.
        message: String,
    },
}

/// Walks a provider chain, feeding each failure through the classifier.
///
/// `attempt` is called once per provider until one succeeds or the chain
/// terminates per [`classify`].
///
/// # Errors
///
/// Returns the [`ChainError`] terminal state.
pub async fn run_chain<T, F, Fut>(
    chain: &[&str],
    model_id: &str,
    mut attempt: F,
) -> Result<(String, T), ChainError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ProviderFailure>>,
{
    let mut tried = Vec::new();
    let mut last_error = String::from("no providers configured");

    for provider in chain {
        let provider = (*provider).to_owned();
        tried.push(provider.clone());
        match attempt(provider.clone()).await {
            Ok(value) => return Ok((provider, value)),
            Err(failure) => {
                let class = classify(&failure);
                tracing::debug!(
                    provider = %failure.provider,
                    status = ?failure.status,
                    class = ?class,
                    message = %failure.message,
                    model_id,
                    "provider attempt failed"
                );
                match class {
                    FailureClass::Skip => {
                        last_error = failure.message;
                    }
                    FailureClass::StopLoading => {
                        return Err(ChainError::Loading { provider });
                    }
                    FailureClass::Fatal => {
                        return Err(ChainError::Fatal {
                            provider,
                            message: failure.message,
                        });
                    }
                }
            }
        }
    }

    Err(ChainError::Exhausted {
        model_id: model_id.to_owned(),
        tried,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn failure(status: Option<u16>, message: &str) -> ProviderFailure {
        ProviderFailure {
            provider: "p".into(),
            status: status.map(|s| StatusCode::from_u16(s).unwrap()),
            message: message.into(),
        }
    }

    #[test]
    fn classification_rules() {
        assert_eq!(classify(&failure(Some(403), "PRO required")), FailureClass::Skip);
        assert_eq!(
            classify(&failure(Some(400), "task not supported for provider")),
            FailureClass::Skip
        );
        assert_eq!(
            classify(&failure(None, "model not available")),
            FailureClass::Skip
        );
        assert_eq!(classify(&failure(Some(404), "gone")), FailureClass::Skip);
        assert_eq!(
            classify(&failure(Some(503), "whatever")),
            FailureClass::StopLoading
        );
        assert_eq!(
            classify(&failure(Some(200), "Model is currently loading")),
            FailureClass::StopLoading
        );
        assert_eq!(classify(&failure(Some(500), "boom")), FailureClass::Fatal);
    }

    #[tokio::test]
    async fn chain_rotates_on_skip_and_stops_on_success() {
        let calls = Mutex::new(Vec::new());
        let result = run_chain(&["p1", "p2", "p3", "p4"], "m", |provider| {
            calls.lock().unwrap().push(provider.clone());
            async move {
                match provider.as_str() {
                    "p1" => Err(ProviderFailure {
                        provider,
                        status: None,
                        message: "PRO required".into(),
                    }),
                    "p2" => Err(ProviderFailure {
                        provider,
                        status: None,
                        message: "not available".into(),
                    }),
                    _ => Ok(42),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, ("p3".to_owned(), 42));
        assert_eq!(*calls.lock().unwrap(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn loading_short_circuits_without_rotating() {
        let calls = Mutex::new(0_u32);
        let err = run_chain(&["p1", "p2"], "m", |provider| {
            *calls.lock().unwrap() += 1;
            async move {
                Err::<(), _>(ProviderFailure {
                    provider,
                    status: Some(StatusCode::SERVICE_UNAVAILABLE),
                    message: "loading".into(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ChainError::Loading { provider } if provider == "p1"));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(err.to_string().contains("20-30 seconds"));
    }

    #[tokio::test]
    async fn exhausted_chain_names_the_model() {
        let err = run_chain(&["p1", "p2"], "some/model", |provider| async move {
            Err::<(), _>(ProviderFailure {
                provider,
                status: Some(StatusCode::NOT_FOUND),
                message: "404 page not found".into(),
            })
        })
        .await
        .unwrap_err();

        match &err {
            ChainError::Exhausted { model_id, tried, .. } => {
                assert_eq!(model_id, "some/model");
                assert_eq!(tried, &["p1", "p2"]);
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(err.to_string().contains("some/model"));
    }
}
