//! Streaming text generation.
//!
//! Upstream SSE chunks are forwarded to the client byte for byte; the pump
//! watches the same bytes for the provider's `usage` object and hands it
//! to the finish hook after the last byte. A client disconnect ends the
//! pump early; the hook still runs with whatever usage was seen, so
//! settlement covers the tokens actually produced.

use std::convert::Infallible;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde_json::Value;
use tokio::sync::mpsc;
use tollgate::error::GatewayError;
use tollgate::facilitator::BoxFuture;
use tollgate::pricing::TokenUsage;
use tollgate_registry::Source;

use crate::providers::Providers;

/// Settlement hook invoked exactly once, after the stream ends.
pub type FinishHook = Box<dyn FnOnce(TokenUsage) -> BoxFuture<'static, ()> + Send>;

/// A live text stream for the client.
pub struct ChatStream {
    /// SSE bytes, in upstream order.
    pub stream: BoxStream<'static, Result<Vec<u8>, Infallible>>,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream").finish_non_exhaustive()
    }
}

/// Opens a streaming chat completion and returns the client-facing stream.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidInput`] without a `messages` array, and
/// the provider error when the upstream connection fails.
pub async fn stream_chat(
    providers: &Providers,
    source: Source,
    model_id: &str,
    body: &Value,
    on_finish: FinishHook,
) -> Result<ChatStream, GatewayError> {
    if !body.get("messages").is_some_and(Value::is_array) {
        return Err(GatewayError::InvalidInput(
            "'messages' array is required".into(),
        ));
    }

    let upstream_body = Providers::chat_body(model_id, body);
    let upstream = providers.open_chat_stream(source, &upstream_body).await?;

    let (tx, rx) = mpsc::channel::<Vec<u8>>(32);
    let model = model_id.to_owned();
    tokio::spawn(async move {
        let mut bytes = upstream.bytes_stream();
        let mut scanner = UsageScanner::default();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    scanner.feed(&chunk);
                    if tx.send(chunk.to_vec()).await.is_err() {
                        tracing::debug!(model = %model, "client disconnected mid-stream");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "upstream stream error");
                    break;
                }
            }
        }
        let usage = scanner.usage();
        tracing::debug!(
            model = %model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "chat stream finished"
        );
        on_finish(usage).await;
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok(chunk), rx))
    })
    .boxed();

    Ok(ChatStream { stream })
}

/// Incremental scanner for the `usage` object in an OpenAI-shaped SSE
/// stream. The last usage seen wins (providers send it on the final
/// chunk).
#[derive(Debug, Default)]
struct UsageScanner {
    buffer: String,
    usage: Option<TokenUsage>,
}

impl UsageScanner {
    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let normalized = self.buffer.replace("\r\n", "\n");
        self.buffer = normalized;

        while let Some(boundary) = self.buffer.find("\n\n") {
            let event: String = self.buffer[..boundary].to_owned();
            self.buffer.drain(..boundary + 2);
            for data in event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim_start)
            {
                if data == "[DONE]" {
                    continue;
                }
                if let Ok(value) = serde_json::from_str::<Value>(data) {
                    if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
                        self.usage = Some(TokenUsage::from_provider_json(usage));
                    }
                }
            }
        }
    }

    fn usage(&self) -> TokenUsage {
        self.usage.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tollgate::config::ProviderKeys;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body() -> String {
        [
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "",
            r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":7,"total_tokens":10}}"#,
            "",
            "data: [DONE]",
            "",
            "",
        ]
        .join("\n")
    }

    #[test]
    fn scanner_finds_last_usage() {
        let mut scanner = UsageScanner::default();
        scanner.feed(sse_body().as_bytes());
        let usage = scanner.usage();
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 7);
        assert_eq!(usage.total_tokens, 10);
    }

    #[test]
    fn scanner_handles_split_chunks() {
        let body = sse_body();
        let (a, b) = body.split_at(body.len() / 2);
        let mut scanner = UsageScanner::default();
        scanner.feed(a.as_bytes());
        scanner.feed(b.as_bytes());
        assert_eq!(scanner.usage().total_tokens, 10);
    }

    #[tokio::test]
    async fn stream_passes_bytes_through_and_settles_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_raw(sse_body(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let providers = Providers::new(
            reqwest::Client::new(),
            ProviderKeys {
                asi_one: Some("key".into()),
                ..ProviderKeys::default()
            },
        )
        .with_endpoints(crate::providers::ProviderEndpoints {
            asi_one: server.uri(),
            ..crate::providers::ProviderEndpoints::default()
        });

        let settled = Arc::new(AtomicU64::new(0));
        let settled_in_hook = Arc::clone(&settled);
        let on_finish: FinishHook = Box::new(move |usage| {
            Box::pin(async move {
                settled_in_hook.store(usage.total_tokens, Ordering::SeqCst);
            })
        });

        let chat = stream_chat(
            &providers,
            Source::AsiOne,
            "asi1-mini",
            &json!({ "messages": [{ "role": "user", "content": "hi" }] }),
            on_finish,
        )
        .await
        .unwrap();

        let collected: Vec<u8> = chat
            .stream
            .map(|chunk| chunk.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(collected, sse_body().as_bytes());

        // The hook runs after the last byte.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(settled.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn missing_messages_is_invalid_input() {
        let providers = Providers::new(reqwest::Client::new(), ProviderKeys::default());
        let on_finish: FinishHook = Box::new(|_| Box::pin(async {}));
        let err = stream_chat(
            &providers,
            Source::AsiOne,
            "asi1-mini",
            &json!({ "prompt": "hi" }),
            on_finish,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }
}
