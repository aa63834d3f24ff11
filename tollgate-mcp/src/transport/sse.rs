//! Remote HTTP transport with an SSE response channel.
//!
//! Requests are POSTed to `{base}/mcp`; responses arrive on a long-lived
//! SSE stream at `{base}/sse` and are correlated by JSON-RPC id in the
//! session layer. A dropped stream reconnects up to
//! [`SseTransport::DEFAULT_MAX_RECONNECTS`] times with linear backoff
//! (attempt x interval).

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tollgate::facilitator::BoxFuture;

use super::{EVENT_CHANNEL_CAPACITY, Transport, TransportEvent, TransportType};
use crate::error::McpError;
use crate::jsonrpc::Message;

/// Remote MCP transport over HTTP + SSE.
#[derive(Debug)]
pub struct SseTransport {
    base_url: String,
    client: reqwest::Client,
    reconnect_interval: Duration,
    max_reconnects: u32,
    cancel: CancellationToken,
}

impl SseTransport {
    /// Default linear backoff unit between reconnect attempts.
    pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

    /// Default number of reconnect attempts before giving up.
    pub const DEFAULT_MAX_RECONNECTS: u32 = 5;

    /// Creates a transport for a remote server base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
            reconnect_interval: Self::DEFAULT_RECONNECT_INTERVAL,
            max_reconnects: Self::DEFAULT_MAX_RECONNECTS,
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the reconnect backoff unit (tests).
    #[must_use]
    pub const fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    async fn open_stream(&self) -> Result<reqwest::Response, McpError> {
        let url = format!("{}/sse", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::Connect(format!("GET {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(McpError::Connect(format!(
                "GET {url}: status {}",
                response.status()
            )));
        }
        Ok(response)
    }

    async fn connect_inner(&mut self) -> Result<mpsc::Receiver<TransportEvent>, McpError> {
        let initial = self.open_stream().await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let interval = self.reconnect_interval;
        let max_reconnects = self.max_reconnects;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut stream = Some(initial);
            let mut attempt: u32 = 0;
            loop {
                if let Some(response) = stream.take() {
                    pump_stream(response, &tx, &cancel).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                }

                attempt += 1;
                if attempt > max_reconnects {
                    tracing::warn!(base_url = %base_url, attempts = max_reconnects, "sse stream lost; giving up");
                    break;
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval * attempt) => {}
                }

                let url = format!("{base_url}/sse");
                match client
                    .get(&url)
                    .header("accept", "text/event-stream")
                    .send()
                    .await
                {
                    Ok(response) if response.status().is_success() => {
                        tracing::debug!(base_url = %base_url, attempt, "sse stream reconnected");
                        attempt = 0;
                        stream = Some(response);
                    }
                    Ok(response) => {
                        tracing::warn!(base_url = %base_url, attempt, status = %response.status(), "sse reconnect rejected");
                    }
                    Err(e) => {
                        tracing::warn!(base_url = %base_url, attempt, error = %e, "sse reconnect failed");
                    }
                }
            }
            let _ = tx.send(TransportEvent::Closed).await;
        });

        Ok(rx)
    }
}

/// Reads one SSE response stream to exhaustion, forwarding parsed frames.
async fn pump_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<TransportEvent>,
    cancel: &CancellationToken,
) {
    let mut bytes = response.bytes_stream();
    let mut buffer = String::new();
    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => return,
            chunk = bytes.next() => chunk,
        };
        match chunk {
            Some(Ok(chunk)) => {
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                for data in drain_events(&mut buffer) {
                    if let Some(message) = Message::parse(&data) {
                        if tx.send(TransportEvent::Message(message)).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "sse stream read error");
                return;
            }
            None => return,
        }
    }
}

/// Extracts complete SSE events from the buffer, returning their joined
/// `data:` payloads. Incomplete events stay buffered.
fn drain_events(buffer: &mut String) -> Vec<String> {
    let normalized = buffer.replace("\r\n", "\n");
    *buffer = normalized;

    let mut events = Vec::new();
    while let Some(boundary) = buffer.find("\n\n") {
        let event: String = buffer[..boundary].to_owned();
        buffer.drain(..boundary + 2);

        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if !data.is_empty() {
            events.push(data.join("\n"));
        }
    }
    events
}

impl Transport for SseTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn connect(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<TransportEvent>, McpError>> {
        Box::pin(self.connect_inner())
    }

    fn send(&self, frame: Value) -> BoxFuture<'_, Result<(), McpError>> {
        let url = format!("{}/mcp", self.base_url);
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .post(&url)
                .json(&frame)
                .send()
                .await
                .map_err(|e| McpError::Transport(format!("POST {url}: {e}")))?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(McpError::Transport(format!(
                    "POST {url}: status {}",
                    response.status()
                )))
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>> {
        self.cancel.cancel();
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn drain_events_joins_data_lines_and_keeps_partials() {
        let mut buffer = String::from(
            "event: message\ndata: {\"a\":1}\n\ndata: part1\ndata: part2\n\ndata: incomplete",
        );
        let events = drain_events(&mut buffer);
        assert_eq!(events, vec!["{\"a\":1}".to_owned(), "part1\npart2".to_owned()]);
        assert_eq!(buffer, "data: incomplete");

        buffer.push_str("\n\n");
        let events = drain_events(&mut buffer);
        assert_eq!(events, vec!["incomplete".to_owned()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn drain_events_normalizes_crlf() {
        let mut buffer = String::from("data: {\"b\":2}\r\n\r\n");
        let events = drain_events(&mut buffer);
        assert_eq!(events, vec!["{\"b\":2}".to_owned()]);
    }

    #[tokio::test]
    async fn frames_on_the_sse_stream_are_delivered() {
        let server = MockServer::start().await;
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n";
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let mut transport = SseTransport::new(server.uri(), reqwest::Client::new())
            .with_reconnect_interval(Duration::from_millis(1));
        let mut events = transport.connect().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            TransportEvent::Message(Message::Response(r)) => {
                assert_eq!(r.id, 1);
                assert!(r.result.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn requests_post_to_the_mcp_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(": keepalive\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mut transport = SseTransport::new(server.uri(), reqwest::Client::new());
        let _events = transport.connect().await.unwrap();
        transport
            .send(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
            .await
            .unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn refused_stream_fails_connect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut transport = SseTransport::new(server.uri(), reqwest::Client::new());
        assert!(matches!(
            transport.connect().await.unwrap_err(),
            McpError::Connect(_)
        ));
    }
}
