//! A connected MCP session: handshake, request correlation, tool calls.
//!
//! A session owns its transport. Requests are correlated to responses by
//! JSON-RPC id through a pending-call map of oneshot senders; a background
//! task drains the transport's event stream and completes them. The
//! advertised tool list is fetched once during connect and is immutable
//! afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc, oneshot};
use uuid::Uuid;

use crate::error::McpError;
use crate::jsonrpc::{Message, Notification, Request, Response};
use crate::transport::{Transport, TransportEvent, TransportType};
use crate::types::{CallToolResult, Tool};

/// Hard deadline for transport establishment and the initial handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard deadline for one tool call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// MCP protocol revision sent during initialization.
const PROTOCOL_VERSION: &str = "2024-11-05";

type PendingMap = Arc<DashMap<u64, oneshot::Sender<Response>>>;

/// A live session to one MCP server.
pub struct McpSession {
    session_id: Uuid,
    server_id: String,
    transport_type: TransportType,
    tools: Vec<Tool>,
    transport: Mutex<Box<dyn Transport>>,
    pending: PendingMap,
    next_id: AtomicU64,
    /// Shared with the dispatcher task, which sets it when the transport
    /// delivers its final event.
    closed: Arc<AtomicBool>,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last use; last-writer-wins.
    last_used_offset_ms: AtomicU64,
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("session_id", &self.session_id)
            .field("server_id", &self.server_id)
            .field("transport_type", &self.transport_type)
            .field("tools", &self.tools.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl McpSession {
    /// Connects the transport, performs the MCP handshake, and fetches the
    /// server's tool list.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Timeout`] when establishment exceeds
    /// [`CONNECT_TIMEOUT`], or the underlying transport/protocol error.
    pub async fn connect(
        server_id: impl Into<String>,
        mut transport: Box<dyn Transport>,
    ) -> Result<Arc<Self>, McpError> {
        let server_id = server_id.into();
        let transport_type = transport.transport_type();

        let events = match tokio::time::timeout(CONNECT_TIMEOUT, transport.connect()).await {
            Ok(result) => result?,
            Err(_) => {
                let _ = transport.close().await;
                return Err(McpError::Timeout(CONNECT_TIMEOUT));
            }
        };

        let pending: PendingMap = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        spawn_dispatcher(events, Arc::clone(&pending), Arc::clone(&closed), server_id.clone());

        let transport = Mutex::new(transport);
        let next_id = AtomicU64::new(1);

        let handshake = async {
            raw_request(
                &transport,
                &pending,
                &next_id,
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "clientInfo": {
                        "name": "tollgate",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
                CONNECT_TIMEOUT,
            )
            .await?;

            let initialized = Notification::new("notifications/initialized", None);
            transport
                .lock()
                .await
                .send(serde_json::to_value(initialized).map_err(|e| {
                    McpError::Transport(format!("notification serialization: {e}"))
                })?)
                .await?;

            let tools_result = raw_request(
                &transport,
                &pending,
                &next_id,
                "tools/list",
                None,
                CONNECT_TIMEOUT,
            )
            .await?;
            parse_tools(&tools_result)
        };

        let tools = match handshake.await {
            Ok(tools) => tools,
            Err(e) => {
                closed.store(true, Ordering::SeqCst);
                let _ = transport.lock().await.close().await;
                return Err(e);
            }
        };

        let session = Arc::new(Self {
            session_id: Uuid::new_v4(),
            server_id,
            transport_type,
            tools,
            transport,
            pending,
            next_id,
            closed,
            created_at: Instant::now(),
            last_used_offset_ms: AtomicU64::new(0),
        });
        tracing::info!(
            session_id = %session.session_id,
            server_id = %session.server_id,
            transport = ?session.transport_type,
            tools = session.tools.len(),
            "mcp session established"
        );
        Ok(session)
    }

    /// The session's unique id.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The server this session belongs to.
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// The transport kind this session runs over.
    #[must_use]
    pub const fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    /// The tool list advertised at connect time.
    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Time since the session was established.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the session last served a call.
    #[must_use]
    pub fn idle(&self) -> Duration {
        let elapsed_ms = u64::try_from(self.created_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        let last = self.last_used_offset_ms.load(Ordering::Relaxed);
        Duration::from_millis(elapsed_ms.saturating_sub(last))
    }

    /// Marks the session as just used.
    pub fn touch(&self) {
        let elapsed_ms = u64::try_from(self.created_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_used_offset_ms.store(elapsed_ms, Ordering::Relaxed);
    }

    /// Performs a live `tools/list`, verifying the session still answers.
    ///
    /// # Errors
    ///
    /// Returns the transport or protocol error when the session is stale.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let result = self.request("tools/list", None, CALL_TIMEOUT).await?;
        self.touch();
        parse_tools(&result)
    }

    /// Invokes one tool and normalizes its result.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Timeout`] after [`CALL_TIMEOUT`], or the
    /// transport/protocol error. A tool-level failure is a success carrying
    /// `is_error = true`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError> {
        self.call_tool_with_meta(name, arguments, None).await
    }

    /// Invokes one tool with an optional `_meta` object (protocol
    /// extensions such as forwarded payment payloads).
    ///
    /// # Errors
    ///
    /// Same conditions as [`McpSession::call_tool`].
    pub async fn call_tool_with_meta(
        &self,
        name: &str,
        arguments: Value,
        meta: Option<Value>,
    ) -> Result<CallToolResult, McpError> {
        let mut params = json!({ "name": name, "arguments": arguments });
        if let Some(meta) = meta {
            params["_meta"] = meta;
        }
        let result = self.request("tools/call", Some(params), CALL_TIMEOUT).await?;
        self.touch();
        Ok(CallToolResult::from_raw(result))
    }

    /// Sends one request and awaits its correlated response.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::SessionClosed);
        }
        raw_request(
            &self.transport,
            &self.pending,
            &self.next_id,
            method,
            params,
            timeout,
        )
        .await
    }

    /// Closes the transport and fails every in-flight call. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.transport.lock().await.close().await;
        // Dropping the senders wakes awaiting callers with SessionClosed.
        self.pending.clear();
        tracing::debug!(session_id = %self.session_id, server_id = %self.server_id, "mcp session closed");
    }
}

/// Drains transport events, completing pending calls by id.
fn spawn_dispatcher(
    mut events: mpsc::Receiver<TransportEvent>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    server_id: String,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Message(Message::Response(response)) => {
                    if let Some((_, tx)) = pending.remove(&response.id) {
                        let _ = tx.send(response);
                    } else {
                        tracing::debug!(server_id = %server_id, id = response.id, "uncorrelated response");
                    }
                }
                TransportEvent::Message(Message::Notification(n)) => {
                    tracing::debug!(server_id = %server_id, method = %n.method, "server notification");
                }
                TransportEvent::Message(Message::Request(r)) => {
                    tracing::warn!(server_id = %server_id, method = %r.method, "server-initiated request dropped");
                }
                TransportEvent::Closed => break,
            }
        }
        closed.store(true, Ordering::SeqCst);
        pending.clear();
    });
}

/// Sends one request frame over the transport and awaits the response.
async fn raw_request(
    transport: &Mutex<Box<dyn Transport>>,
    pending: &PendingMap,
    next_id: &AtomicU64,
    method: &str,
    params: Option<Value>,
    timeout: Duration,
) -> Result<Value, McpError> {
    let id = next_id.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = oneshot::channel();
    pending.insert(id, tx);

    let frame = serde_json::to_value(Request::new(id, method, params))
        .map_err(|e| McpError::Transport(format!("frame serialization: {e}")))?;
    if let Err(e) = transport.lock().await.send(frame).await {
        pending.remove(&id);
        return Err(e);
    }

    let response = match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(response)) => response,
        Ok(Err(_)) => return Err(McpError::SessionClosed),
        Err(_) => {
            pending.remove(&id);
            return Err(McpError::Timeout(timeout));
        }
    };

    if let Some(error) = response.error {
        return Err(McpError::Rpc(error));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Parses a `tools/list` result into tool schemas.
fn parse_tools(result: &Value) -> Result<Vec<Tool>, McpError> {
    let tools = result
        .get("tools")
        .ok_or_else(|| McpError::Malformed("tools/list result missing 'tools'".into()))?;
    serde_json::from_value(tools.clone())
        .map_err(|e| McpError::Malformed(format!("tools/list entries: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedTransport;

    #[tokio::test]
    async fn connect_performs_handshake_and_lists_tools() {
        let transport = ScriptedTransport::with_default_tools(vec![Tool {
            name: "search".into(),
            description: "Search".into(),
            input_schema: json!({ "type": "object" }),
        }]);
        let session = McpSession::connect("srv-a", Box::new(transport))
            .await
            .unwrap();
        assert_eq!(session.server_id(), "srv-a");
        assert_eq!(session.tools().len(), 1);
        assert_eq!(session.tools()[0].name, "search");
        session.close().await;
    }

    #[tokio::test]
    async fn call_tool_normalizes_result() {
        let transport = ScriptedTransport::with_default_tools(Vec::new()).on_call_tool(|_name, _args| {
            json!({
                "content": [{ "type": "text", "text": "42" }],
                "isError": false
            })
        });
        let session = McpSession::connect("srv-a", Box::new(transport))
            .await
            .unwrap();
        let result = session
            .call_tool("answer", json!({ "q": "life" }))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content[0].as_text(), Some("42"));
        session.close().await;
    }

    #[tokio::test]
    async fn rpc_error_surfaces_as_mcp_error() {
        let transport = ScriptedTransport::with_default_tools(Vec::new()).failing_calls(-32601, "no such tool");
        let session = McpSession::connect("srv-a", Box::new(transport))
            .await
            .unwrap();
        let err = session.call_tool("missing", json!({})).await.unwrap_err();
        match err {
            McpError::Rpc(e) => assert_eq!(e.code, -32601),
            other => panic!("unexpected error: {other}"),
        }
        session.close().await;
    }

    #[tokio::test]
    async fn calls_after_close_fail_fast() {
        let transport = ScriptedTransport::with_default_tools(Vec::new());
        let session = McpSession::connect("srv-a", Box::new(transport))
            .await
            .unwrap();
        session.close().await;
        assert!(matches!(
            session.call_tool("x", json!({})).await.unwrap_err(),
            McpError::SessionClosed
        ));
    }

    #[tokio::test]
    async fn touch_resets_idle_clock() {
        let transport = ScriptedTransport::with_default_tools(Vec::new());
        let session = McpSession::connect("srv-a", Box::new(transport))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(session.idle() >= Duration::from_millis(25));
        session.touch();
        assert!(session.idle() < Duration::from_millis(25));
        session.close().await;
    }
}
