//! In-memory scripted transport for session and pool tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tollgate::facilitator::BoxFuture;

use crate::error::McpError;
use crate::jsonrpc::{Message, Request, Response, RpcError};
use crate::transport::{Transport, TransportEvent, TransportType};
use crate::types::Tool;

type CallResponder = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// A transport that answers the MCP handshake and tool calls from a
/// script, without any process or network.
pub(crate) struct ScriptedTransport {
    tools: Vec<Tool>,
    call_responder: CallResponder,
    call_error: Option<(i64, String)>,
    tx: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    pub(crate) sent_frames: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    /// Creates a transport advertising the given tools.
    pub(crate) fn with_default_tools(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            call_responder: Arc::new(|name, _| {
                json!({
                    "content": [{ "type": "text", "text": format!("called {name}") }],
                    "isError": false
                })
            }),
            call_error: None,
            tx: Arc::new(Mutex::new(None)),
            sent_frames: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Overrides the `tools/call` result.
    pub(crate) fn on_call_tool<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        self.call_responder = Arc::new(f);
        self
    }

    /// Makes every `tools/call` answer with a JSON-RPC error.
    pub(crate) fn failing_calls(mut self, code: i64, message: &str) -> Self {
        self.call_error = Some((code, message.to_owned()));
        self
    }

    fn respond(&self, request: &Request) -> Response {
        let mut response = Response {
            jsonrpc: crate::jsonrpc::JSONRPC_VERSION.to_owned(),
            id: request.id,
            result: None,
            error: None,
        };
        match request.method.as_str() {
            "initialize" => {
                response.result = Some(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "scripted", "version": "0.0.0" }
                }));
            }
            "tools/list" => {
                response.result = Some(json!({ "tools": self.tools }));
            }
            "tools/call" => {
                if let Some((code, message)) = &self.call_error {
                    response.error = Some(RpcError {
                        code: *code,
                        message: message.clone(),
                        data: None,
                    });
                } else {
                    let name = request
                        .params
                        .as_ref()
                        .and_then(|p| p.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let args = request
                        .params
                        .as_ref()
                        .and_then(|p| p.get("arguments"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    response.result = Some((self.call_responder)(name, &args));
                }
            }
            other => {
                response.error = Some(RpcError {
                    code: -32601,
                    message: format!("method not found: {other}"),
                    data: None,
                });
            }
        }
        response
    }
}

impl Transport for ScriptedTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn connect(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<TransportEvent>, McpError>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(16);
            *self.tx.lock().await = Some(tx);
            Ok(rx)
        })
    }

    fn send(&self, frame: Value) -> BoxFuture<'_, Result<(), McpError>> {
        self.sent_frames.fetch_add(1, Ordering::SeqCst);
        let response = serde_json::from_value::<Request>(frame)
            .ok()
            .map(|request| self.respond(&request));
        let tx = Arc::clone(&self.tx);
        Box::pin(async move {
            // Notifications parse as requests without ids and are dropped
            // by the from_value above when the id is missing.
            if let Some(response) = response {
                let guard = tx.lock().await;
                let tx = guard.as_ref().ok_or(McpError::SessionClosed)?;
                tx.send(TransportEvent::Message(Message::Response(response)))
                    .await
                    .map_err(|_| McpError::SessionClosed)?;
            }
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>> {
        let tx = Arc::clone(&self.tx);
        Box::pin(async move {
            if let Some(tx) = tx.lock().await.take() {
                let _ = tx.send(TransportEvent::Closed).await;
            }
            Ok(())
        })
    }
}
