//! Local subprocess transport: newline-delimited JSON over stdio.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tollgate::facilitator::BoxFuture;

use super::{EVENT_CHANNEL_CAPACITY, Transport, TransportEvent, TransportType};
use crate::error::McpError;
use crate::jsonrpc::Message;

/// Spawns an MCP server as a child process and frames JSON-RPC messages
/// one per line over its stdin/stdout.
///
/// The child's environment is cleared and rebuilt from the spawn config's
/// variables; only `PATH` survives from the parent so the binary resolves.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    child: Option<Child>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("running", &self.child.is_some())
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Creates a transport for the given argv and environment.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>, env: HashMap<String, String>) -> Self {
        Self {
            command: command.into(),
            args,
            env,
            child: None,
            stdin: Arc::new(Mutex::new(None)),
        }
    }

    async fn connect_inner(&mut self) -> Result<mpsc::Receiver<TransportEvent>, McpError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Connect(format!("spawn {}: {e}", self.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Connect("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Connect("child stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            let command = self.command.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(command = %command, line = %line, "mcp server stderr");
                }
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match Message::parse(trimmed) {
                            Some(message) => {
                                if tx.send(TransportEvent::Message(message)).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                tracing::warn!(line = %trimmed, "unparseable frame from mcp server");
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            let _ = tx.send(TransportEvent::Closed).await;
        });

        *self.stdin.lock().await = Some(stdin);
        self.child = Some(child);
        Ok(rx)
    }
}

impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn connect(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<TransportEvent>, McpError>> {
        Box::pin(self.connect_inner())
    }

    fn send(&self, frame: Value) -> BoxFuture<'_, Result<(), McpError>> {
        let stdin = Arc::clone(&self.stdin);
        Box::pin(async move {
            let mut line = serde_json::to_string(&frame)
                .map_err(|e| McpError::Transport(format!("frame serialization: {e}")))?;
            line.push('\n');

            let mut guard = stdin.lock().await;
            let stdin = guard.as_mut().ok_or(McpError::SessionClosed)?;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| McpError::Transport(format!("stdin write: {e}")))?;
            stdin
                .flush()
                .await
                .map_err(|e| McpError::Transport(format!("stdin flush: {e}")))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>> {
        let stdin = Arc::clone(&self.stdin);
        let child = self.child.take();
        Box::pin(async move {
            // Dropping stdin signals EOF; well-behaved servers exit on it.
            stdin.lock().await.take();
            if let Some(mut child) = child {
                let _ = child.kill().await;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::Request;

    /// Round-trips a frame through `cat`, which echoes stdin to stdout
    /// unchanged and so acts as a minimal line-oriented server.
    #[tokio::test]
    async fn echo_subprocess_round_trips_frames() {
        let mut transport = StdioTransport::new("cat", Vec::new(), HashMap::new());
        let mut events = transport.connect().await.unwrap();

        let frame = serde_json::to_value(Request::new(1, "tools/list", None)).unwrap();
        transport.send(frame).await.unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            TransportEvent::Message(Message::Request(r)) => {
                assert_eq!(r.method, "tools/list");
                assert_eq!(r.id, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        transport.close().await.unwrap();
        // After close the reader observes EOF and delivers Closed.
        loop {
            match events.recv().await {
                Some(TransportEvent::Closed) | None => break,
                Some(TransportEvent::Message(_)) => {}
            }
        }
    }

    #[tokio::test]
    async fn missing_binary_fails_to_connect() {
        let mut transport =
            StdioTransport::new("definitely-not-a-real-binary", Vec::new(), HashMap::new());
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, McpError::Connect(_)));
    }

    #[tokio::test]
    async fn send_before_connect_reports_closed() {
        let transport = StdioTransport::new("cat", Vec::new(), HashMap::new());
        let err = transport
            .send(serde_json::json!({ "jsonrpc": "2.0" }))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::SessionClosed));
    }
}
