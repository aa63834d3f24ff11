//! The transport abstraction over which JSON-RPC frames flow.
//!
//! Every transport moves through `created → connected → (send/recv)* →
//! closed`; the session layer guarantees every created transport reaches
//! `closed`. Incoming frames are delivered through the channel returned by
//! [`Transport::connect`]; a [`TransportEvent::Closed`] event is the last
//! thing a transport ever delivers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tollgate::facilitator::BoxFuture;

use crate::error::McpError;
use crate::jsonrpc::Message;

pub mod docker;
pub mod sse;
pub mod stdio;

pub use docker::DockerTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// Incoming-frame channel capacity.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The concrete channel kind a session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Local subprocess, newline-delimited JSON over stdio.
    Stdio,
    /// Remote HTTP endpoint with an SSE response channel.
    #[serde(alias = "sse", alias = "remote")]
    Http,
    /// Locally managed container, delegating to SSE once healthy.
    Docker,
}

/// Events a connected transport delivers.
#[derive(Debug)]
pub enum TransportEvent {
    /// A parsed JSON-RPC frame.
    Message(Message),
    /// The transport is gone; no further events follow.
    Closed,
}

/// A bidirectional JSON-RPC channel to one MCP server.
pub trait Transport: Send {
    /// The transport kind, recorded on the session.
    fn transport_type(&self) -> TransportType;

    /// Establishes the channel and returns the incoming event stream.
    fn connect(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<TransportEvent>, McpError>>;

    /// Sends one frame.
    fn send(&self, frame: Value) -> BoxFuture<'_, Result<(), McpError>>;

    /// Tears the channel down. Idempotent.
    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>>;
}
