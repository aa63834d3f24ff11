//! JSON-RPC 2.0 frame types.
//!
//! MCP speaks JSON-RPC 2.0 over every transport. Frames are one JSON
//! object each; the stdio transport delimits them with newlines, the SSE
//! transport carries one frame per event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The protocol version string carried in every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request expecting a correlated response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Correlation id; the response echoes it.
    pub id: u64,
    /// Method name (e.g. `tools/call`).
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Creates a request frame.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A one-way notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Method name (e.g. `notifications/initialized`).
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Creates a notification frame.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }
}

/// An error object inside a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response correlated to a request by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Correlation id of the originating request.
    pub id: u64,
    /// Success payload; absent on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Any frame a server can emit.
#[derive(Debug, Clone)]
pub enum Message {
    /// A response to one of our requests.
    Response(Response),
    /// A server-initiated notification.
    Notification(Notification),
    /// A server-initiated request (unsupported; logged and dropped).
    Request(Request),
}

impl Message {
    /// Parses one frame.
    ///
    /// A frame with an `id` and a `result` or `error` member is a response;
    /// a frame with a `method` and no `id` is a notification; a frame with
    /// both `method` and `id` is a server-initiated request.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let has_id = value.get("id").is_some_and(|id| !id.is_null());
        let has_method = value.get("method").is_some();
        match (has_method, has_id) {
            (true, false) => serde_json::from_value(value).ok().map(Self::Notification),
            (true, true) => serde_json::from_value(value).ok().map(Self::Request),
            (false, true) => serde_json::from_value(value).ok().map(Self::Response),
            (false, false) => None,
        }
    }
}
