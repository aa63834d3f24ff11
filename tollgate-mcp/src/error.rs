//! Error types for the MCP runtime.

use crate::jsonrpc::RpcError;

/// Errors that can occur while spawning servers or executing tools.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum McpError {
    /// The transport could not be established.
    #[error("transport connect failed: {0}")]
    Connect(String),

    /// The transport failed mid-session.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a JSON-RPC error.
    #[error("server error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),

    /// A connect or tool call exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The session was closed while a call was in flight.
    #[error("session closed")]
    SessionClosed,

    /// The spawn-config service rejected or failed the lookup.
    #[error("spawn config for '{server_id}' unavailable: {detail}")]
    SpawnConfig {
        /// The server the config was requested for.
        server_id: String,
        /// What went wrong.
        detail: String,
    },

    /// The pool is at its session cap.
    #[error("session pool is full ({0} sessions)")]
    PoolFull(usize),

    /// A response arrived that does not match the expected shape.
    #[error("malformed server response: {0}")]
    Malformed(String),

    /// Container lifecycle command failed.
    #[error("docker {operation} failed: {detail}")]
    Docker {
        /// The docker CLI operation that failed.
        operation: &'static str,
        /// Captured stderr or error description.
        detail: String,
    },
}
