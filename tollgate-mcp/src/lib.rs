//! On-demand MCP (Model Context Protocol) server runtime.
//!
//! The runtime stands up MCP servers on first use, keeps their sessions
//! alive in a pool, and executes tool calls over JSON-RPC 2.0. Three
//! transports are supported: a local subprocess speaking newline-delimited
//! JSON over stdio, a remote HTTP endpoint with an SSE response channel,
//! and a locally managed container that delegates to the SSE transport
//! once healthy.
//!
//! # Modules
//!
//! - [`jsonrpc`] - JSON-RPC 2.0 frame types and parsing
//! - [`pool`] - Session pool with single-flight spawn and idle eviction
//! - [`session`] - A connected session: request correlation and tool calls
//! - [`spawn`] - Spawn-config client for the connector service
//! - [`transport`] - The transport abstraction and its three implementations
//! - [`types`] - Tool schemas and normalized tool results

pub mod error;
pub mod jsonrpc;
#[cfg(test)]
mod testutil;
pub mod pool;
pub mod session;
pub mod spawn;
pub mod transport;
pub mod types;

pub use error::McpError;
pub use pool::SessionPool;
pub use session::McpSession;
