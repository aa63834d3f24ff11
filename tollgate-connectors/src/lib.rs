//! Connector catalog and uniform tool surface.
//!
//! A connector is a named capability source ("x", "gmail", "github") with
//! a `list_tools` / `call_tool` interface. HTTP-backed connectors hold
//! hand-written tool descriptors and per-tool handlers; MCP-backed
//! connectors delegate to the session pool. Availability is computed from
//! declared environment variables: a connector is available iff every
//! required variable is set.
//!
//! # Modules
//!
//! - [`descriptor`] - Connector descriptors and availability
//! - [`oauth1`] - OAuth 1.0a request signing
//! - [`service`] - The catalog and dispatch service
//! - [`x`] - The X (Twitter) HTTP connector

pub mod descriptor;
pub mod oauth1;
pub mod service;
pub mod x;

pub use descriptor::ConnectorDescriptor;
pub use service::{ConnectorError, ConnectorService};
