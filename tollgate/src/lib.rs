//! Core payment protocol for the Tollgate gateway.
//!
//! Tollgate brackets every billable call with a two-phase payment protocol:
//! the client sends a signed authorization in the `x-payment` header, the
//! gateway verifies it against a facilitator before doing any work, and
//! settles the actual (metered) cost after the work completes. Clients
//! without a valid authorization receive an HTTP 402 challenge describing
//! the accepted payment scheme.
//!
//! # Modules
//!
//! - [`config`] - Environment-driven gateway configuration and credentials
//! - [`error`] - Gateway-wide error kinds and their HTTP status mapping
//! - [`facilitator`] - The [`Facilitator`](facilitator::Facilitator) trait and its remote HTTP client
//! - [`gate`] - The verify/settle payment bracket and 402 challenge builder
//! - [`pricing`] - Per-task price tables and token-metered cost computation
//! - [`proto`] - Wire format types for the payment protocol

pub mod config;
pub mod error;
pub mod facilitator;
pub mod gate;
pub mod pricing;
pub mod proto;

/// The request header carrying the client's signed payment authorization.
pub const PAYMENT_HEADER: &str = "x-payment";

/// The response header mirroring the 402 challenge, base64-encoded.
pub const PAYMENT_REQUIRED_HEADER: &str = "x-payment-required";

/// The response header carrying the settled cost in USDC.
pub const COST_HEADER: &str = "x-cost-usdc";
