//! Task-typed multimodal inference router.
//!
//! Given a billable inference request, the router detects the task from
//! the request, the registry, and model-id heuristics, dispatches to the
//! per-task handler, and returns either a streamed text response or a
//! single-shot binary/JSON result together with the usage the gateway
//! bills for. Image tasks walk an ordered provider fallback chain.
//!
//! # Modules
//!
//! - [`fallback`] - Provider chains and upstream error classification
//! - [`handlers`] - Per-task handlers
//! - [`providers`] - Upstream provider HTTP plumbing
//! - [`router`] - Task detection and dispatch

pub mod fallback;
pub mod handlers;
pub mod providers;
pub mod router;

pub use router::{InferenceOutcome, InferenceRouter, detect_task};
