//! HTTP surface of the Tollgate gateway.
//!
//! Thin composition layer: routing, CORS, request logging, error mapping,
//! and the payment bracket around every billable route. All real work
//! happens in the `tollgate-*` subsystem crates.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::app_router;
pub use state::AppState;
