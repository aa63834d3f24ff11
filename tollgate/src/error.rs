//! Gateway-wide error kinds and their HTTP status mapping.
//!
//! Payment denials (402/503 from the gate) are not errors; they travel as
//! [`GateDenial`](crate::gate::GateDenial). Everything else a handler can
//! fail with is a [`GatewayError`] variant with a fixed status code.

use http::StatusCode;

/// Errors surfaced to gateway clients.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The request body or parameters violate the expected shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The named connector, model, or session does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A required credential is missing or an upstream dependency is down.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A backend returned a non-2xx response after the chain was exhausted.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// An MCP connect/call or streaming read timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Unexpected internal state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The HTTP status code this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Machine-readable error kind for response bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Upstream(_) => "upstream_error",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kinds() {
        assert_eq!(
            GatewayError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Unavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Timeout("x".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::Upstream("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
