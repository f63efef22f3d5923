//! Gateway error types and their HTTP mapping

use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced to the client of the forwarding path
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Forwarding to '{0}' is not allowed")]
    ForbiddenTarget(String),

    #[error("Method {0} is not supported")]
    MethodNotAllowed(Method),
}

impl GatewayError {
    pub fn malformed(message: impl Into<String>) -> Self {
        GatewayError::MalformedRequest(message.into())
    }

    /// Status code sent back to the client
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ForbiddenTarget(_) => StatusCode::FORBIDDEN,
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::UpstreamTimeout
        } else {
            GatewayError::Upstream(e.to_string())
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::Upstream("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(GatewayError::UpstreamTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(GatewayError::malformed("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::ForbiddenTarget("example.com".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::MethodNotAllowed(Method::PUT).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_response_has_short_body() {
        let response = GatewayError::UpstreamTimeout.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
