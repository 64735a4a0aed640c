//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::error::ServerError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Trust-chain failure; the kind is logged, never returned
    #[error("Authorization Violation")]
    AuthorizationViolation(String),

    #[error("Method not allowed: {0}")]
    ReadOnly(String),

    #[error("Configuration rejected: {0}")]
    Config(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::AccountNotFound(key) => ApiError::NotFound(format!("account {}", key)),
            ServerError::TrustChain(chain) => ApiError::AuthorizationViolation(chain.kind().into()),
            ServerError::ResolverWrite(msg) => ApiError::ReadOnly(msg),
            ServerError::ResolverUnavailable(msg) => ApiError::Unavailable(msg),
            ServerError::InvalidSystemAccount(msg) => ApiError::BadRequest(msg),
            ServerError::Config(config) => ApiError::Config(config.to_string()),
            ServerError::OperatorModeDisabled => {
                ApiError::Unavailable("operator mode is not enabled".into())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::AuthorizationViolation(kind) => {
                warn!(kind = %kind, "Admin request rejected by trust chain");
                (StatusCode::FORBIDDEN, "AUTHORIZATION_VIOLATION")
            }
            ApiError::ReadOnly(_) => (StatusCode::METHOD_NOT_ALLOWED, "RESOLVER_READ_ONLY"),
            ApiError::Config(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONFIG_ERROR"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrustChainError;

    #[test]
    fn test_trust_chain_kind_is_hidden() {
        let err = ApiError::from(ServerError::TrustChain(TrustChainError::UnknownIssuer(
            "Oforeign".into(),
        )));
        assert_eq!(err.to_string(), "Authorization Violation");
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::AccountNotFound("A".into()), StatusCode::NOT_FOUND),
            (ServerError::ResolverWrite("ro".into()), StatusCode::METHOD_NOT_ALLOWED),
            (ServerError::InvalidSystemAccount("A".into()), StatusCode::BAD_REQUEST),
            (ServerError::OperatorModeDisabled, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
