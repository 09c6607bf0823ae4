use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found")]
    NotFound,

    #[error("Database error: {0}")]
    Db(String),

    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Internal reason an authentication attempt was rejected. Collapsed to a
/// plain `Unauthorized` on the wire; the concrete reason only reaches the
/// audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidSignature,
    Expired,
    WrongKind,
    RevokedOrReused,
    UserInactive,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::InvalidSignature => "invalid_signature",
            AuthFailure::Expired => "expired",
            AuthFailure::WrongKind => "wrong_kind",
            AuthFailure::RevokedOrReused => "revoked_or_reused",
            AuthFailure::UserInactive => "user_inactive",
        }
    }
}

impl AppError {
    /// Record the real failure reason in the audit log and return the
    /// deliberately indistinct wire error.
    pub fn unauthenticated(reason: AuthFailure) -> Self {
        tracing::warn!(target: "audit", reason = reason.as_str(), "authentication rejected");
        AppError::Unauthorized
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(e: mongodb::error::Error) -> Self {
        AppError::Db(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::Validation(s) => (StatusCode::BAD_REQUEST, s.as_str()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Conflict(s) => (StatusCode::CONFLICT, s.as_str()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found"),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database error"),
            AppError::StoreUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "temporarily unavailable")
            }
            AppError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "too many requests"),
            AppError::Misconfiguration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "misconfigured"),
            AppError::Internal(s) => (StatusCode::INTERNAL_SERVER_ERROR, s.as_str()),
        };

        (status, Json(json!({ "error": msg }))).into_response()
    }
}
