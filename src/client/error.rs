use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unauthorized - session may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ClientError {
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ClientError::Unauthorized,
            403 => ClientError::AccessDenied(truncated),
            404 => ClientError::NotFound(truncated),
            429 => ClientError::RateLimited,
            500..=599 => ClientError::ServerError(truncated),
            _ => ClientError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Transient failures worth another attempt. An invalid or revoked
    /// credential is not among them: retrying cannot fix it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::NetworkError(_) | ClientError::ServerError(_) | ClientError::RateLimited
        )
    }
}
