use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// No credential is set; the request was never sent.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// 401 with no renewal credential available, or after renewal failed.
    #[error("Unauthorized - session expired")]
    Unauthorized,

    /// 4xx carrying a server-reported detail message, surfaced verbatim.
    #[error("{detail}")]
    Validation { detail: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data in errors
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

    /// Extract the server's `{"detail": "..."}` message when the body carries
    /// one; fall back to the (truncated) raw body otherwise.
    fn detail_message(body: &str) -> String {
        #[derive(serde::Deserialize)]
        struct DetailBody {
            detail: serde_json::Value,
        }

        if let Ok(parsed) = serde_json::from_str::<DetailBody>(body) {
            if let Some(s) = parsed.detail.as_str() {
                return s.to_string();
            }
            // Validation errors can arrive as structured detail arrays
            return Self::truncate_body(&parsed.detail.to_string());
        }
        Self::truncate_body(body)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            404 => ApiError::NotFound(Self::detail_message(body)),
            400..=499 => ApiError::Validation {
                detail: Self::detail_message(body),
            },
            500..=599 => ApiError::ServerError(Self::truncate_body(body)),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, Self::truncate_body(body))),
        }
    }

    /// The one error class allowed to change the session phase. Transient
    /// network and server failures never log the user out.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::NotAuthenticated)
    }

    /// The user-facing message for a failed mutation: the server's detail
    /// text when present, else a generic fallback.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation { detail } => detail.clone(),
            ApiError::NotFound(detail) if !detail.is_empty() => detail.clone(),
            ApiError::Unauthorized | ApiError::NotAuthenticated => {
                "Session expired. Please log in again.".to_string()
            }
            ApiError::Network(_) => "Network error. Check your connection.".to_string(),
            _ => "Request failed. Please try again.".to_string(),
        }
    }
}
