//! Error taxonomy for the remote request layer.

use serde::Deserialize;
use thiserror::Error;

/// Failure of a single request to the optimization service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// FastAPI-style error body: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

impl ApiError {
    /// Best available human-readable message for surfacing to the user.
    ///
    /// Prefers the service's `detail` field, then the raw response body,
    /// then the transport error text.
    pub fn detail_message(&self) -> String {
        match self {
            ApiError::Http { status, body } => {
                if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
                    if let Some(detail) = parsed.detail {
                        return detail;
                    }
                }
                if body.trim().is_empty() {
                    format!("request failed with HTTP {status}")
                } else {
                    body.clone()
                }
            }
            ApiError::Network(msg) | ApiError::Deserialize(msg) => msg.clone(),
        }
    }
}
