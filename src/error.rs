//! Error types for the cache test backend

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for the cache test backend
pub type Result<T> = std::result::Result<T, Error>;

/// Cache test backend errors
#[derive(Error, Debug)]
pub enum Error {
    /// Requested simulated delay is negative or not below the configured maximum
    #[error("Invalid delay: {seconds}s (must be between 0 and {max}s exclusive)")]
    InvalidDelay {
        /// Requested delay in seconds
        seconds: i64,
        /// Exclusive upper bound in seconds
        max: u64,
    },

    /// Every delay slot is taken
    #[error("Too many concurrent delays: all {capacity} slots in use")]
    TooManyConcurrentDelays {
        /// Total number of slots
        capacity: usize,
    },

    /// Request parameter failed validation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status this error is reported with
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidDelay { .. } | Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::TooManyConcurrentDelays { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller caused this error
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (
            status,
            Json(json!({
                "error": self.to_string(),
                "status": status.as_u16(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_delay_is_bad_request() {
        let err = Error::InvalidDelay { seconds: 60, max: 60 };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_client_error());
    }

    #[test]
    fn saturation_is_service_unavailable() {
        let err = Error::TooManyConcurrentDelays { capacity: 100 };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.is_client_error());
    }

    #[test]
    fn config_error_is_internal() {
        let err = Error::Config("bad".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn display_mentions_bounds() {
        let err = Error::InvalidDelay { seconds: 75, max: 60 };
        assert_eq!(
            err.to_string(),
            "Invalid delay: 75s (must be between 0 and 60s exclusive)"
        );
    }
}
