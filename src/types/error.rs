//! Error types for the community service
//!
//! Every failure a request can hit maps onto one of these variants, and each
//! variant maps onto exactly one HTTP status.

use hyper::StatusCode;

/// Message shown to callers for failures whose detail must stay server-side
pub const GENERIC_FAILURE: &str = "Something went wrong";

/// Main error type for community operations
#[derive(Debug, thiserror::Error)]
pub enum CommunityError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommunityError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code sent alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Config(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the detail of this error may be shown to the caller
    pub fn is_public(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Config(_) | Self::Internal(_)
        )
    }

    /// Message for the response body. Server faults collapse to a generic message.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::InvalidState(m)
            | Self::Conflict(m)
            | Self::Upstream(m) => m.clone(),
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => GENERIC_FAILURE.to_string(),
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for CommunityError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for CommunityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("Invalid JSON: {}", err))
    }
}

impl From<hyper::Error> for CommunityError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CommunityError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Internal(format!("WebSocket error: {}", err))
    }
}

impl From<bson::ser::Error> for CommunityError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encoding failed: {}", err))
    }
}

/// Duplicate keys and transient transaction failures mean another writer got
/// there first; everything else is an unavailable database.
impl From<mongodb::error::Error> for CommunityError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};

        if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
            return Self::Conflict(format!("Concurrent update: {}", err));
        }

        let duplicate_key = match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
            ErrorKind::Command(command_error) => command_error.code == 11000,
            _ => false,
        };

        if duplicate_key {
            Self::Conflict(format!("Duplicate key: {}", err))
        } else {
            Self::Database(err.to_string())
        }
    }
}

impl From<jsonwebtoken::errors::Error> for CommunityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

impl From<reqwest::Error> for CommunityError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(format!("Upstream request failed: {}", err))
    }
}

/// Result type alias for community operations
pub type Result<T> = std::result::Result<T, CommunityError>;
