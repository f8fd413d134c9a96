//! Error types for directory object operations.
//!
//! Every failure surfaced by the engine identifies the offending key, attribute or relation.
//! Backend fault codes are translated into these kinds before they reach callers.

use serde::Serialize;
use thiserror::Error;

/// Main error type for directory object operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Schema or required-field violation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A single-valued attribute received several values
    #[error("Attribute `{attribute}` is single-valued but received {count} values")]
    CardinalityError {
        /// Attribute name
        attribute: String,
        /// Number of values supplied
        count: usize,
    },

    /// Entry already exists at the target location
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation target is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Member type not allowed by the relation
    #[error("Relation `{relation}` does not accept members of type `{member_type}`")]
    UnsupportedMemberType {
        /// Relation name
        relation: String,
        /// Requested member type
        member_type: String,
    },

    /// Adding the member would create a containment cycle
    #[error("Cycle detected: {0}")]
    CycleDetected(String),

    /// Member is already part of the group
    #[error("Already a member: {0}")]
    AlreadyMember(String),

    /// Member is not part of the group
    #[error("Not a member: {0}")]
    NotMember(String),

    /// A one-sided membership edge could not be retracted
    #[error("Inconsistent membership: {0}")]
    InconsistentMembership(String),

    /// Directory backend is unavailable
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Translated, non-transient backend failure
    #[error("Backend error: {backend}: {message}")]
    BackendError {
        /// Backend name that failed
        backend: String,
        /// Error message
        message: String,
    },

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for directory object operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
    /// Optional request ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::CardinalityError { .. } => "CARDINALITY_ERROR",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnsupportedMemberType { .. } => "UNSUPPORTED_MEMBER_TYPE",
            Self::CycleDetected(_) => "CYCLE_DETECTED",
            Self::AlreadyMember(_) => "ALREADY_MEMBER",
            Self::NotMember(_) => "NOT_MEMBER",
            Self::InconsistentMembership(_) => "INCONSISTENT_MEMBERSHIP",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::BackendError { .. } => "BACKEND_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        self.into_error_response_with_id(None)
    }

    /// Converts the error into an `ErrorResponse` with a request ID.
    #[must_use]
    pub fn into_error_response_with_id(self, request_id: Option<String>) -> ErrorResponse {
        let details = match &self {
            Self::CardinalityError { attribute, count } => Some(serde_json::json!({
                "attribute": attribute,
                "count": count,
            })),
            Self::UnsupportedMemberType {
                relation,
                member_type,
            } => Some(serde_json::json!({
                "relation": relation,
                "member_type": member_type,
            })),
            _ => None,
        };

        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details,
            },
            request_id,
        }
    }

    /// Returns true for transient failures that are safe to retry with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Timeout(_))
    }

    /// Returns true for input errors the caller must fix.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_) | Self::CardinalityError { .. }
        )
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_)
                | Self::ConfigError(_)
                | Self::BackendError { .. }
                | Self::InconsistentMembership(_)
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidRequest(format!("invalid unique identifier: {err}"))
    }
}
