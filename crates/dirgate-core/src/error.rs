//! Error types for gateway operations.
//!
//! Every failure a request can hit, from a policy denial to a backend protocol error, is one
//! variant of [`Error`]. Each variant maps to exactly one HTTP status and a structured
//! [`ErrorResponse`] body.

use serde::Serialize;
use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No configured directory endpoint accepted a transport connection
    #[error("Directory unavailable: {0}")]
    ConnectError(String),

    /// The directory rejected the gateway's bind credentials
    #[error("Directory bind rejected: {0}")]
    BindRejected(String),

    /// The directory reported a failure while streaming search results
    #[error("Directory search failed: {0}")]
    SearchError(String),

    /// The directory rejected a modification or the credential change failed
    #[error("Directory modification failed: {0}")]
    MutationError(String),

    /// Entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid caller credential
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Attribute is not in the mutable-attribute allow-list
    #[error("Attribute not allowed: {0}")]
    AttributeNotAllowed(String),

    /// Credential changes are disabled for this deployment
    #[error("Credential change forbidden: {0}")]
    CredentialChangeForbidden(String),

    /// Malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Operation timed out
    #[error("Timeout waiting for directory: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for gateway operations.
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
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectError(_) | Self::BindRejected(_) => "DIRECTORY_UNAVAILABLE",
            Self::SearchError(_) => "SEARCH_FAILED",
            Self::MutationError(_) => "MUTATION_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "NOT_AUTHORIZED",
            Self::AttributeNotAllowed(_) => "ATTRIBUTE_NOT_ALLOWED",
            Self::CredentialChangeForbidden(_) => "CREDENTIAL_CHANGE_FORBIDDEN",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code this error is surfaced with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::AttributeNotAllowed(_) | Self::InvalidRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::CredentialChangeForbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::ConfigError(_) | Self::InternalError(_) => 500,
            Self::SearchError(_) | Self::MutationError(_) => 502,
            Self::ConnectError(_) | Self::BindRejected(_) => 503,
            Self::Timeout(_) => 504,
        }
    }

    /// Returns true if the failure may succeed against an alternate endpoint.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectError(_))
    }

    /// Message safe to return to a caller.
    ///
    /// Bind rejections are collapsed into a generic message so a response never reveals which
    /// configured identity failed.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::BindRejected(_) => "Directory unavailable".to_string(),
            other => other.to_string(),
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
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.client_message(),
            },
            request_id,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_)
                | Self::ConfigError(_)
                | Self::BindRejected(_)
                | Self::ConnectError(_)
                | Self::MutationError(_)
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
