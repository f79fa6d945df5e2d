//! Error types for the escrow client.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by lifecycle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input, detected before any remote call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not permitted from the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// Lifecycle state at the time of the attempt.
        state: String,
    },

    /// The payload could not be serialized for hashing.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// The remote service rejected the request or could not be reached.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true when a caller-level retry may succeed.
    ///
    /// Only transport failures and 5xx/429 rejections qualify. Validation,
    /// state and encoding errors are programming errors and never transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Service(e) => e.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }
}

/// Failure reported by (or while reaching) the remote payment service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request never produced an HTTP response (connect, timeout, TLS).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service rejected request ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body as returned by the service.
        body: String,
    },

    /// The response body did not match the expected record shape.
    #[error("malformed service response: {0}")]
    MalformedResponse(String),

    /// The referenced escrow record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Returns true for network failures and server-side (5xx) or rate-limit
    /// (429) rejections.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::MalformedResponse(_) | Self::NotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
