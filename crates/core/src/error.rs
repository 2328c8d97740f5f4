//! Error types for the RiskProfiler domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use crate::session::ClientId;
use thiserror::Error;

/// The top-level error type for all RiskProfiler operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the caller can fix this by changing the request (HTTP 4xx territory).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Session(SessionError::UnknownSession(_))
                | Error::Session(SessionError::AlreadyComplete(_))
                | Error::Session(SessionError::GreetingSkipped(_))
        )
    }

    /// Whether retrying the identical call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Session(SessionError::CompletionUnavailable { .. })
                | Error::Session(SessionError::GreetingUnavailable { .. })
        )
    }
}

// --- Bounded context errors ---

/// Failures of the session lifecycle, as seen by callers of the orchestrator.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(ClientId),

    #[error("Session {0} is already complete and accepts no further turns")]
    AlreadyComplete(ClientId),

    /// The interview started without a greeting; one can no longer be added.
    #[error("Session {0} is already under way without a greeting")]
    GreetingSkipped(ClientId),

    #[error("Completion service unavailable: {reason}")]
    CompletionUnavailable { reason: String },

    /// The session was created but its greeting could not be generated.
    /// The id stays valid; the greeting can be retried.
    #[error("Session {client_id} created but greeting failed: {reason}")]
    GreetingUnavailable { client_id: ClientId, reason: String },
}

/// Failures reported by a completion service backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Transient failures are worth retrying with backoff; the rest are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_)
            | ProviderError::Timeout(_)
            | ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

/// A completion flagged itself complete but lacks fields the profile needs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("Malformed profile: missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Malformed profile: invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session already exists: {0}")]
    AlreadyExists(ClientId),

    #[error("Session not found: {0}")]
    NotFound(ClientId),

    #[error("History of session {0} can only be appended to")]
    HistoryRewritten(ClientId),

    #[error("Storage error: {0}")]
    Storage(String),
}
