// Error handling module
// Session error taxonomy shared by the store, coordinator, and API client

use thiserror::Error;

/// Errors surfaced by the session subsystem
#[derive(Error, Debug)]
pub enum SessionError {
    /// No refresh token exists; the user must log in again
    #[error("No active session: refresh token is missing")]
    NoSession,

    /// The refresh RPC was rejected or failed in transport.
    /// Credentials have already been cleared when this is returned.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The persisted credential store could not be opened
    #[error("Credential store unavailable: {0}")]
    StorageUnavailable(String),

    /// The one-shot resend after a coordinated refresh was still rejected
    #[error("Request retry exhausted: {status} - {message}")]
    RequestRetryExhausted { status: u16, message: String },

    /// Error response from the Eigo API
    #[error("Eigo API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
