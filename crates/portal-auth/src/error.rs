//! Error types for login, refresh and token decoding

/// Errors from authentication operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No response at all (DNS, connect, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status. `message` is the server's body when it sent one.
    #[error("{message}")]
    AuthServer { status: u16, message: String },

    /// Success status but the body is not the documented token shape.
    #[error("invalid auth response: {0}")]
    InvalidResponse(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
