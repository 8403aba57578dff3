//! Error types for session operations

use portal_auth::Error as AuthError;

/// Why a token renewal failed. Every variant ends the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh endpoint unreachable: {0}")]
    Network(String),

    #[error("refresh returned an unusable token: {0}")]
    MalformedToken(String),

    #[error("refresh task ended without reporting an outcome")]
    Interrupted,
}

impl From<AuthError> for RefreshError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Network(msg) => RefreshError::Network(msg),
            AuthError::AuthServer { status, message } => RefreshError::Rejected { status, message },
            AuthError::InvalidResponse(msg) | AuthError::MalformedToken(msg) => {
                RefreshError::MalformedToken(msg)
            }
        }
    }
}

/// Failure of an authenticated API request.
///
/// Display strings are what a user should see: authentication problems all
/// read as "log in again", transport problems as "network error".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("session expired, please log in again")]
    Unauthenticated,

    /// Non-success status. `message` is the response body, or a
    /// status-derived fallback when the body was empty.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("network error")]
    Network,

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("could not encode request: {0}")]
    Encode(String),
}

impl ApiError {
    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApiError::Unauthenticated)
    }
}
