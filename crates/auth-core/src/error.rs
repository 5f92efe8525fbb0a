//! Error types for session and authorization operations

use thiserror::Error;

/// Why a credential renewal did not produce a new session.
///
/// One renewal outcome is handed to every caller that was waiting on it, so
/// this type is `Clone` and carries only strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalError {
    #[error("no refresh token is held")]
    NoRefreshToken,

    #[error("refresh token rejected by server: {0}")]
    Rejected(String),

    #[error("network error during renewal: {0}")]
    Network(String),

    #[error("server issued an unusable credential: {0}")]
    Malformed(String),

    /// A logout or a new login happened while the renewal was in flight.
    #[error("renewal superseded by a newer session transition")]
    Superseded,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is malformed or its claims cannot be read
    #[error("Invalid token: {0}")]
    Decode(String),

    /// Login was attempted without both tokens
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Renewal failed: {0}")]
    Renewal(#[from] RenewalError),

    /// The server rejected the call's credential and recovery was not possible
    #[error("Authorization failed for {method} {path}")]
    AuthorizationFailure { method: String, path: String },

    /// Any non-authorization failure response, surfaced unchanged
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    /// A concurrent logout overtook this login
    #[error("Session transition superseded by a concurrent logout")]
    Superseded,

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// True when the error means the session itself is no longer valid
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            AuthError::Renewal(_) | AuthError::AuthorizationFailure { .. }
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(e: std::io::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}

impl From<::config::ConfigError> for AuthError {
    fn from(e: ::config::ConfigError) -> Self {
        AuthError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
