//! Authentication error types.

use thiserror::Error;

use crate::api::ApiError;

/// Errors from signing in and from calls made with session tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The remote API rejected the email and password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Tokens were rejected and could not be refreshed. They have been
    /// removed from the session.
    #[error("session expired")]
    SessionExpired,

    /// Remote API call failed for a reason other than authentication.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Session store read or write failed.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}
