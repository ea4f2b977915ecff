//! Authentication extractors.
//!
//! Sign-in stores the remote API's tokens in the session; these extractors
//! read them back for handlers that call authenticated endpoints.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::ACCEPT, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use tower_sessions::Session;

use crate::api::AuthTokens;
use crate::models::session_keys;

/// Where signed-out visitors are sent.
pub const SIGN_IN_PATH: &str = "/auth/sign-in";

/// Extractor that requires a signed-in customer.
///
/// ```rust,ignore
/// async fn handler(RequireAuth(tokens): RequireAuth) -> impl IntoResponse {
///     // tokens.access_token is valid as far as the session knows
/// }
/// ```
pub struct RequireAuth(pub AuthTokens);

/// Rejection for [`RequireAuth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Browser navigation: redirect to sign-in.
    RedirectToSignIn,
    /// API call: 401 with the sign-in location in the body.
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToSignIn => Redirect::to(SIGN_IN_PATH).into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Sign in required", "redirect": SIGN_IN_PATH })),
            )
                .into_response(),
        }
    }
}

fn wants_html(parts: &Parts) -> bool {
    parts
        .headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

async fn session_tokens(parts: &Parts) -> Option<AuthTokens> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<AuthTokens>(session_keys::AUTH_TOKENS)
        .await
        .ok()
        .flatten()
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_tokens(parts).await.map(Self).ok_or_else(|| {
            if wants_html(parts) {
                AuthRejection::RedirectToSignIn
            } else {
                AuthRejection::Unauthorized
            }
        })
    }
}

/// Extractor for handlers that forward tokens when the visitor has them.
pub struct OptionalAuth(pub Option<AuthTokens>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_tokens(parts).await))
    }
}

/// Store tokens in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_auth_tokens(
    session: &Session,
    tokens: &AuthTokens,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::AUTH_TOKENS, tokens).await
}

/// Remove tokens from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_auth_tokens(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<AuthTokens>(session_keys::AUTH_TOKENS)
        .await?;
    Ok(())
}
