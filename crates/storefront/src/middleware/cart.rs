//! Cart extractor.
//!
//! Resolves the visitor's cart key from the session, minting one on first
//! use, and hands the handler the live store for it.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use tracing::debug;

use crate::cart::{CartKey, CartStore};
use crate::error::AppError;
use crate::models::session_keys;
use crate::state::AppState;

/// The visitor's cart store.
pub struct CurrentCart(pub CartStore);

impl FromRequestParts<AppState> for CurrentCart {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::Internal("Session layer missing".to_string()))?;

        let key = cart_key(session).await?;

        Ok(Self(state.carts().get(key).await))
    }
}

/// The session's cart key, creating and storing one if absent.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
pub async fn cart_key(session: &Session) -> Result<CartKey, tower_sessions::session::Error> {
    if let Some(key) = session.get::<CartKey>(session_keys::CART_KEY).await? {
        return Ok(key);
    }

    let key = CartKey::generate();
    session.insert(session_keys::CART_KEY, key).await?;
    debug!(cart = %key, "Issued cart key");
    Ok(key)
}
