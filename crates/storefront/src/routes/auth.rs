//! Authentication route handlers.
//!
//! Credentials are checked by the remote storefront API; see
//! [`crate::services::auth`].

use axum::{Json, extract::State, http::StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use eastwest_core::{Email, FirstTimeDiscount};

use crate::api::CustomerSummary;
use crate::error::{AppError, FieldErrors, Result};
use crate::middleware::CurrentCart;
use crate::services::AuthService;
use crate::state::AppState;

/// Sign-in request body.
#[derive(Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

/// Sign-in response. Tokens stay in the session.
#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub customer: Option<CustomerSummary>,
    pub first_time_discount: FirstTimeDiscount,
}

/// Sign in and load the customer's first-time discount into the cart.
#[instrument(skip_all)]
pub async fn sign_in(
    State(state): State<AppState>,
    session: Session,
    CurrentCart(cart): CurrentCart,
    Json(form): Json<SignInForm>,
) -> Result<Json<SignInResponse>> {
    let password = SecretString::from(form.password);

    let mut errors = FieldErrors::new();
    let email = Email::parse(&form.email)
        .map_err(|e| errors.insert("email", e.to_string()))
        .ok();
    if password.expose_secret().is_empty() {
        errors.insert("password", "is required".to_string());
    }
    let Some(email) = email.filter(|_| errors.is_empty()) else {
        return Err(AppError::Validation(errors));
    };

    let signed_in = AuthService::new(state.api(), &session)
        .sign_in(&email, password.expose_secret(), &cart)
        .await?;

    Ok(Json(SignInResponse {
        customer: signed_in.tokens.customer,
        first_time_discount: signed_in.first_time_discount,
    }))
}

/// Sign out, dropping the tokens and emptying the cart.
#[instrument(skip_all)]
pub async fn sign_out(
    State(state): State<AppState>,
    session: Session,
    CurrentCart(cart): CurrentCart,
) -> Result<StatusCode> {
    AuthService::new(state.api(), &session)
        .sign_out(&cart)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
