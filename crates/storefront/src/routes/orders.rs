//! Order lookup handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use eastwest_core::{Email, OrderId};

use crate::api::{ApiError, Order, OrderTracking};
use crate::error::{AppError, FieldErrors, Result};
use crate::middleware::RequireAuth;
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

/// A signed-in customer's order.
#[instrument(skip(state, session, tokens))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(tokens): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    let api = state.api();
    let order = AuthService::new(api, &session)
        .with_refresh(tokens, |tokens| async move { api.get_order(id, &tokens).await })
        .await
        .map_err(|e| match e {
            AuthError::Api(ApiError::NotFound(_)) => AppError::NotFound("Order".to_string()),
            other => other.into(),
        })?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    pub number: String,
    pub email: String,
}

/// Public order tracking by order number and the email it was placed with.
#[instrument(skip(state, query), fields(number = %query.number))]
pub async fn track(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
) -> Result<Json<OrderTracking>> {
    let mut errors = FieldErrors::new();
    let number = query.number.trim();
    if number.is_empty() {
        errors.insert("number", "is required".to_string());
    }
    let email = Email::parse(&query.email)
        .map_err(|e| errors.insert("email", e.to_string()))
        .ok();
    let Some(email) = email.filter(|_| errors.is_empty()) else {
        return Err(AppError::Validation(errors));
    };

    let tracking = state
        .api()
        .track_order(number, &email)
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => AppError::NotFound("Order".to_string()),
            other => other.into(),
        })?;
    Ok(Json(tracking))
}
