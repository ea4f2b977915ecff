//! Guest cart handlers.
//!
//! A guest can park their cart remotely under an email address and pick it
//! up again later, on this device or another.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use eastwest_core::{AppliedCoupon, CouponCode, Email};

use crate::api::{ApiClient, ApiError, CartQuote, GuestCart, GuestCartLine};
use crate::cart::{CartAction, CartState, PersistedCart, eligibility};
use crate::error::{AppError, Result};
use crate::middleware::CurrentCart;
use crate::routes::cart::CartView;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GuestCartRequest {
    pub email: String,
}

fn parse_email(raw: &str) -> Result<Email> {
    Email::parse(raw).map_err(|e| AppError::invalid("email", e.to_string()))
}

fn guest_not_found(err: ApiError) -> AppError {
    match err {
        ApiError::NotFound(_) => AppError::NotFound("Guest cart".to_string()),
        other => other.into(),
    }
}

/// Save the current cart remotely, replacing any cart already saved under
/// the same email.
#[instrument(skip(state, cart, request))]
pub async fn save(
    State(state): State<AppState>,
    CurrentCart(cart): CurrentCart,
    Json(request): Json<GuestCartRequest>,
) -> Result<Json<GuestCart>> {
    let email = parse_email(&request.email)?;
    let snapshot = cart.snapshot();
    if snapshot.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    let guest = GuestCart {
        email,
        items: snapshot.items.iter().map(GuestCartLine::from).collect(),
        coupons: snapshot.coupons.iter().map(|c| c.code.clone()).collect(),
        shipping: snapshot.shipping.clone(),
        updated_at: None,
    };

    let saved = match state.api().update_guest_cart(&guest).await {
        Err(ApiError::NotFound(_)) => state.api().save_guest_cart(&guest).await?,
        other => other?,
    };

    info!(
        items = saved.items.len(),
        domain = saved.email.domain(),
        "Guest cart saved"
    );
    Ok(Json(saved))
}

/// Replace the local cart with the one saved remotely.
///
/// Saved coupon codes are looked up and re-evaluated against the restored
/// lines; codes that no longer fit are dropped.
#[instrument(skip(state, cart, query))]
pub async fn restore(
    State(state): State<AppState>,
    CurrentCart(cart): CurrentCart,
    Query(query): Query<GuestCartRequest>,
) -> Result<Json<CartView>> {
    let email = parse_email(&query.email)?;
    let guest = state
        .api()
        .get_guest_cart(&email)
        .await
        .map_err(guest_not_found)?;

    let items: Vec<_> = guest
        .items
        .into_iter()
        .map(GuestCartLine::into_line_item)
        .collect();

    let mut preview = cart.snapshot();
    preview.apply(&CartAction::Hydrate(PersistedCart {
        items: items.clone(),
        coupons: vec![],
        shipping: guest.shipping.clone(),
    }));
    let coupons = reapply_coupons(state.api(), &guest.coupons, &preview).await;

    let next = cart
        .restore(PersistedCart {
            items,
            coupons,
            shipping: guest.shipping,
        })
        .await;

    info!(items = next.items.len(), "Guest cart restored");
    Ok(Json(CartView::new(&next, cart.reconcile_status())))
}

async fn reapply_coupons(
    api: &ApiClient,
    codes: &[CouponCode],
    preview: &CartState,
) -> Vec<AppliedCoupon> {
    let quote: CartQuote = preview.quote();
    let now = Utc::now();
    let mut applied: Vec<AppliedCoupon> = Vec::with_capacity(codes.len());

    for code in codes {
        let coupon = match api.get_coupon(code).await {
            Ok(coupon) => coupon,
            Err(e) => {
                debug!(%code, error = %e, "Dropping saved coupon");
                continue;
            }
        };
        match eligibility::evaluate(&coupon, &quote, now)
            .and_then(|c| eligibility::check_stacking(&c, &applied).map(|()| c))
        {
            Ok(coupon) => applied.push(coupon),
            Err(reason) => debug!(%code, %reason, "Dropping saved coupon"),
        }
    }

    applied
}

/// Delete the cart saved under an email.
#[instrument(skip(state, query))]
pub async fn delete(
    State(state): State<AppState>,
    Query(query): Query<GuestCartRequest>,
) -> Result<StatusCode> {
    let email = parse_email(&query.email)?;
    state
        .api()
        .delete_guest_cart(&email)
        .await
        .map_err(guest_not_found)?;
    Ok(StatusCode::NO_CONTENT)
}
