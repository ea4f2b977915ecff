//! Checkout handlers: tax, payment intent, order placement.
//!
//! Amounts are always computed from the cart held here; the request only
//! supplies who is paying and where it ships.

use axum::{Json, extract::State, http::StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, info, instrument};

use eastwest_core::{Email, Money};

use crate::api::{
    Address, AuthTokens, Order, OrderLine, OrderRequest, PaymentIntent, PaymentIntentRequest,
    TaxRequest,
};
use crate::cart::{CartAction, CartState, CartStore, ReconcileStatus};
use crate::error::{AppError, FieldErrors, Result, add_breadcrumb};
use crate::middleware::{CurrentCart, OptionalAuth};
use crate::services::AuthService;
use crate::state::AppState;

/// Order amounts with tax applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckoutTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub tax_rate: Decimal,
    pub tax: Money,
    pub total: Money,
}

fn validate_address(address: &Address, errors: &mut FieldErrors) {
    let required = [
        ("address.name", &address.name),
        ("address.line1", &address.line1),
        ("address.city", &address.city),
        ("address.state", &address.state),
        ("address.zip", &address.zip),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.insert(field, "is required".to_string());
        }
    }
}

fn validate_email(raw: &str, errors: &mut FieldErrors) -> Option<Email> {
    Email::parse(raw)
        .map_err(|e| errors.insert("email", e.to_string()))
        .ok()
}

/// Coupon and first-time discounts together, never more than the subtotal.
fn total_discount(cart: &CartState) -> Money {
    (cart.discount_total() + cart.first_time_discount_amount()).min(cart.subtotal())
}

fn require_items(cart: &CartState) -> Result<()> {
    if cart.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }
    Ok(())
}

/// Coupons must be settled before money changes hands.
fn require_settled(cart: &CartStore) -> Result<()> {
    match cart.reconcile_status() {
        ReconcileStatus::Idle => Ok(()),
        status => {
            debug!(cart = %cart.key(), ?status, "Checkout while coupons reconcile");
            Err(AppError::Conflict(
                "Cart discounts are still updating, please try again".to_string(),
            ))
        }
    }
}

async fn compute_totals(
    state: &AppState,
    auth: &AuthService<'_>,
    tokens: Option<AuthTokens>,
    cart: &CartState,
    address: &Address,
) -> Result<CheckoutTotals> {
    let request = TaxRequest {
        address: address.clone(),
        subtotal: cart.subtotal(),
        discount: total_discount(cart),
        shipping: cart.shipping_cost(),
    };

    let api = state.api();
    let request = &request;
    let tax = auth
        .with_optional_refresh(tokens, |tokens| async move {
            api.calculate_tax(request, tokens.as_ref()).await
        })
        .await?;

    Ok(CheckoutTotals {
        subtotal: request.subtotal,
        discount: request.discount,
        shipping: request.shipping,
        tax_rate: tax.rate,
        tax: tax.amount,
        total: cart.total() + tax.amount,
    })
}

#[derive(Debug, Deserialize)]
pub struct TaxBody {
    pub address: Address,
}

/// Totals with tax for a shipping address.
#[instrument(skip_all)]
pub async fn tax(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(tokens): OptionalAuth,
    CurrentCart(cart): CurrentCart,
    Json(body): Json<TaxBody>,
) -> Result<Json<CheckoutTotals>> {
    let mut errors = FieldErrors::new();
    validate_address(&body.address, &mut errors);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let snapshot = cart.snapshot();
    require_items(&snapshot)?;

    let auth = AuthService::new(state.api(), &session);
    let totals = compute_totals(&state, &auth, tokens, &snapshot, &body.address).await?;
    Ok(Json(totals))
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentBody {
    pub address: Address,
    pub email: String,
}

/// Create a payment intent for the cart total including tax.
#[instrument(skip_all)]
pub async fn payment_intent(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(tokens): OptionalAuth,
    CurrentCart(cart): CurrentCart,
    Json(body): Json<PaymentIntentBody>,
) -> Result<Json<PaymentIntent>> {
    let mut errors = FieldErrors::new();
    let email = validate_email(&body.email, &mut errors);
    validate_address(&body.address, &mut errors);
    let Some(email) = email.filter(|_| errors.is_empty()) else {
        return Err(AppError::Validation(errors));
    };

    let snapshot = cart.snapshot();
    require_items(&snapshot)?;
    require_settled(&cart)?;

    let auth = AuthService::new(state.api(), &session);
    let totals = compute_totals(&state, &auth, tokens.clone(), &snapshot, &body.address).await?;

    let request = PaymentIntentRequest {
        amount: totals.total,
        email,
        address: body.address,
    };
    let api = state.api();
    let request = &request;
    let intent = auth
        .with_optional_refresh(tokens, |tokens| async move {
            api.create_payment_intent(request, tokens.as_ref()).await
        })
        .await?;

    info!(payment_intent = %intent.id, amount = %intent.amount, "Payment intent created");
    Ok(Json(intent))
}

#[derive(Debug, Deserialize)]
pub struct OrderBody {
    pub address: Address,
    pub email: String,
    pub payment_intent_id: String,
}

/// Save the order remotely and clear the cart.
#[instrument(skip_all)]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(tokens): OptionalAuth,
    CurrentCart(cart): CurrentCart,
    Json(body): Json<OrderBody>,
) -> Result<(StatusCode, Json<Order>)> {
    let mut errors = FieldErrors::new();
    let email = validate_email(&body.email, &mut errors);
    validate_address(&body.address, &mut errors);
    let payment_intent_id = body.payment_intent_id.trim().to_string();
    if payment_intent_id.is_empty() {
        errors.insert("payment_intent_id", "is required".to_string());
    }
    let Some(email) = email.filter(|_| errors.is_empty()) else {
        return Err(AppError::Validation(errors));
    };

    let snapshot = cart.snapshot();
    require_items(&snapshot)?;
    require_settled(&cart)?;

    let auth = AuthService::new(state.api(), &session);
    let totals = compute_totals(&state, &auth, tokens.clone(), &snapshot, &body.address).await?;

    let request = OrderRequest {
        email,
        address: body.address,
        items: snapshot.items.iter().map(OrderLine::from).collect(),
        coupons: snapshot.coupons.iter().map(|c| c.code.clone()).collect(),
        shipping: snapshot.shipping.clone(),
        payment_intent_id,
        subtotal: totals.subtotal,
        discount: totals.discount,
        tax: totals.tax,
        total: totals.total,
    };
    let api = state.api();
    let request = &request;
    let order = auth
        .with_optional_refresh(tokens, |tokens| async move {
            api.create_order(request, tokens.as_ref()).await
        })
        .await?;

    cart.dispatch(CartAction::Clear).await;

    add_breadcrumb("checkout", "Order placed", Some(&[("order", &order.number)]));
    info!(order = %order.number, total = %order.total, "Order placed");
    Ok((StatusCode::CREATED, Json(order)))
}
