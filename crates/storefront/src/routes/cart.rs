//! Cart route handlers.
//!
//! Every mutation answers with the full cart view, including where the
//! coupon reconciliation cycle stands, so clients can poll `GET /cart` until
//! `reconcile_status` is back to `idle`.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use eastwest_core::{
    AppliedCoupon, CartLineItem, CouponCode, DiscountKind, LineId, Money, ProductId,
    SelectedOption, ShippingInfo,
};

use crate::api::{AddressCheck, ApiError};
use crate::cart::{CartAction, CartState, CartStore, ReconcileStatus, eligibility};
use crate::error::{AppError, FieldErrors, Result, add_breadcrumb};
use crate::middleware::CurrentCart;
use crate::state::AppState;

/// Largest quantity accepted in one add.
const MAX_ADD_QUANTITY: u32 = 99;

// =============================================================================
// Views
// =============================================================================

/// Applied coupon as shown to the client.
#[derive(Debug, Clone, Serialize)]
pub struct CouponView {
    pub code: CouponCode,
    pub discount: DiscountKind,
    pub amount: Money,
    pub stackable: bool,
}

impl From<&AppliedCoupon> for CouponView {
    fn from(coupon: &AppliedCoupon) -> Self {
        Self {
            code: coupon.code.clone(),
            discount: coupon.discount,
            amount: coupon.amount,
            stackable: coupon.stackable,
        }
    }
}

/// The cart with its totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineItem>,
    pub coupons: Vec<CouponView>,
    pub shipping: Option<ShippingInfo>,
    pub item_count: u32,
    pub subtotal: Money,
    pub discount_total: Money,
    pub first_time_discount: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub address_discount: bool,
    pub reconcile_status: ReconcileStatus,
    pub revision: u64,
}

impl CartView {
    #[must_use]
    pub fn new(state: &CartState, reconcile_status: ReconcileStatus) -> Self {
        Self {
            items: state.items.clone(),
            coupons: state.coupons.iter().map(CouponView::from).collect(),
            shipping: state.shipping.clone(),
            item_count: state.item_count(),
            subtotal: state.subtotal(),
            discount_total: state.discount_total(),
            first_time_discount: state.first_time_discount_amount(),
            shipping_cost: state.shipping_cost(),
            total: state.total(),
            address_discount: state.address_discount,
            reconcile_status,
            revision: state.revision,
        }
    }

    /// View of the store's current state.
    #[must_use]
    pub fn of(cart: &CartStore) -> Self {
        Self::new(&cart.snapshot(), cart.reconcile_status())
    }
}

async fn dispatch(cart: &CartStore, action: CartAction) -> Json<CartView> {
    let next = cart.dispatch(action).await;
    Json(CartView::new(&next, cart.reconcile_status()))
}

// =============================================================================
// Lines
// =============================================================================

/// Display cart.
#[instrument(skip(cart))]
pub async fn show(CurrentCart(cart): CurrentCart) -> Json<CartView> {
    Json(CartView::of(&cart))
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub options: Vec<SelectedOption>,
}

const fn default_quantity() -> u32 {
    1
}

/// Add a product. Title and price come from the remote catalog, never from
/// the request.
#[instrument(skip(state, cart, request), fields(product_id = %request.product_id))]
pub async fn add(
    State(state): State<AppState>,
    CurrentCart(cart): CurrentCart,
    Json(request): Json<AddRequest>,
) -> Result<Json<CartView>> {
    if !(1..=MAX_ADD_QUANTITY).contains(&request.quantity) {
        return Err(AppError::invalid(
            "quantity",
            format!("must be between 1 and {MAX_ADD_QUANTITY}"),
        ));
    }

    let product = state
        .api()
        .get_product(request.product_id)
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => AppError::NotFound("Product".to_string()),
            other => other.into(),
        })?;

    if !product.available {
        return Err(AppError::BadRequest(format!(
            "{} is not available",
            product.title
        )));
    }

    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", &product.id.to_string())]),
    );

    Ok(dispatch(
        &cart,
        CartAction::Add {
            product_id: product.id,
            title: product.title,
            unit_price: product.price,
            quantity: request.quantity,
            options: request.options,
        },
    )
    .await)
}

#[derive(Debug, Deserialize)]
pub struct LineRequest {
    pub line_id: LineId,
}

async fn line_action(
    cart: &CartStore,
    line_id: LineId,
    action: CartAction,
) -> Result<Json<CartView>> {
    if !cart.snapshot().items.iter().any(|line| line.id == line_id) {
        return Err(AppError::NotFound("Cart line".to_string()));
    }
    Ok(dispatch(cart, action).await)
}

#[instrument(skip(cart, request), fields(line_id = %request.line_id))]
pub async fn increment(
    CurrentCart(cart): CurrentCart,
    Json(request): Json<LineRequest>,
) -> Result<Json<CartView>> {
    let line_id = request.line_id;
    line_action(&cart, line_id, CartAction::Increment { line_id }).await
}

/// Decrease a line's quantity; a line at 1 stays at 1.
#[instrument(skip(cart, request), fields(line_id = %request.line_id))]
pub async fn decrement(
    CurrentCart(cart): CurrentCart,
    Json(request): Json<LineRequest>,
) -> Result<Json<CartView>> {
    let line_id = request.line_id;
    line_action(&cart, line_id, CartAction::Decrement { line_id }).await
}

#[instrument(skip(cart, request), fields(line_id = %request.line_id))]
pub async fn remove(
    CurrentCart(cart): CurrentCart,
    Json(request): Json<LineRequest>,
) -> Result<Json<CartView>> {
    let line_id = request.line_id;
    line_action(&cart, line_id, CartAction::Remove { line_id }).await
}

/// Empty the cart, its coupons, and its shipping selection.
#[instrument(skip(cart))]
pub async fn clear(CurrentCart(cart): CurrentCart) -> Json<CartView> {
    dispatch(&cart, CartAction::Clear).await
}

// =============================================================================
// Shipping and address
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ShippingRequest {
    pub method: String,
    pub cost: Money,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Select a shipping method.
#[instrument(skip(cart, request), fields(method = %request.method))]
pub async fn shipping(
    CurrentCart(cart): CurrentCart,
    Json(request): Json<ShippingRequest>,
) -> Result<Json<CartView>> {
    let mut errors = FieldErrors::new();
    let method = request.method.trim();
    if method.is_empty() {
        errors.insert("method", "is required".to_string());
    }
    if request.cost.is_negative() {
        errors.insert("cost", "cannot be negative".to_string());
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let info = ShippingInfo {
        method: method.to_string(),
        cost: request.cost,
        zip: non_blank(request.zip),
        state: non_blank(request.state),
    };
    Ok(dispatch(&cart, CartAction::SetShipping(Some(info))).await)
}

/// Ask the remote whether the address qualifies for the address discount.
#[instrument(skip(state, cart, request), fields(zip = %request.zip))]
pub async fn address_check(
    State(state): State<AppState>,
    CurrentCart(cart): CurrentCart,
    Json(request): Json<AddressCheck>,
) -> Result<Json<CartView>> {
    if request.zip.trim().is_empty() {
        return Err(AppError::invalid("zip", "is required"));
    }

    let eligible = state.api().check_address_discount(&request).await?;
    Ok(dispatch(&cart, CartAction::SetAddressDiscount(eligible)).await)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// =============================================================================
// Coupons
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    pub code: String,
}

/// Apply a coupon code entered by the customer.
///
/// The coupon is looked up remotely but its eligibility is decided here, so
/// the customer gets the reason when it does not fit.
#[instrument(skip(state, cart, request))]
pub async fn apply_coupon(
    State(state): State<AppState>,
    CurrentCart(cart): CurrentCart,
    Json(request): Json<CouponRequest>,
) -> Result<Json<CartView>> {
    let code =
        CouponCode::parse(&request.code).map_err(|e| AppError::invalid("code", e.to_string()))?;

    let coupon = state.api().get_coupon(&code).await.map_err(|e| match e {
        ApiError::NotFound(_) => AppError::NotFound("Coupon".to_string()),
        other => other.into(),
    })?;

    let current = cart.snapshot();
    let applied = eligibility::evaluate(&coupon, &current.quote(), Utc::now())?;
    eligibility::check_stacking(&applied, &current.coupons)?;

    add_breadcrumb("cart", "Applied coupon", Some(&[("code", code.as_str())]));
    Ok(dispatch(&cart, CartAction::ApplyCoupon(applied)).await)
}

#[instrument(skip(cart))]
pub async fn remove_coupon(
    CurrentCart(cart): CurrentCart,
    Path(code): Path<String>,
) -> Result<Json<CartView>> {
    let code = CouponCode::parse(&code).map_err(|e| AppError::invalid("code", e.to_string()))?;
    if !cart.snapshot().coupons.iter().any(|c| c.code == code) {
        return Err(AppError::NotFound("Coupon".to_string()));
    }
    Ok(dispatch(&cart, CartAction::RemoveCoupon(code)).await)
}

/// Drop every applied coupon.
#[instrument(skip(cart))]
pub async fn clear_coupons(CurrentCart(cart): CurrentCart) -> Json<CartView> {
    dispatch(&cart, CartAction::ClearCoupons).await
}
