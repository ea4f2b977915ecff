//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                     - Liveness
//!
//! # Cart
//! GET    /cart                       - Cart view with totals and reconcile status
//! POST   /cart/add                   - Add a product (price from the remote catalog)
//! POST   /cart/increment             - Increment a line
//! POST   /cart/decrement             - Decrement a line (floors at 1)
//! POST   /cart/remove                - Remove a line
//! POST   /cart/clear                 - Empty the cart
//! POST   /cart/shipping              - Select shipping
//! POST   /cart/address-check         - Check address discount eligibility
//! POST   /cart/coupons               - Apply a coupon code
//! DELETE /cart/coupons               - Remove all coupons
//! DELETE /cart/coupons/{code}        - Remove a coupon
//! POST   /cart/guest                 - Save cart remotely under an email
//! GET    /cart/guest?email=          - Restore a saved cart
//! DELETE /cart/guest?email=          - Delete a saved cart
//!
//! # Checkout
//! POST   /checkout/tax               - Totals with tax
//! POST   /checkout/payment-intent    - Create payment intent
//! POST   /checkout/orders            - Place order (clears the cart)
//!
//! # Orders
//! GET    /orders/{id}                - Order detail (requires auth)
//! GET    /orders/track               - Public tracking by number and email
//!
//! # Auth
//! POST   /auth/sign-in               - Sign in (rate limited)
//! POST   /auth/sign-out              - Sign out
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod guest_cart;
pub mod orders;

use axum::{
    Json, Router, middleware,
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::middleware::{
    auth_rate_limiter, request_id_middleware, request_span, security_headers_middleware,
};
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/increment", post(cart::increment))
        .route("/decrement", post(cart::decrement))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/shipping", post(cart::shipping))
        .route("/address-check", post(cart::address_check))
        .route(
            "/coupons",
            post(cart::apply_coupon).delete(cart::clear_coupons),
        )
        .route("/coupons/{code}", delete(cart::remove_coupon))
        .route(
            "/guest",
            get(guest_cart::restore)
                .post(guest_cart::save)
                .delete(guest_cart::delete),
        )
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/tax", post(checkout::tax))
        .route("/payment-intent", post(checkout::payment_intent))
        .route("/orders", post(checkout::place_order))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/track", get(orders::track))
        .route("/{id}", get(orders::show))
}

/// Create the auth routes router. Only sign-in is rate limited.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/sign-in", post(auth::sign_in))
        .route_layer(auth_rate_limiter())
        .route("/sign-out", post(auth::sign_out))
}

/// Liveness check.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/orders", order_routes())
        .nest("/auth", auth_routes())
}

/// The storefront with its middleware stack, ready to serve.
///
/// Sentry layers are added by the binary.
pub fn app<S>(state: AppState, sessions: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    routes()
        .layer(sessions)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(request_span::<axum::body::Body>))
        .with_state(state)
}
