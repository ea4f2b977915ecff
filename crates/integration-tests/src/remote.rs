//! In-process stand-in for the remote storefront REST API.
//!
//! Serves the endpoints the storefront calls, from in-memory fixtures, and
//! records what it was asked so tests can assert on call counts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, header::COOKIE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use eastwest_core::{
    Coupon, CouponCode, CustomerId, DiscountKind, Email, Money, OrderId, OrderStatus,
    PaymentStatus, ProductId,
};
use eastwest_storefront::api::{
    AddressCheck, AddressDiscount, AuthTokens, CartQuote, CustomerSummary, GuestCart, Order,
    OrderRequest, OrderTracking, PaymentIntent, PaymentIntentRequest, Product,
    TaxQuote, TaxRequest,
};

/// Email and password the stub accepts.
pub const CUSTOMER_EMAIL: &str = "rider@example.com";
pub const CUSTOMER_PASSWORD: &str = "correct-horse";
const REFRESH_TOKEN: &str = "refresh-token";

/// Tax rate charged by the stub, in percent.
pub const TAX_RATE: u32 = 5;

#[derive(Default)]
struct RemoteState {
    products: Mutex<HashMap<ProductId, Product>>,
    coupons: Mutex<Vec<Coupon>>,
    guest_carts: Mutex<HashMap<String, GuestCart>>,
    orders: Mutex<Vec<OrderRequest>>,
    access_token: Mutex<String>,
    tokens_issued: AtomicUsize,
    eligible_calls: AtomicUsize,
    fail_eligible: AtomicBool,
    refresh_disabled: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the stub API and its fixtures.
#[derive(Clone, Default)]
pub struct StubRemote {
    state: Arc<RemoteState>,
}

fn product(id: i32, title: &str, cents: i64, available: bool) -> Product {
    Product {
        id: ProductId::new(id),
        title: title.to_string(),
        price: Money::from_cents(cents),
        available,
    }
}

/// A fixed-amount coupon.
#[must_use]
pub fn fixed_coupon(
    code: &str,
    off_cents: i64,
    minimum_cents: Option<i64>,
    auto_apply: bool,
) -> Coupon {
    Coupon {
        code: CouponCode::parse(code).expect("valid coupon code"),
        title: format!("{code} promotion"),
        discount: DiscountKind::Fixed(Money::from_cents(off_cents)),
        minimum_amount: minimum_cents.map(Money::from_cents),
        applicable_products: vec![],
        stackable: false,
        auto_apply,
        excludes_first_time_discount: false,
        expires_at: None,
    }
}

/// Catalog fixture ids.
pub mod products {
    /// Recovery strap, $30.00.
    pub const STRAP: i32 = 1;
    /// Shackle set, $20.00.
    pub const SHACKLES: i32 = 2;
    /// Roof rack, $250.00.
    pub const ROOF_RACK: i32 = 3;
    /// Lift kit, not available.
    pub const LIFT_KIT: i32 = 4;
}

impl StubRemote {
    /// A stub with the default catalog and no coupons.
    #[must_use]
    pub fn new() -> Self {
        let remote = Self::default();
        {
            let mut catalog = lock(&remote.state.products);
            for p in [
                product(products::STRAP, "Recovery Strap", 3_000, true),
                product(products::SHACKLES, "Shackle Set", 2_000, true),
                product(products::ROOF_RACK, "Roof Rack", 25_000, true),
                product(products::LIFT_KIT, "Lift Kit", 90_000, false),
            ] {
                catalog.insert(p.id, p);
            }
        }
        *lock(&remote.state.access_token) = "access-0".to_string();
        remote
    }

    pub fn add_coupon(&self, coupon: Coupon) {
        lock(&self.state.coupons).push(coupon);
    }

    /// Number of `coupons/eligible` calls received.
    #[must_use]
    pub fn eligible_calls(&self) -> usize {
        self.state.eligible_calls.load(Ordering::SeqCst)
    }

    /// Make `coupons/eligible` answer 500.
    pub fn fail_eligible(&self, fail: bool) {
        self.state.fail_eligible.store(fail, Ordering::SeqCst);
    }

    /// Revoke the current access token; the refresh token stays valid.
    pub fn expire_access_token(&self) {
        *lock(&self.state.access_token) = "revoked".to_string();
    }

    /// Make `auth/refresh` reject every refresh token.
    pub fn disable_refresh(&self) {
        self.state.refresh_disabled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn orders(&self) -> Vec<OrderRequest> {
        lock(&self.state.orders).clone()
    }

    #[must_use]
    pub fn guest_cart(&self, email: &str) -> Option<GuestCart> {
        lock(&self.state.guest_carts).get(email).cloned()
    }

    /// Serve the stub on an ephemeral port and return its API base URL.
    pub async fn spawn(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub remote");
        let addr = listener.local_addr().expect("stub remote address");
        let app = Router::new().nest("/api", self.router());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub remote server");
        });
        format!("http://{addr}/api/")
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/products/{id}", get(get_product))
            .route("/coupons/eligible", post(eligible_coupons))
            .route("/coupons/{code}", get(get_coupon))
            .route("/shipping/address-discount", post(address_discount))
            .route("/discounts/first-time", get(first_time_discount))
            .route("/tax/calculate", post(calculate_tax))
            .route("/guest-carts", post(save_guest_cart))
            .route(
                "/guest-carts/{email}",
                get(get_guest_cart)
                    .put(update_guest_cart)
                    .delete(delete_guest_cart),
            )
            .route("/payments/intents", post(create_payment_intent))
            .route("/orders", post(create_order))
            .route("/orders/track", get(track_order))
            .route("/orders/{id}", get(get_order))
            .route("/auth/sign-in", post(sign_in))
            .route("/auth/refresh", post(refresh))
            .with_state(self.clone())
    }

    /// Both the bearer header and the `token` cookie must carry the current token.
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let current = lock(&self.state.access_token).clone();
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let cookie = headers
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("token="));
        bearer == Some(current.as_str()) && cookie == Some(current.as_str())
    }

    fn issue_tokens(&self) -> AuthTokens {
        let n = self.state.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access_token = format!("access-{n}");
        *lock(&self.state.access_token) = access_token.clone();
        AuthTokens {
            access_token,
            refresh_token: Some(REFRESH_TOKEN.to_string()),
            customer: None,
        }
    }
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": format!("{what} not found") })),
    )
        .into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "invalid token" })),
    )
        .into_response()
}

async fn get_product(State(remote): State<StubRemote>, Path(id): Path<i32>) -> Response {
    lock(&remote.state.products)
        .get(&ProductId::new(id))
        .cloned()
        .map_or_else(|| not_found("Product"), |p| Json(p).into_response())
}

/// Offers every unexpired coupon whose minimum the quote meets.
async fn eligible_coupons(
    State(remote): State<StubRemote>,
    Json(quote): Json<CartQuote>,
) -> Response {
    remote.state.eligible_calls.fetch_add(1, Ordering::SeqCst);
    if remote.state.fail_eligible.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "coupon service unavailable" })),
        )
            .into_response();
    }

    let now = Utc::now();
    let coupons: Vec<Coupon> = lock(&remote.state.coupons)
        .iter()
        .filter(|c| c.minimum_amount.is_none_or(|min| quote.subtotal >= min))
        .filter(|c| c.expires_at.is_none_or(|at| at > now))
        .cloned()
        .collect();
    Json(json!({ "coupons": coupons })).into_response()
}

async fn get_coupon(State(remote): State<StubRemote>, Path(code): Path<String>) -> Response {
    lock(&remote.state.coupons)
        .iter()
        .find(|c| c.code.as_str() == code)
        .cloned()
        .map_or_else(|| not_found("Coupon"), |c| Json(c).into_response())
}

async fn address_discount(Json(address): Json<AddressCheck>) -> Json<AddressDiscount> {
    Json(AddressDiscount {
        eligible: address.state.eq_ignore_ascii_case("UT"),
    })
}

async fn first_time_discount(State(remote): State<StubRemote>, headers: HeaderMap) -> Response {
    if !remote.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "eligible": true, "percentage": "10" })).into_response()
}

async fn calculate_tax(Json(request): Json<TaxRequest>) -> Json<TaxQuote> {
    let taxable = request.subtotal.saturating_sub(request.discount);
    Json(TaxQuote {
        rate: Decimal::from(TAX_RATE),
        amount: taxable.percent(Decimal::from(TAX_RATE)),
    })
}

async fn save_guest_cart(
    State(remote): State<StubRemote>,
    Json(mut cart): Json<GuestCart>,
) -> Json<GuestCart> {
    cart.updated_at = Some(Utc::now());
    lock(&remote.state.guest_carts).insert(cart.email.to_string(), cart.clone());
    Json(cart)
}

async fn get_guest_cart(State(remote): State<StubRemote>, Path(email): Path<String>) -> Response {
    lock(&remote.state.guest_carts)
        .get(&email)
        .cloned()
        .map_or_else(|| not_found("Guest cart"), |c| Json(c).into_response())
}

async fn update_guest_cart(
    State(remote): State<StubRemote>,
    Path(email): Path<String>,
    Json(mut cart): Json<GuestCart>,
) -> Response {
    let mut carts = lock(&remote.state.guest_carts);
    let Some(existing) = carts.get_mut(&email) else {
        return not_found("Guest cart");
    };
    cart.updated_at = Some(Utc::now());
    existing.clone_from(&cart);
    Json(cart).into_response()
}

async fn delete_guest_cart(
    State(remote): State<StubRemote>,
    Path(email): Path<String>,
) -> Response {
    match lock(&remote.state.guest_carts).remove(&email) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found("Guest cart"),
    }
}

async fn create_payment_intent(Json(request): Json<PaymentIntentRequest>) -> Json<PaymentIntent> {
    Json(PaymentIntent {
        id: "pi_test_1".to_string(),
        client_secret: "pi_test_1_secret".to_string(),
        amount: request.amount,
    })
}

fn order_from(id: usize, request: &OrderRequest) -> Order {
    Order {
        id: OrderId::new(i32::try_from(id).unwrap_or(i32::MAX)),
        number: format!("EWO-{}", 1000 + id),
        status: OrderStatus::Processing,
        payment_status: PaymentStatus::Paid,
        email: request.email.clone(),
        items: request.items.clone(),
        total: request.total,
        created_at: Utc::now(),
    }
}

async fn create_order(
    State(remote): State<StubRemote>,
    Json(request): Json<OrderRequest>,
) -> (StatusCode, Json<Order>) {
    let mut orders = lock(&remote.state.orders);
    orders.push(request.clone());
    (StatusCode::CREATED, Json(order_from(orders.len(), &request)))
}

async fn get_order(
    State(remote): State<StubRemote>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    if !remote.authorized(&headers) {
        return unauthorized();
    }
    let orders = lock(&remote.state.orders);
    usize::try_from(id)
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| orders.get(index).map(|request| order_from(index + 1, request)))
        .map_or_else(|| not_found("Order"), |order| Json(order).into_response())
}

#[derive(Deserialize)]
struct TrackQuery {
    number: String,
    email: String,
}

async fn track_order(
    State(remote): State<StubRemote>,
    Query(query): Query<TrackQuery>,
) -> Response {
    let orders = lock(&remote.state.orders);
    let found = orders.iter().enumerate().find(|(index, request)| {
        format!("EWO-{}", 1001 + index) == query.number && request.email.as_str() == query.email
    });
    match found {
        Some(_) => Json(OrderTracking {
            number: query.number,
            status: OrderStatus::Processing,
            carrier: Some("UPS".to_string()),
            tracking_number: Some("1Z999".to_string()),
            events: vec![],
        })
        .into_response(),
        None => not_found("Order"),
    }
}

#[derive(Deserialize)]
struct SignInBody {
    email: String,
    password: String,
}

async fn sign_in(State(remote): State<StubRemote>, Json(body): Json<SignInBody>) -> Response {
    if body.email != CUSTOMER_EMAIL || body.password != CUSTOMER_PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "invalid credentials" })),
        )
            .into_response();
    }
    let mut tokens = remote.issue_tokens();
    tokens.customer = Some(CustomerSummary {
        id: CustomerId::new(77),
        email: Email::parse(CUSTOMER_EMAIL).expect("valid fixture email"),
        first_name: Some("Rider".to_string()),
    });
    Json(tokens).into_response()
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(State(remote): State<StubRemote>, Json(body): Json<RefreshBody>) -> Response {
    if remote.state.refresh_disabled.load(Ordering::SeqCst) || body.refresh_token != REFRESH_TOKEN
    {
        return unauthorized();
    }
    Json(remote.issue_tokens()).into_response()
}
