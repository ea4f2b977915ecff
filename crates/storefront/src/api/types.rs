//! Wire types for the remote storefront API.
//!
//! The remote service owns these schemas; field names follow its JSON.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use eastwest_core::{
    CartLineItem, Coupon, CouponCode, CustomerId, Email, LineId, Money, OrderId, OrderStatus,
    PaymentStatus, ProductId, SelectedOption, ShippingInfo,
};

// =============================================================================
// Catalog
// =============================================================================

/// A product as priced by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub price: Money,
    #[serde(default = "default_true")]
    pub available: bool,
}

const fn default_true() -> bool {
    true
}

// =============================================================================
// Coupons
// =============================================================================

/// One cart line as sent for coupon evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// The cart facts the coupon service evaluates against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartQuote {
    pub lines: Vec<QuoteLine>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub address_discount: bool,
    pub first_time_discount: bool,
}

impl CartQuote {
    /// Subtotal of the lines whose product satisfies `covers`.
    pub fn subtotal_where(&self, covers: impl Fn(ProductId) -> bool) -> Money {
        self.lines
            .iter()
            .filter(|line| covers(line.product_id))
            .map(|line| line.unit_price.times(line.quantity))
            .sum()
    }
}

/// Response envelope for `coupons/eligible`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CouponList {
    #[serde(default)]
    pub coupons: Vec<Coupon>,
}

// =============================================================================
// Shipping, tax, discounts
// =============================================================================

/// Address fields used for the address-discount check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressCheck {
    pub zip: String,
    pub state: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "US".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDiscount {
    pub eligible: bool,
}

/// A postal address for tax, payment, and orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRequest {
    pub address: Address,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxQuote {
    /// Combined rate as a percentage.
    pub rate: Decimal,
    pub amount: Money,
}

// =============================================================================
// Guest carts
// =============================================================================

/// A cart saved remotely under an email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCart {
    pub email: Email,
    pub items: Vec<GuestCartLine>,
    #[serde(default)]
    pub coupons: Vec<CouponCode>,
    #[serde(default)]
    pub shipping: Option<ShippingInfo>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Guest cart line; local line ids are not stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCartLine {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub options: Vec<SelectedOption>,
}

impl From<&CartLineItem> for GuestCartLine {
    fn from(line: &CartLineItem) -> Self {
        Self {
            product_id: line.product_id,
            title: line.title.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            options: line.options.clone(),
        }
    }
}

impl GuestCartLine {
    /// Turn a remote line back into a local cart line with a fresh id.
    #[must_use]
    pub fn into_line_item(self) -> CartLineItem {
        CartLineItem {
            id: LineId::generate(),
            product_id: self.product_id,
            title: self.title,
            quantity: self.quantity.max(1),
            unit_price: self.unit_price,
            options: self.options,
        }
    }
}

// =============================================================================
// Payments and orders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount: Money,
    pub email: Email,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Handed to the payment widget; never logged.
    pub client_secret: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub options: Vec<SelectedOption>,
}

impl From<&CartLineItem> for OrderLine {
    fn from(line: &CartLineItem) -> Self {
        Self {
            product_id: line.product_id,
            title: line.title.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            options: line.options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub email: Email,
    pub address: Address,
    pub items: Vec<OrderLine>,
    pub coupons: Vec<CouponCode>,
    pub shipping: Option<ShippingInfo>,
    pub payment_intent_id: String,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub number: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    pub email: Email,
    #[serde(default)]
    pub items: Vec<OrderLine>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub at: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTracking {
    pub number: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub events: Vec<TrackingEvent>,
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Serialize)]
pub(crate) struct SignInRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Customer summary returned with auth tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub id: CustomerId,
    pub email: Email,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// Access and refresh tokens for the remote API.
///
/// Stored in the visitor session. Implements `Debug` manually to redact the tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerSummary>,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("customer", &self.customer)
            .finish()
    }
}
