//! Cart line items and the order-adjacent values the cart depends on.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::id::ProductId;
use super::money::Money;

/// Identifier for one line in a cart.
///
/// Lines are keyed locally; the remote API never sees line ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(Uuid);

impl LineId {
    /// Generate a fresh random line id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LineId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A chosen product option, e.g. `Finish: Black Powder Coat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

/// One line of a cart: a product in a specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub id: LineId,
    pub product_id: ProductId,
    pub title: String,
    /// Always at least 1.
    pub quantity: u32,
    /// Unit price as quoted by the remote catalog when the line was added.
    pub unit_price: Money,
    #[serde(default)]
    pub options: Vec<SelectedOption>,
}

impl CartLineItem {
    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }

    /// Whether this line holds `product_id` configured with `options`.
    ///
    /// Option order does not matter.
    #[must_use]
    pub fn is_same_configuration(&self, product_id: ProductId, options: &[SelectedOption]) -> bool {
        self.product_id == product_id
            && self.options.len() == options.len()
            && options.iter().all(|o| self.options.contains(o))
    }
}

/// Shipping choice for the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    /// Carrier/service label shown to the customer.
    pub method: String,
    pub cost: Money,
    pub zip: Option<String>,
    pub state: Option<String>,
}

/// Server-asserted discount for a customer's first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirstTimeDiscount {
    pub eligible: bool,
    /// Percentage off the subtotal, e.g. `10` for 10%.
    pub percentage: Decimal,
}

impl FirstTimeDiscount {
    /// Discount amount for a given subtotal (zero when not eligible).
    #[must_use]
    pub fn amount_for(&self, subtotal: Money) -> Money {
        if self.eligible {
            subtotal.percent(self.percentage)
        } else {
            Money::ZERO
        }
    }
}
