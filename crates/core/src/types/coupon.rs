//! Coupon definitions and applied-coupon records.

use core::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::money::Money;

/// Errors that can occur when parsing a [`CouponCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CouponCodeError {
    /// The input is empty after trimming.
    #[error("coupon code cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("coupon code must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character other than letters, digits, `-` or `_`.
    #[error("coupon code contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A normalized coupon code.
///
/// Codes are case-insensitive: parsing trims surrounding whitespace and
/// uppercases, so `" save10 "` and `"SAVE10"` are the same code.
///
/// ```
/// use eastwest_core::CouponCode;
///
/// assert_eq!(CouponCode::parse(" trail-15 ").unwrap().as_str(), "TRAIL-15");
/// assert!(CouponCode::parse("").is_err());
/// assert!(CouponCode::parse("10% OFF").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    /// Maximum length of a coupon code.
    pub const MAX_LENGTH: usize = 32;

    /// Parse and normalize a coupon code.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, longer than
    /// [`Self::MAX_LENGTH`], or contains characters outside `[A-Za-z0-9_-]`.
    pub fn parse(s: &str) -> Result<Self, CouponCodeError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CouponCodeError::Empty);
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(CouponCodeError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(CouponCodeError::InvalidCharacter(c));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self {
        code.0
    }
}

/// How a coupon discounts the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percent off the eligible subtotal, e.g. `15` for 15%.
    Percentage(Decimal),
    /// Flat amount off, capped at the eligible subtotal.
    Fixed(Money),
}

/// A coupon as offered by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: CouponCode,
    #[serde(default)]
    pub title: String,
    pub discount: DiscountKind,
    /// Minimum cart subtotal for the coupon to apply.
    #[serde(default)]
    pub minimum_amount: Option<Money>,
    /// Products the discount applies to; empty means every product.
    #[serde(default)]
    pub applicable_products: Vec<ProductId>,
    /// Whether the coupon may be combined with other coupons.
    #[serde(default)]
    pub stackable: bool,
    /// Whether the coupon may be applied without the customer entering it.
    #[serde(default)]
    pub auto_apply: bool,
    /// Whether the coupon is void while a first-time discount is active.
    #[serde(default)]
    pub excludes_first_time_discount: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Coupon {
    /// Whether the coupon's discount covers `product_id`.
    #[must_use]
    pub fn applies_to(&self, product_id: ProductId) -> bool {
        self.applicable_products.is_empty() || self.applicable_products.contains(&product_id)
    }
}

/// Cart conditions a coupon was evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilitySnapshot {
    pub subtotal: Money,
    /// Subtotal of the lines the coupon covers.
    pub eligible_subtotal: Money,
    pub shipping_cost: Money,
    pub address_discount: bool,
    pub first_time_discount: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// A coupon currently applied to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: CouponCode,
    pub discount: DiscountKind,
    /// Discount amount computed at evaluation time.
    pub amount: Money,
    pub stackable: bool,
    pub snapshot: EligibilitySnapshot,
}
