//! Core types for the storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod coupon;
pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use cart::{CartLineItem, FirstTimeDiscount, LineId, SelectedOption, ShippingInfo};
pub use coupon::{
    AppliedCoupon, Coupon, CouponCode, CouponCodeError, DiscountKind, EligibilitySnapshot,
};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::Money;
pub use status::*;
