//! Coupon eligibility rules.
//!
//! Pure functions over a [`CartQuote`]; the remote service decides which
//! coupons exist and are offered, the storefront decides whether each one
//! still fits the cart it is applied to.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use eastwest_core::{AppliedCoupon, Coupon, DiscountKind, EligibilitySnapshot, Money};

use super::action::ReconcileMode;
use crate::api::CartQuote;

/// Why a coupon cannot be applied to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("cart is empty")]
    EmptyCart,

    #[error("coupon has expired")]
    Expired,

    #[error("cart subtotal is below the {minimum} minimum")]
    BelowMinimum { minimum: Money },

    #[error("no items in the cart qualify for this coupon")]
    NoApplicableProducts,

    #[error("coupon cannot be combined with the first-time discount")]
    ExcludedByFirstTimeDiscount,

    #[error("coupon cannot be combined with the coupons already applied")]
    NotStackable,

    #[error("coupon is no longer offered")]
    Withdrawn,
}

/// Check a coupon against a cart and compute its discount.
///
/// The minimum is checked against the full subtotal; the discount itself only
/// covers the lines the coupon applies to.
///
/// # Errors
///
/// Returns the first [`Ineligible`] reason that applies.
pub fn evaluate(
    coupon: &Coupon,
    quote: &CartQuote,
    now: DateTime<Utc>,
) -> Result<AppliedCoupon, Ineligible> {
    if quote.lines.is_empty() {
        return Err(Ineligible::EmptyCart);
    }
    if coupon.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(Ineligible::Expired);
    }
    if let Some(minimum) = coupon.minimum_amount
        && quote.subtotal < minimum
    {
        return Err(Ineligible::BelowMinimum { minimum });
    }
    if coupon.excludes_first_time_discount && quote.first_time_discount {
        return Err(Ineligible::ExcludedByFirstTimeDiscount);
    }

    let eligible_subtotal = quote.subtotal_where(|id| coupon.applies_to(id));
    if eligible_subtotal.is_zero() {
        return Err(Ineligible::NoApplicableProducts);
    }

    let amount = match coupon.discount {
        DiscountKind::Percentage(percentage) => eligible_subtotal.percent(percentage),
        DiscountKind::Fixed(value) => value.min(eligible_subtotal),
    };

    Ok(AppliedCoupon {
        code: coupon.code.clone(),
        discount: coupon.discount,
        amount: if amount.is_negative() { Money::ZERO } else { amount },
        stackable: coupon.stackable,
        snapshot: EligibilitySnapshot {
            subtotal: quote.subtotal,
            eligible_subtotal,
            shipping_cost: quote.shipping_cost,
            address_discount: quote.address_discount,
            first_time_discount: quote.first_time_discount,
            evaluated_at: now,
        },
    })
}

/// Whether a coupon can join the already-applied set.
///
/// A coupon with the same code replaces the applied one and is not a conflict.
///
/// # Errors
///
/// Returns [`Ineligible::NotStackable`] on conflict.
pub fn check_stacking(
    candidate: &AppliedCoupon,
    applied: &[AppliedCoupon],
) -> Result<(), Ineligible> {
    let mut others = applied.iter().filter(|a| a.code != candidate.code).peekable();
    if others.peek().is_none() {
        return Ok(());
    }
    if candidate.stackable && others.all(|a| a.stackable) {
        Ok(())
    } else {
        Err(Ineligible::NotStackable)
    }
}

/// Recompute the applied coupon set for a cart.
///
/// Revalidation keeps an applied coupon only while the remote still offers it
/// and it still qualifies, refreshing its amount. Auto apply then adds the
/// best offered `auto_apply` coupon (largest discount, ties to the lower
/// code) when it stacks with what is left.
#[must_use]
pub fn reconcile(
    applied: &[AppliedCoupon],
    offered: &[Coupon],
    quote: &CartQuote,
    mode: ReconcileMode,
    now: DateTime<Utc>,
) -> Vec<AppliedCoupon> {
    let mut kept: Vec<AppliedCoupon> = Vec::with_capacity(applied.len() + 1);
    for current in applied {
        let result = offered
            .iter()
            .find(|coupon| coupon.code == current.code)
            .ok_or(Ineligible::Withdrawn)
            .and_then(|coupon| evaluate(coupon, quote, now))
            .and_then(|fresh| check_stacking(&fresh, &kept).map(|()| fresh));
        match result {
            Ok(fresh) => kept.push(fresh),
            Err(reason) => debug!(code = %current.code, %reason, "Dropping coupon"),
        }
    }

    if mode == ReconcileMode::AutoApply {
        let best = offered
            .iter()
            .filter(|coupon| coupon.auto_apply && !kept.iter().any(|k| k.code == coupon.code))
            .filter_map(|coupon| evaluate(coupon, quote, now).ok())
            .max_by(|a, b| a.amount.cmp(&b.amount).then_with(|| b.code.cmp(&a.code)));

        if let Some(best) = best {
            match check_stacking(&best, &kept) {
                Ok(()) => {
                    debug!(code = %best.code, amount = %best.amount, "Auto-applying coupon");
                    kept.push(best);
                }
                Err(reason) => debug!(code = %best.code, %reason, "Skipping auto-apply"),
            }
        }
    }

    kept
}
