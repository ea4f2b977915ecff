//! In-memory cart state and its reducer.

use tracing::debug;

use eastwest_core::{AppliedCoupon, CartLineItem, FirstTimeDiscount, LineId, Money, ShippingInfo};

use super::action::CartAction;
use crate::api::{CartQuote, QuoteLine};

/// One visitor's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    pub items: Vec<CartLineItem>,
    pub coupons: Vec<AppliedCoupon>,
    pub shipping: Option<ShippingInfo>,
    pub address_discount: bool,
    pub first_time_discount: FirstTimeDiscount,
    /// Bumped on every change; never persisted.
    pub revision: u64,
}

/// Outcome of reducing one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    Unchanged,
    /// A reconciliation result computed from an older revision; ignored.
    Stale,
}

impl CartState {
    /// Apply an action in place.
    pub fn apply(&mut self, action: &CartAction) -> Transition {
        let changed = match action {
            CartAction::Add {
                product_id,
                title,
                unit_price,
                quantity,
                options,
            } => {
                let quantity = (*quantity).max(1);
                if let Some(line) = self
                    .items
                    .iter_mut()
                    .find(|line| line.is_same_configuration(*product_id, options))
                {
                    line.quantity = line.quantity.saturating_add(quantity);
                    line.unit_price = *unit_price;
                } else {
                    self.items.push(CartLineItem {
                        id: LineId::generate(),
                        product_id: *product_id,
                        title: title.clone(),
                        quantity,
                        unit_price: *unit_price,
                        options: options.clone(),
                    });
                }
                true
            }
            CartAction::Increment { line_id } => self.line_mut(*line_id).is_some_and(|line| {
                line.quantity = line.quantity.saturating_add(1);
                true
            }),
            CartAction::Decrement { line_id } => self.line_mut(*line_id).is_some_and(|line| {
                if line.quantity > 1 {
                    line.quantity -= 1;
                    true
                } else {
                    false
                }
            }),
            CartAction::Remove { line_id } => {
                let before = self.items.len();
                self.items.retain(|line| line.id != *line_id);
                let removed = self.items.len() != before;
                if removed && self.items.is_empty() {
                    self.coupons.clear();
                }
                removed
            }
            CartAction::Clear => {
                let changed = !self.items.is_empty()
                    || !self.coupons.is_empty()
                    || self.shipping.is_some();
                self.items.clear();
                self.coupons.clear();
                self.shipping = None;
                changed
            }
            CartAction::ApplyCoupon(coupon) => {
                if let Some(existing) = self.coupons.iter_mut().find(|c| c.code == coupon.code) {
                    if *existing == *coupon {
                        false
                    } else {
                        *existing = coupon.clone();
                        true
                    }
                } else {
                    self.coupons.push(coupon.clone());
                    true
                }
            }
            CartAction::RemoveCoupon(code) => {
                let before = self.coupons.len();
                self.coupons.retain(|c| c.code != *code);
                self.coupons.len() != before
            }
            CartAction::ClearCoupons => {
                let changed = !self.coupons.is_empty();
                self.coupons.clear();
                changed
            }
            CartAction::CouponsReconciled { revision, applied } => {
                if *revision != self.revision {
                    debug!(
                        computed_at = revision,
                        current = self.revision,
                        "Discarding stale coupon reconciliation"
                    );
                    return Transition::Stale;
                }
                if self.coupons == *applied {
                    false
                } else {
                    self.coupons.clone_from(applied);
                    true
                }
            }
            CartAction::SetShipping(shipping) => replace(&mut self.shipping, shipping.clone()),
            CartAction::SetAddressDiscount(eligible) => {
                replace(&mut self.address_discount, *eligible)
            }
            CartAction::SetFirstTimeDiscount(discount) => {
                replace(&mut self.first_time_discount, *discount)
            }
            CartAction::Hydrate(persisted) => {
                self.items.clone_from(&persisted.items);
                self.coupons = if persisted.items.is_empty() {
                    Vec::new()
                } else {
                    persisted.coupons.clone()
                };
                self.shipping.clone_from(&persisted.shipping);
                true
            }
        };

        if changed {
            self.revision = self.revision.wrapping_add(1);
            Transition::Changed
        } else {
            Transition::Unchanged
        }
    }

    fn line_mut(&mut self, line_id: LineId) -> Option<&mut CartLineItem> {
        self.items.iter_mut().find(|line| line.id == line_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |count, line| count.saturating_add(line.quantity))
    }

    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartLineItem::line_total).sum()
    }

    #[must_use]
    pub fn shipping_cost(&self) -> Money {
        self.shipping.as_ref().map_or(Money::ZERO, |s| s.cost)
    }

    /// Sum of applied coupon amounts, capped at the subtotal.
    #[must_use]
    pub fn discount_total(&self) -> Money {
        let total: Money = self.coupons.iter().map(|c| c.amount).sum();
        total.min(self.subtotal())
    }

    #[must_use]
    pub fn first_time_discount_amount(&self) -> Money {
        self.first_time_discount.amount_for(self.subtotal())
    }

    /// Amount due: discounted subtotal (floored at zero) plus shipping.
    #[must_use]
    pub fn total(&self) -> Money {
        self.subtotal()
            .saturating_sub(self.discount_total())
            .saturating_sub(self.first_time_discount_amount())
            + self.shipping_cost()
    }

    /// The facts coupon eligibility is evaluated against.
    #[must_use]
    pub fn quote(&self) -> CartQuote {
        CartQuote {
            lines: self
                .items
                .iter()
                .map(|line| QuoteLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            subtotal: self.subtotal(),
            shipping_cost: self.shipping_cost(),
            address_discount: self.address_discount,
            first_time_discount: self.first_time_discount.eligible,
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
