//! Cart actions and how they drive coupon reconciliation.

use serde::{Deserialize, Serialize};

use eastwest_core::{
    AppliedCoupon, CartLineItem, CouponCode, FirstTimeDiscount, LineId, Money, ProductId,
    SelectedOption, ShippingInfo,
};

use super::state::CartState;

/// Every way the cart can change. Handled exhaustively by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    /// Add a product, merging into a line with the same product and options.
    Add {
        product_id: ProductId,
        title: String,
        unit_price: Money,
        quantity: u32,
        options: Vec<SelectedOption>,
    },
    Increment {
        line_id: LineId,
    },
    /// Decrease a line's quantity. Never goes below 1.
    Decrement {
        line_id: LineId,
    },
    Remove {
        line_id: LineId,
    },
    /// Empty the cart, its coupons, and its shipping selection.
    Clear,
    ApplyCoupon(AppliedCoupon),
    RemoveCoupon(CouponCode),
    ClearCoupons,
    /// Result of a coupon reconciliation computed from state at `revision`.
    CouponsReconciled {
        revision: u64,
        applied: Vec<AppliedCoupon>,
    },
    SetShipping(Option<ShippingInfo>),
    SetAddressDiscount(bool),
    SetFirstTimeDiscount(FirstTimeDiscount),
    /// Restore a cart from the cart cache or a remote guest cart.
    Hydrate(PersistedCart),
}

/// Which reconciliation procedure a debounce window runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileMode {
    /// Re-check applied coupons, dropping any that no longer qualify.
    Revalidate,
    /// Revalidate, then apply the best offered auto-apply coupon.
    AutoApply,
}

impl ReconcileMode {
    /// Combine the modes of actions coalesced into one window.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Revalidate, Self::Revalidate) => Self::Revalidate,
            _ => Self::AutoApply,
        }
    }
}

/// What the auto-apply middleware does after an action changed the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Coupons are unaffected.
    None,
    /// Schedule a debounced reconciliation.
    Reconcile(ReconcileMode),
    /// Drop any pending reconciliation; the cart is empty.
    Cancel,
}

impl CartAction {
    /// Classify this action given the state it produced.
    #[must_use]
    pub fn trigger(&self, next: &CartState) -> Trigger {
        match self {
            Self::Add { .. } => Trigger::Reconcile(ReconcileMode::AutoApply),
            Self::Remove { .. } if next.items.is_empty() => Trigger::Cancel,
            Self::Clear => Trigger::Cancel,
            Self::Increment { .. }
            | Self::Decrement { .. }
            | Self::Remove { .. }
            | Self::SetShipping(_)
            | Self::SetAddressDiscount(_)
            | Self::SetFirstTimeDiscount(_) => Trigger::Reconcile(ReconcileMode::Revalidate),
            Self::Hydrate(_) if !next.coupons.is_empty() => {
                Trigger::Reconcile(ReconcileMode::Revalidate)
            }
            Self::Hydrate(_)
            | Self::ApplyCoupon(_)
            | Self::RemoveCoupon(_)
            | Self::ClearCoupons
            | Self::CouponsReconciled { .. } => Trigger::None,
        }
    }

    /// Whether the cart cache should be rewritten after this action.
    #[must_use]
    pub const fn persists(&self) -> bool {
        !matches!(
            self,
            Self::Hydrate(_) | Self::SetAddressDiscount(_) | Self::SetFirstTimeDiscount(_)
        )
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Increment { .. } => "increment",
            Self::Decrement { .. } => "decrement",
            Self::Remove { .. } => "remove",
            Self::Clear => "clear",
            Self::ApplyCoupon(_) => "apply_coupon",
            Self::RemoveCoupon(_) => "remove_coupon",
            Self::ClearCoupons => "clear_coupons",
            Self::CouponsReconciled { .. } => "coupons_reconciled",
            Self::SetShipping(_) => "set_shipping",
            Self::SetAddressDiscount(_) => "set_address_discount",
            Self::SetFirstTimeDiscount(_) => "set_first_time_discount",
            Self::Hydrate(_) => "hydrate",
        }
    }
}

/// The slice of cart state mirrored to the cart cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCart {
    #[serde(default)]
    pub items: Vec<CartLineItem>,
    #[serde(default)]
    pub coupons: Vec<AppliedCoupon>,
    #[serde(default)]
    pub shipping: Option<ShippingInfo>,
}

impl PersistedCart {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.coupons.is_empty() && self.shipping.is_none()
    }
}

impl From<&CartState> for PersistedCart {
    fn from(state: &CartState) -> Self {
        Self {
            items: state.items.clone(),
            coupons: state.coupons.clone(),
            shipping: state.shipping.clone(),
        }
    }
}
