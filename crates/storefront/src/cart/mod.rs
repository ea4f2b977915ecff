//! Cart state store and coupon synchronization.
//!
//! # Architecture
//!
//! - [`CartStore`] holds one visitor's cart in a `tokio::sync::watch` channel
//!   and mutates it only through [`CartAction`]s run by a pure reducer
//! - [`AutoApply`] watches dispatched actions and, after a debounce window,
//!   reconciles applied coupons against what the remote service offers
//! - [`CartStorage`] mirrors products, coupons, and shipping to the cart cache
//!   so a cart survives restarts; the cache is never the source of truth
//! - [`CartRegistry`] keeps live stores in memory, hydrating them from the
//!   cart cache on first use
//!
//! Every state change bumps a revision counter. Reconciliation results carry
//! the revision they were computed from and are discarded if the cart has
//! moved on in the meantime.

mod action;
mod auto_apply;
mod debounce;
pub mod eligibility;
mod registry;
mod state;
mod storage;
mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use action::{CartAction, PersistedCart, ReconcileMode, Trigger};
pub use auto_apply::{AutoApply, ReconcileStatus};
pub use debounce::Debouncer;
pub use registry::CartRegistry;
pub use state::{CartState, Transition};
pub use storage::{CartStorage, MemoryCartStorage, PgCartStorage};
pub use store::CartStore;

/// Identifies one visitor's cart. Kept in the session under `cart_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartKey(Uuid);

impl CartKey {
    /// Generate a new random cart key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CartKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}
