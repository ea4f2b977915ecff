//! Live cart stores, keyed by cart key.

use std::sync::Arc;

use moka::future::Cache;
use tracing::{debug, warn};

use super::CartKey;
use super::action::CartAction;
use super::auto_apply::AutoApply;
use super::storage::CartStorage;
use super::store::CartStore;
use crate::api::CouponService;
use crate::config::CartConfig;

/// Keeps recently used cart stores in memory.
///
/// A store evicted for idleness is rebuilt from the cart cache on next use.
/// Evicted stores are retired first, so a request still holding one cannot
/// overwrite what its replacement writes.
#[derive(Clone)]
pub struct CartRegistry {
    stores: Cache<CartKey, CartStore>,
    storage: Arc<dyn CartStorage>,
    coupons: Arc<dyn CouponService>,
    config: CartConfig,
}

impl CartRegistry {
    #[must_use]
    pub fn new(
        storage: Arc<dyn CartStorage>,
        coupons: Arc<dyn CouponService>,
        config: CartConfig,
    ) -> Self {
        let stores = Cache::builder()
            .max_capacity(config.store_capacity)
            .time_to_idle(config.store_idle)
            .eviction_listener(|_key, store: CartStore, cause| {
                debug!(cart = %store.key(), ?cause, "Cart store evicted");
                store.retire();
            })
            .build();

        Self {
            stores,
            storage,
            coupons,
            config,
        }
    }

    /// The live store for a key, hydrating it from the cart cache if needed.
    pub async fn get(&self, key: CartKey) -> CartStore {
        self.stores.get_with(key, self.open(key)).await
    }

    async fn open(&self, key: CartKey) -> CartStore {
        let auto_apply = AutoApply::new(Arc::clone(&self.coupons), self.config.coupon_debounce);
        let store = CartStore::new(key, Arc::clone(&self.storage), Some(auto_apply));

        match self.storage.load(key).await {
            Ok(Some(persisted)) => {
                debug!(cart = %key, items = persisted.items.len(), "Hydrating cart from cache");
                store.dispatch(CartAction::Hydrate(persisted)).await;
            }
            Ok(None) => {}
            Err(e) => warn!(cart = %key, error = %e, "Failed to load cart cache, starting empty"),
        }

        store
    }

    /// Drop the live store for a key. The cart cache is left alone.
    pub async fn forget(&self, key: CartKey) {
        self.stores.invalidate(&key).await;
    }
}
