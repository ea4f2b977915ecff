//! Per-visitor cart store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, watch};
use tracing::{debug, instrument, warn};

use super::CartKey;
use super::action::{CartAction, PersistedCart};
use super::auto_apply::{AutoApply, ReconcileStatus};
use super::state::{CartState, Transition};
use super::storage::CartStorage;

/// One visitor's cart state plus the machinery that reacts to it.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    key: CartKey,
    state: watch::Sender<CartState>,
    storage: Arc<dyn CartStorage>,
    auto_apply: Option<Arc<AutoApply>>,
    /// Serializes cart cache writes so the last write carries the latest state.
    persist: Mutex<()>,
    /// Set once the registry has dropped this store. Another store may
    /// already own the key, so a retired store never writes the cart cache.
    retired: AtomicBool,
}

impl CartStore {
    /// Create an empty store. Pass `None` for `auto_apply` to disable coupon
    /// reconciliation.
    #[must_use]
    pub fn new(
        key: CartKey,
        storage: Arc<dyn CartStorage>,
        auto_apply: Option<AutoApply>,
    ) -> Self {
        let (state, _) = watch::channel(CartState::default());
        Self {
            inner: Arc::new(CartStoreInner {
                key,
                state,
                storage,
                auto_apply: auto_apply.map(Arc::new),
                persist: Mutex::new(()),
                retired: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn key(&self) -> CartKey {
        self.inner.key
    }

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> CartState {
        self.inner.state.borrow().clone()
    }

    /// Watch for state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn reconcile_status(&self) -> ReconcileStatus {
        self.inner
            .auto_apply
            .as_ref()
            .map_or(ReconcileStatus::Idle, |auto_apply| auto_apply.status())
    }

    /// Detach the store from the cart cache and stop coupon reconciliation.
    ///
    /// Holders of a clone can still read and dispatch, but nothing they do
    /// reaches the cart cache. A reconciliation call already in flight lands
    /// in memory only.
    pub fn retire(&self) {
        if self.inner.retired.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(cart = %self.inner.key, "Retiring cart store");
        if let Some(auto_apply) = &self.inner.auto_apply {
            auto_apply.cancel();
        }
    }

    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.inner.retired.load(Ordering::Acquire)
    }

    /// Apply an action and return the resulting state.
    ///
    /// The state update is synchronous; the auto-apply middleware is then
    /// notified and the cart cache rewritten. Cache failures are logged only.
    pub async fn dispatch(&self, action: CartAction) -> CartState {
        self.dispatch_with_transition(action).await.0
    }

    /// Replace the cart with a restored one and mirror it to the cart cache.
    ///
    /// Unlike hydration from the cart cache itself, a restore from elsewhere
    /// (a remote guest cart) has to be written back.
    pub async fn restore(&self, cart: PersistedCart) -> CartState {
        let (next, transition) = self
            .dispatch_with_transition(CartAction::Hydrate(cart))
            .await;
        if transition == Transition::Changed {
            self.persist().await;
        }
        next
    }

    #[instrument(skip(self, action), fields(cart = %self.inner.key, action = action.name()))]
    pub(crate) async fn dispatch_with_transition(
        &self,
        action: CartAction,
    ) -> (CartState, Transition) {
        let mut transition = Transition::Unchanged;
        let mut next = CartState::default();
        self.inner.state.send_if_modified(|state| {
            transition = state.apply(&action);
            next.clone_from(state);
            transition == Transition::Changed
        });

        if transition != Transition::Changed {
            debug!(?transition, "Cart unchanged");
            return (next, transition);
        }

        if self.is_retired() {
            debug!("Cart store retired, change kept in memory");
            return (next, transition);
        }
        if let Some(auto_apply) = &self.inner.auto_apply {
            auto_apply.after_dispatch(self, &action, &next);
        }
        if action.persists() {
            self.persist().await;
        }

        (next, transition)
    }

    /// Mirror the latest state to the cart cache, deleting the entry for an
    /// empty cart.
    async fn persist(&self) {
        let _guard = self.inner.persist.lock().await;
        if self.is_retired() {
            return;
        }
        let latest = PersistedCart::from(&*self.inner.state.borrow());
        let key = self.inner.key;

        let result = if latest.is_empty() {
            self.inner.storage.clear(key).await
        } else {
            self.inner.storage.save(key, &latest).await
        };
        if let Err(e) = result {
            warn!(cart = %key, error = %e, "Failed to mirror cart to cart cache");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use eastwest_core::{Money, ProductId};

    use super::*;
    use crate::cart::MemoryCartStorage;
    use crate::db::RepositoryError;

    fn add(product: i32, cents: i64) -> CartAction {
        CartAction::Add {
            product_id: ProductId::new(product),
            title: format!("Product {product}"),
            unit_price: Money::from_cents(cents),
            quantity: 1,
            options: vec![],
        }
    }

    #[tokio::test]
    async fn test_dispatch_mirrors_to_storage() {
        let storage = Arc::new(MemoryCartStorage::new());
        let key = CartKey::generate();
        let store = CartStore::new(key, storage.clone(), None);

        let state = store.dispatch(add(1, 2_500)).await;
        assert_eq!(state.items.len(), 1);
        let cached = storage.get(key).await.unwrap();
        assert_eq!(cached.items, state.items);

        store.dispatch(CartAction::Clear).await;
        assert!(storage.get(key).await.is_none());
    }

    #[tokio::test]
    async fn test_flag_updates_not_mirrored() {
        let storage = Arc::new(MemoryCartStorage::new());
        let key = CartKey::generate();
        let store = CartStore::new(key, storage.clone(), None);

        store.dispatch(CartAction::SetAddressDiscount(true)).await;
        assert!(storage.get(key).await.is_none());
        assert!(store.snapshot().address_discount);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = CartStore::new(
            CartKey::generate(),
            Arc::new(MemoryCartStorage::new()),
            None,
        );
        let mut rx = store.subscribe();

        store.dispatch(add(1, 1_000)).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().items.len(), 1);

        // Unknown line: nothing changes, nobody is woken
        store
            .dispatch(CartAction::Increment {
                line_id: eastwest_core::LineId::generate(),
            })
            .await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_restore_mirrors_to_storage() {
        let storage = Arc::new(MemoryCartStorage::new());
        let key = CartKey::generate();
        let store = CartStore::new(key, storage.clone(), None);

        let mut source = CartState::default();
        source.apply(&add(3, 4_200));
        let state = store.restore(PersistedCart::from(&source)).await;

        assert_eq!(state.items, source.items);
        assert_eq!(storage.get(key).await.unwrap().items, source.items);
    }

    #[tokio::test]
    async fn test_retired_store_leaves_storage_alone() {
        let storage = Arc::new(MemoryCartStorage::new());
        let key = CartKey::generate();
        let store = CartStore::new(key, storage.clone(), None);

        store.dispatch(add(1, 2_500)).await;
        store.retire();
        assert!(store.is_retired());

        let state = store.dispatch(add(2, 1_000)).await;
        assert_eq!(state.items.len(), 2);
        assert_eq!(storage.get(key).await.unwrap().items.len(), 1);

        store.dispatch(CartAction::Clear).await;
        assert_eq!(storage.get(key).await.unwrap().items.len(), 1);
    }

    struct BrokenStorage;

    #[async_trait]
    impl CartStorage for BrokenStorage {
        async fn load(&self, _key: CartKey) -> Result<Option<PersistedCart>, RepositoryError> {
            Err(RepositoryError::DataCorruption("offline".to_string()))
        }

        async fn save(&self, _key: CartKey, _cart: &PersistedCart) -> Result<(), RepositoryError> {
            Err(RepositoryError::DataCorruption("offline".to_string()))
        }

        async fn clear(&self, _key: CartKey) -> Result<(), RepositoryError> {
            Err(RepositoryError::DataCorruption("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let store = CartStore::new(CartKey::generate(), Arc::new(BrokenStorage), None);
        let state = store.dispatch(add(1, 1_000)).await;
        assert_eq!(state.items.len(), 1);
        assert_eq!(store.snapshot(), state);
    }
}
