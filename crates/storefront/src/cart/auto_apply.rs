//! Debounced coupon reconciliation.
//!
//! Cart mutations schedule a reconciliation instead of calling the remote
//! service directly. Bursts of mutations inside the debounce window collapse
//! into one call, made with the cart as it stands when the window closes.
//!
//! ```text
//! Idle ──mutation──▶ Scheduled ──window closes──▶ Reconciling ──▶ Idle
//!                     ▲     │                          │
//!                     └─────┘ mutation restarts timer  │ mutation schedules
//!                                                      ▼ a new cycle
//! ```
//!
//! A call already in flight is never cancelled. Its result carries the
//! revision it was computed from and the store drops it if the cart moved on.
//! A dropped result is retried only when no later cycle will cover it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::action::{CartAction, ReconcileMode, Trigger};
use super::debounce::Debouncer;
use super::eligibility;
use super::state::{CartState, Transition};
use super::store::CartStore;
use crate::api::CouponService;

/// Where the current debounce cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    Idle,
    Scheduled,
    Reconciling,
}

/// Auto-apply middleware for one cart store.
pub struct AutoApply {
    coupons: Arc<dyn CouponService>,
    debouncer: Debouncer,
    /// Strongest mode requested since the last window closed.
    pending_mode: Mutex<Option<ReconcileMode>>,
    /// Sequence number and mode of the most recently started cycle.
    latest_cycle: Mutex<Option<(u64, ReconcileMode)>>,
}

impl AutoApply {
    #[must_use]
    pub fn new(coupons: Arc<dyn CouponService>, delay: Duration) -> Self {
        Self {
            coupons,
            debouncer: Debouncer::new(delay),
            pending_mode: Mutex::new(None),
            latest_cycle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn status(&self) -> ReconcileStatus {
        if self.debouncer.is_pending() {
            ReconcileStatus::Scheduled
        } else if self.debouncer.is_running() {
            ReconcileStatus::Reconciling
        } else {
            ReconcileStatus::Idle
        }
    }

    /// React to an action that changed the cart.
    pub(crate) fn after_dispatch(
        self: &Arc<Self>,
        store: &CartStore,
        action: &CartAction,
        next: &CartState,
    ) {
        match action.trigger(next) {
            Trigger::None => {}
            Trigger::Cancel => self.cancel(),
            Trigger::Reconcile(mode) => self.schedule(store, mode),
        }
    }

    fn schedule(self: &Arc<Self>, store: &CartStore, mode: ReconcileMode) {
        {
            let mut pending = self
                .pending_mode
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *pending = Some(pending.map_or(mode, |current| current.merge(mode)));
        }
        debug!(cart = %store.key(), ?mode, "Scheduling coupon reconciliation");

        let this = Arc::clone(self);
        let store = store.clone();
        self.debouncer.schedule(async move {
            this.run(store).await;
        });
    }

    pub(crate) fn cancel(&self) {
        self.debouncer.cancel();
        *self
            .pending_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn begin_cycle(&self, mode: ReconcileMode) -> u64 {
        let mut latest = self
            .latest_cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let cycle = latest.map_or(0, |(id, _)| id.wrapping_add(1));
        *latest = Some((cycle, mode));
        cycle
    }

    /// Whether a cycle started after `cycle` reconciles at least as much.
    fn superseded(&self, cycle: u64, mode: ReconcileMode) -> bool {
        let latest = *self
            .latest_cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        matches!(
            latest,
            Some((id, latest_mode)) if id != cycle && latest_mode.merge(mode) == latest_mode
        )
    }

    #[instrument(skip_all, fields(cart = %store.key()))]
    async fn run(self: Arc<Self>, store: CartStore) {
        let mode = self
            .pending_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mode) = mode else {
            return;
        };
        let cycle = self.begin_cycle(mode);

        let snapshot = store.snapshot();
        if snapshot.is_empty() {
            debug!("Cart empty at window close, skipping reconciliation");
            return;
        }
        if mode == ReconcileMode::Revalidate && snapshot.coupons.is_empty() {
            debug!("No coupons to revalidate");
            return;
        }

        let quote = snapshot.quote();
        let offered = match self.coupons.offered_coupons(&quote).await {
            Ok(offered) => offered,
            Err(e) => {
                warn!(error = %e, ?mode, "Coupon reconciliation failed, keeping applied coupons");
                return;
            }
        };

        let applied =
            eligibility::reconcile(&snapshot.coupons, &offered, &quote, mode, Utc::now());
        let (_, transition) = store
            .dispatch_with_transition(CartAction::CouponsReconciled {
                revision: snapshot.revision,
                applied,
            })
            .await;

        // Cart changed while the call was in flight. Retry unless a pending
        // or newer cycle already covers this mode.
        if transition != Transition::Stale || store.is_retired() {
            return;
        }
        if self.debouncer.is_pending() || self.superseded(cycle, mode) {
            debug!(?mode, "Reconciliation stale, covered by a later cycle");
        } else {
            debug!(?mode, "Reconciliation stale, rescheduling");
            self.schedule(&store, mode);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use rust_decimal::Decimal;

    use eastwest_core::{
        Coupon, CouponCode, DiscountKind, FirstTimeDiscount, Money, ProductId, ShippingInfo,
    };

    use super::*;
    use crate::api::{ApiError, CartQuote};
    use crate::cart::{CartKey, MemoryCartStorage};

    const WINDOW: Duration = Duration::from_millis(500);

    /// In-process coupon service recording every call.
    struct FakeCoupons {
        offered: Mutex<Vec<Coupon>>,
        calls: Mutex<Vec<CartQuote>>,
        latency: Duration,
        failing: AtomicBool,
    }

    impl FakeCoupons {
        fn new(offered: Vec<Coupon>) -> Arc<Self> {
            Self::with_latency(offered, Duration::ZERO)
        }

        fn with_latency(offered: Vec<Coupon>, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                offered: Mutex::new(offered),
                calls: Mutex::new(Vec::new()),
                latency,
                failing: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> Vec<CartQuote> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CouponService for FakeCoupons {
        async fn offered_coupons(&self, quote: &CartQuote) -> Result<Vec<Coupon>, ApiError> {
            self.calls.lock().unwrap().push(quote.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 503,
                    message: "coupon service unavailable".to_string(),
                });
            }
            Ok(self.offered.lock().unwrap().clone())
        }
    }

    fn store(fake: &Arc<FakeCoupons>) -> CartStore {
        let coupons: Arc<dyn CouponService> = fake.clone();
        CartStore::new(
            CartKey::generate(),
            Arc::new(MemoryCartStorage::new()),
            Some(AutoApply::new(coupons, WINDOW)),
        )
    }

    fn add(product: i32, cents: i64) -> CartAction {
        CartAction::Add {
            product_id: ProductId::new(product),
            title: format!("Product {product}"),
            unit_price: Money::from_cents(cents),
            quantity: 1,
            options: vec![],
        }
    }

    fn coupon(code: &str, cents: i64, minimum_cents: Option<i64>, auto_apply: bool) -> Coupon {
        Coupon {
            code: CouponCode::parse(code).unwrap(),
            title: code.to_string(),
            discount: DiscountKind::Fixed(Money::from_cents(cents)),
            minimum_amount: minimum_cents.map(Money::from_cents),
            applicable_products: vec![],
            stackable: false,
            auto_apply,
            excludes_first_time_discount: false,
            expires_at: None,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_adds_make_one_call_with_final_state() {
        let fake = FakeCoupons::new(vec![]);
        let store = store(&fake);

        store.dispatch(add(1, 1_000)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.dispatch(add(2, 2_000)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.dispatch(add(3, 3_000)).await;
        assert_eq!(store.reconcile_status(), ReconcileStatus::Scheduled);

        settle().await;
        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].lines.len(), 3);
        assert_eq!(calls[0].subtotal, Money::from_cents(6_000));
        assert_eq!(store.reconcile_status(), ReconcileStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_coupons_and_timer() {
        let fake = FakeCoupons::new(vec![]);
        let store = store(&fake);

        store.dispatch(add(1, 6_000)).await;
        let manual = coupon("SAVE10", 1_000, None, false);
        let applied =
            eligibility::evaluate(&manual, &store.snapshot().quote(), Utc::now()).unwrap();
        store.dispatch(CartAction::ApplyCoupon(applied)).await;

        let state = store.dispatch(CartAction::Clear).await;
        assert!(state.coupons.is_empty());
        assert_eq!(store.reconcile_status(), ReconcileStatus::Idle);

        settle().await;
        assert!(fake.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removing_last_item_skips_remote_call() {
        let fake = FakeCoupons::new(vec![]);
        let store = store(&fake);

        let state = store.dispatch(add(1, 1_000)).await;
        settle().await;
        assert_eq!(fake.calls().len(), 1);

        store
            .dispatch(CartAction::Remove {
                line_id: state.items[0].id,
            })
            .await;
        assert_eq!(store.reconcile_status(), ReconcileStatus::Idle);

        settle().await;
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coupon_dropped_when_subtotal_falls_below_minimum() {
        let min50 = coupon("TRAIL50", 500, Some(5_000), false);
        let fake = FakeCoupons::new(vec![min50.clone()]);
        let store = store(&fake);

        store.dispatch(add(1, 4_000)).await;
        let state = store.dispatch(add(2, 1_000)).await;
        settle().await;

        let applied = eligibility::evaluate(&min50, &state.quote(), Utc::now()).unwrap();
        store.dispatch(CartAction::ApplyCoupon(applied)).await;
        assert_eq!(store.snapshot().coupons.len(), 1);

        let ten_dollar_line = state.items[1].id;
        store
            .dispatch(CartAction::Remove {
                line_id: ten_dollar_line,
            })
            .await;
        assert_eq!(store.snapshot().subtotal(), Money::from_cents(4_000));
        assert_eq!(store.snapshot().coupons.len(), 1);

        settle().await;
        assert!(store.snapshot().coupons.is_empty());
        assert_eq!(fake.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_auto_applies_matching_coupon() {
        let fake = FakeCoupons::new(vec![coupon("WELCOME5", 500, Some(2_500), true)]);
        let store = store(&fake);

        store.dispatch(add(1, 3_000)).await;
        assert!(store.snapshot().coupons.is_empty());

        settle().await;
        let state = store.snapshot();
        assert_eq!(state.coupons.len(), 1);
        assert_eq!(state.coupons[0].code.as_str(), "WELCOME5");
        assert_eq!(state.coupons[0].amount, Money::from_cents(500));
        assert_eq!(state.total(), Money::from_cents(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_increments_inside_window_make_one_call() {
        let fake = FakeCoupons::new(vec![coupon("WELCOME5", 500, None, true)]);
        let store = store(&fake);

        let state = store.dispatch(add(1, 3_000)).await;
        settle().await;
        assert_eq!(fake.calls().len(), 1);
        assert_eq!(store.snapshot().coupons.len(), 1);

        let line_id = state.items[0].id;
        store.dispatch(CartAction::Increment { line_id }).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.dispatch(CartAction::Increment { line_id }).await;

        settle().await;
        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].lines[0].quantity, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidate_without_coupons_skips_remote_call() {
        let fake = FakeCoupons::new(vec![]);
        let store = store(&fake);

        let state = store.dispatch(add(1, 3_000)).await;
        settle().await;
        store
            .dispatch(CartAction::Increment {
                line_id: state.items[0].id,
            })
            .await;
        settle().await;

        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_discarded() {
        let fake = FakeCoupons::with_latency(
            vec![coupon("WELCOME5", 500, None, true)],
            Duration::from_millis(300),
        );
        let store = store(&fake);

        store.dispatch(add(1, 3_000)).await;
        // Window closes at 500ms; the call is in flight until 800ms
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.reconcile_status(), ReconcileStatus::Reconciling);
        store.dispatch(add(2, 2_000)).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(
            store.snapshot().coupons.is_empty(),
            "result computed before the second add must not land"
        );

        settle().await;
        let state = store.snapshot();
        assert_eq!(fake.calls().len(), 2);
        assert_eq!(state.coupons.len(), 1);
        assert_eq!(state.coupons[0].snapshot.subtotal, Money::from_cents(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_without_new_cycle_is_retried() {
        let manual = coupon("MANUAL", 300, None, false);
        let fake = FakeCoupons::with_latency(
            vec![coupon("WELCOME5", 500, None, true), manual.clone()],
            Duration::from_millis(300),
        );
        let store = store(&fake);

        let state = store.dispatch(add(1, 3_000)).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        let applied = eligibility::evaluate(&manual, &state.quote(), Utc::now()).unwrap();
        store.dispatch(CartAction::ApplyCoupon(applied)).await;

        settle().await;
        let state = store.snapshot();
        assert_eq!(fake.calls().len(), 2);
        assert_eq!(state.coupons.len(), 1);
        assert_eq!(state.coupons[0].code.as_str(), "MANUAL");
        assert_eq!(store.reconcile_status(), ReconcileStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_keeps_coupons() {
        let fake = FakeCoupons::new(vec![coupon("WELCOME5", 500, None, true)]);
        let store = store(&fake);

        let state = store.dispatch(add(1, 3_000)).await;
        settle().await;
        let before = store.snapshot().coupons;
        assert_eq!(before.len(), 1);

        fake.failing.store(true, Ordering::SeqCst);
        store
            .dispatch(CartAction::Increment {
                line_id: state.items[0].id,
            })
            .await;
        settle().await;

        assert_eq!(fake.calls().len(), 2);
        assert_eq!(store.snapshot().coupons, before);
        assert_eq!(store.reconcile_status(), ReconcileStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_time_discount_drops_excluded_coupon() {
        let mut exclusive = coupon("NEWRIG", 800, None, true);
        exclusive.excludes_first_time_discount = true;
        let fake = FakeCoupons::new(vec![exclusive]);
        let store = store(&fake);

        store.dispatch(add(1, 4_000)).await;
        settle().await;
        assert_eq!(store.snapshot().coupons.len(), 1);
        assert_eq!(fake.calls().len(), 1);

        store
            .dispatch(CartAction::SetFirstTimeDiscount(FirstTimeDiscount {
                eligible: true,
                percentage: Decimal::TEN,
            }))
            .await;
        assert_eq!(store.reconcile_status(), ReconcileStatus::Scheduled);
        settle().await;

        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].first_time_discount);
        assert!(store.snapshot().coupons.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shipping_change_revalidates_applied_coupon() {
        let fake = FakeCoupons::new(vec![coupon("WELCOME5", 500, None, true)]);
        let store = store(&fake);

        store.dispatch(add(1, 3_000)).await;
        settle().await;
        assert_eq!(store.snapshot().coupons[0].snapshot.shipping_cost, Money::ZERO);

        store
            .dispatch(CartAction::SetShipping(Some(ShippingInfo {
                method: "Ground".to_string(),
                cost: Money::from_cents(1_500),
                zip: Some("84101".to_string()),
                state: Some("UT".to_string()),
            })))
            .await;
        settle().await;

        assert_eq!(fake.calls().len(), 2);
        let state = store.snapshot();
        assert_eq!(state.coupons.len(), 1);
        assert_eq!(state.coupons[0].snapshot.shipping_cost, Money::from_cents(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_covered_by_running_cycle_is_not_retried() {
        let fake = FakeCoupons::with_latency(
            vec![coupon("WELCOME5", 500, None, true)],
            Duration::from_secs(1),
        );
        let store = store(&fake);

        // First call in flight from 500ms to 1500ms, second from 1100ms to 2100ms
        store.dispatch(add(1, 3_000)).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        store.dispatch(add(2, 2_000)).await;
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(store.reconcile_status(), ReconcileStatus::Reconciling);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let state = store.snapshot();
        assert_eq!(fake.calls().len(), 2);
        assert_eq!(state.coupons.len(), 1);
        assert_eq!(state.coupons[0].snapshot.subtotal, Money::from_cents(5_000));
        assert_eq!(store.reconcile_status(), ReconcileStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_auto_apply_not_covered_by_revalidate() {
        let fake = FakeCoupons::with_latency(
            vec![coupon("WELCOME5", 500, None, true)],
            Duration::from_secs(1),
        );
        let store = store(&fake);

        let state = store.dispatch(add(1, 3_000)).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        // No coupons yet, so this window closes without a call
        store
            .dispatch(CartAction::Increment {
                line_id: state.items[0].id,
            })
            .await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        let state = store.snapshot();
        assert_eq!(fake.calls().len(), 2);
        assert_eq!(state.coupons.len(), 1);
        assert_eq!(state.coupons[0].snapshot.subtotal, Money::from_cents(6_000));
    }
}
