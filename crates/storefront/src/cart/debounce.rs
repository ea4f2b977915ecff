//! Cancellable delay timer.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Runs only the last of a burst of scheduled futures, `delay` after it was
/// scheduled.
///
/// Scheduling aborts a timer that has not fired yet. Once a timer fires its
/// future runs to completion; later schedules never abort it.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    next_ticket: u64,
    pending: Option<(u64, JoinHandle<()>)>,
    running: usize,
}

/// Decrements the running count when a fired future finishes or is dropped.
struct Running(Arc<Mutex<Slot>>);

impl Drop for Running {
    fn drop(&mut self) {
        let mut slot = lock(&self.0);
        slot.running = slot.running.saturating_sub(1);
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Arc::default(),
        }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `task` to run after the delay, replacing any pending timer.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        if let Some((_, handle)) = slot.pending.take() {
            handle.abort();
        }

        let ticket = slot.next_ticket;
        slot.next_ticket = slot.next_ticket.wrapping_add(1);

        let delay = self.delay;
        let shared = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = lock(&shared);
                if !matches!(slot.pending, Some((current, _)) if current == ticket) {
                    return;
                }
                slot.pending = None;
                slot.running += 1;
            }
            let _running = Running(shared);
            task.await;
        });
        slot.pending = Some((ticket, handle));
    }

    /// Drop the pending timer, if any.
    pub fn cancel(&self) {
        if let Some((_, handle)) = lock(&self.slot).pending.take() {
            handle.abort();
        }
    }

    /// Whether a timer is waiting to fire.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }

    /// Whether a fired future is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.slot).running > 0
    }
}
