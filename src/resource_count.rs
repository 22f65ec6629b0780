//! A futex-backed counter that blocks teardown until it reaches zero
//! (`spec.md` §4.2, §5 Concurrency & Resource Model).
//!
//! The context (and, inside it, the thread-local error-result slot) must not
//! tear down while any thread still holds a reference into it. Rather than a
//! condvar, which needs a paired mutex, the counter packs a single "someone
//! is waiting" bit into the same word it counts in, and parks/unparks
//! directly on that word's address via `parking_lot_core` — the same
//! primitive `parking_lot`'s own lock types are built on, portable across the
//! platforms the runtime targets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const WAITING_BIT: u32 = 1 << 31;
const COUNT_MASK: u32 = WAITING_BIT - 1;

/// A blocking reference count: [`ResourceCount::increase`] /
/// [`ResourceCount::decrease`] adjust the count; [`ResourceCount::wait_until_zero`]
/// parks the caller until the count drops to zero.
pub struct ResourceCount {
    state: AtomicU32,
}

impl Default for ResourceCount {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCount {
    /// Constructs a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// Current count, ignoring the waiting bit.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.state.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Increments the count. Panics on overflow into the waiting bit.
    pub fn increase(&self) {
        let prev = self.state.fetch_add(1, Ordering::AcqRel);
        assert!(
            prev & COUNT_MASK != COUNT_MASK,
            "resource count overflowed"
        );
    }

    /// Decrements the count, unparking a waiter if it just reached zero.
    ///
    /// Panics if the count was already zero.
    pub fn decrease(&self) {
        loop {
            let prev = self.state.load(Ordering::Acquire);
            let count = prev & COUNT_MASK;
            assert!(count != 0, "resource count underflowed");
            let waiting = prev & WAITING_BIT != 0;
            let new_count = count - 1;
            let next = if new_count == 0 { 0 } else { new_count | (prev & WAITING_BIT) };
            if self
                .state
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if new_count == 0 && waiting {
                    self.unpark_all();
                }
                return;
            }
        }
    }

    /// Blocks the calling thread until the count reaches zero. Returns
    /// immediately if it is already zero.
    pub fn wait_until_zero(&self) {
        loop {
            let prev = self.state.load(Ordering::Acquire);
            if prev & COUNT_MASK == 0 {
                return;
            }
            let marked = prev | WAITING_BIT;
            if prev != marked
                && self
                    .state
                    .compare_exchange(prev, marked, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                continue;
            }

            let key = self.key();
            let validate = || self.state.load(Ordering::Acquire) & COUNT_MASK != 0;
            let before_sleep = || {};
            let timed_out = |_, _| {};
            // SAFETY: `validate`/`before_sleep`/`timed_out` do not call `park`
            // on this or any other address, satisfying `parking_lot_core`'s
            // re-entrancy requirement.
            unsafe {
                parking_lot_core::park(
                    key,
                    validate,
                    before_sleep,
                    timed_out,
                    parking_lot_core::DEFAULT_PARK_TOKEN,
                    None,
                );
            }
        }
    }

    /// Like [`ResourceCount::wait_until_zero`] but gives up after `timeout`,
    /// returning whether the count reached zero.
    #[must_use]
    pub fn wait_until_zero_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let prev = self.state.load(Ordering::Acquire);
            if prev & COUNT_MASK == 0 {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            let marked = prev | WAITING_BIT;
            if prev != marked
                && self
                    .state
                    .compare_exchange(prev, marked, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                continue;
            }

            let key = self.key();
            let validate = || self.state.load(Ordering::Acquire) & COUNT_MASK != 0;
            let before_sleep = || {};
            let timed_out = |_, _| {};
            // SAFETY: see `wait_until_zero`.
            let result = unsafe {
                parking_lot_core::park(
                    key,
                    validate,
                    before_sleep,
                    timed_out,
                    parking_lot_core::DEFAULT_PARK_TOKEN,
                    Some(deadline),
                )
            };
            if matches!(result, parking_lot_core::ParkResult::TimedOut) {
                return self.count() == 0;
            }
        }
    }

    fn key(&self) -> usize {
        std::ptr::from_ref(&self.state) as usize
    }

    fn unpark_all(&self) {
        let key = self.key();
        // SAFETY: `key` is the address of `self.state`, which outlives this
        // call since `self` is borrowed for its duration.
        unsafe {
            parking_lot_core::unpark_all(key, parking_lot_core::DEFAULT_UNPARK_TOKEN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_count_does_not_block() {
        let rc = ResourceCount::new();
        rc.wait_until_zero();
    }

    #[test]
    #[should_panic(expected = "underflowed")]
    fn decrease_below_zero_panics() {
        let rc = ResourceCount::new();
        rc.decrease();
    }

    #[test]
    fn increase_then_decrease_unblocks_waiter() {
        let rc = Arc::new(ResourceCount::new());
        rc.increase();

        let waiter = {
            let rc = Arc::clone(&rc);
            thread::spawn(move || rc.wait_until_zero())
        };

        thread::sleep(Duration::from_millis(20));
        rc.decrease();
        waiter.join().unwrap();
    }

    #[test]
    fn timeout_returns_false_while_nonzero() {
        let rc = ResourceCount::new();
        rc.increase();
        assert!(!rc.wait_until_zero_timeout(Duration::from_millis(20)));
        rc.decrease();
    }
}
