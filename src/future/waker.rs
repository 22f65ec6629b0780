//! Refcounted waker construction (`spec.md` §4.7 "Waker vtable").
//!
//! The spec's `ref`/`unref`/`wake`/`wake_unref` vtable is exactly what
//! `std::task::Wake` + `Arc` already give you: `ref` is `Arc::clone`,
//! `unref` is `Drop`, `wake_unref` is `Wake::wake` (consumes the `Arc`),
//! `wake` is `Wake::wake_by_ref`. Rather than hand-roll a `RawWakerVTable`,
//! every waker in this runtime is built through [`waker_for`], which wraps
//! any [`WakeSink`] in the stdlib's refcounted waker.

use std::sync::Arc;
use std::task::{Wake, Waker};

/// Something that can be signalled when a future's waker fires.
pub trait WakeSink: Send + Sync + 'static {
    /// Called when the waker built from this sink is woken.
    fn on_wake(&self);
}

struct Signal<T: WakeSink>(Arc<T>);

impl<T: WakeSink> Wake for Signal<T> {
    fn wake(self: Arc<Self>) {
        self.0.on_wake();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.on_wake();
    }
}

/// Builds a `std::task::Waker` that calls `sink.on_wake()` when signalled.
#[must_use]
pub fn waker_for<T: WakeSink>(sink: Arc<T>) -> Waker {
    Waker::from(Arc::new(Signal(sink)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);
    impl WakeSink for Counter {
        fn on_wake(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn wake_by_ref_does_not_consume() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let waker = waker_for(Arc::clone(&counter));
        waker.wake_by_ref();
        waker.wake_by_ref();
        assert_eq!(counter.0.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn clone_shares_the_same_sink() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let waker = waker_for(Arc::clone(&counter));
        let cloned = waker.clone();
        cloned.wake();
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);
    }
}
