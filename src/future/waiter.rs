//! Single-consumer blocking waiter (`spec.md` §4.7 "Waiter").
//!
//! Bridges a `poll`-based future back to a blocking thread: `block()` parks
//! the calling thread on a condvar until the waiter's waker fires, and
//! `await_future` loops poll/block until the future completes. Only one
//! thread may ever be blocked on a given waiter at a time, matching the
//! spec's single-consumer requirement.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use parking_lot::{Condvar, Mutex};

use crate::future::waker::{waker_for, WakeSink};

struct State {
    signaled: bool,
    blocked: bool,
}

/// A reusable single-consumer blocking waiter.
pub struct Waiter {
    state: Mutex<State>,
    condvar: Condvar,
}

impl Waiter {
    /// Constructs a fresh, unsignaled waiter.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                signaled: false,
                blocked: false,
            }),
            condvar: Condvar::new(),
        })
    }

    /// Builds a waker that signals this waiter.
    #[must_use]
    pub fn waker(self: &Arc<Self>) -> std::task::Waker {
        waker_for(Arc::clone(self))
    }

    /// Blocks the calling thread until this waiter is signaled.
    ///
    /// Panics if another thread is already blocked on this waiter.
    pub fn block(&self) {
        let mut state = self.state.lock();
        assert!(!state.blocked, "waiter misuse: only one thread may block at a time");
        state.blocked = true;
        while !state.signaled {
            self.condvar.wait(&mut state);
        }
        state.signaled = false;
        state.blocked = false;
    }

    /// Polls `future` to completion, blocking between polls.
    pub fn await_future<F: Future>(self: &Arc<Self>, mut future: Pin<&mut F>) -> F::Output {
        let waker = self.waker();
        let mut cx = Context::from_waker(&waker);
        loop {
            match future.as_mut().poll(&mut cx) {
                Poll::Ready(value) => return value,
                Poll::Pending => self.block(),
            }
        }
    }
}

impl WakeSink for Waiter {
    fn on_wake(&self) {
        let mut state = self.state.lock();
        state.signaled = true;
        self.condvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::task::Poll;

    struct ReadyAfter {
        remaining: AtomicU32,
    }

    impl Future for ReadyAfter {
        type Output = u32;

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            if self.remaining.fetch_sub(1, Ordering::Relaxed) == 0 {
                Poll::Ready(42)
            } else {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    #[test]
    fn await_future_drives_to_completion() {
        let waiter = Waiter::new();
        let mut future = ReadyAfter {
            remaining: AtomicU32::new(3),
        };
        let value = waiter.await_future(pin!(future));
        assert_eq!(value, 42);
        let _ = &mut future;
    }

    #[test]
    #[should_panic(expected = "only one thread may block")]
    fn concurrent_block_panics() {
        let waiter = Waiter::new();
        // Never signaled: the first `block` call blocks the thread, so we
        // simulate re-entrant misuse by calling `block` again on the same
        // thread while `blocked` is still recorded true via a manual flag.
        {
            let mut state = waiter.state.lock();
            state.blocked = true;
        }
        waiter.block();
    }
}
