//! The async/futures subsystem: a cooperative event loop, task enqueue, and
//! the blocking bridge for threads outside the loop (`spec.md` §4.7-§4.9).

pub mod event_loop;
pub mod stored_task;
pub mod timer;
pub mod timer_future;
pub mod yield_now;

pub use event_loop::{EnqueuedFuture, EventLoop, TaskId};
pub use stored_task::StoredTask;
pub use timer::TimerHeap;
pub use timer_future::Timer;
pub use yield_now::{yield_now, YieldNow};

use std::future::Future;
use std::sync::Arc;

use crate::future::Waiter;

/// A blocking bridge: lets a thread that is not the event loop's dedicated
/// thread drive any future to completion by blocking, polling between wakes
/// (`spec.md` §4.9 "a caller outside the loop can still drive a future to
/// completion by blocking").
///
/// This is a thin, named wrapper over [`Waiter`] — the loop itself never
/// blocks (it parks on its ready-queue condvar instead, see
/// [`event_loop::EventLoop`]), but application code that hands a future to
/// the loop and wants to wait for its result synchronously uses this.
pub struct BlockingContext {
    waiter: Arc<Waiter>,
}

impl BlockingContext {
    /// Constructs a fresh blocking context.
    #[must_use]
    pub fn new() -> Self {
        Self { waiter: Waiter::new() }
    }

    /// Blocks the calling thread until `future` resolves.
    ///
    /// Panics if another thread is already blocked on this same context;
    /// construct one `BlockingContext` per blocking call site.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let mut future = std::pin::pin!(future);
        self.waiter.await_future(future.as_mut())
    }
}

impl Default for BlockingContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_context_drives_an_enqueued_future() {
        let event_loop = EventLoop::new();
        let handle = event_loop.enqueue(async { 1 + 1 });
        let ctx = BlockingContext::new();
        assert_eq!(ctx.block_on(handle), 2);
        event_loop.stop();
    }

    #[test]
    fn blocking_context_drives_a_timer() {
        let ctx = BlockingContext::new();
        let start = std::time::Instant::now();
        ctx.block_on(Timer::new(std::time::Duration::from_millis(5)));
        assert!(start.elapsed() >= std::time::Duration::from_millis(5));
    }
}
