//! Per-thread bookkeeping shared by every subsystem (`spec.md` §4.1, §4.3).
//!
//! A thread that wants to use the runtime must register exactly once; the
//! registration is what `deinit` waits on (together with the call-stack and
//! error-result counts) before a context is allowed to tear down. Tracing's
//! `register_thread`/`unregister_thread` (§4.3) builds directly on top of
//! this: it additionally attaches a format buffer and a bound call stack,
//! but the "is this thread known to the context, and will it clean up on
//! exit" question lives here so it can be asked independent of tracing.

use std::cell::Cell;

use crate::resource_count::ResourceCount;

static REGISTERED_THREAD_COUNT: ResourceCount = ResourceCount::new();

thread_local! {
    static REGISTERED: Cell<bool> = const { Cell::new(false) };
    static CLEANUP: ThreadCleanup = const { ThreadCleanup };
}

/// The process-wide count of currently registered threads.
///
/// Context teardown blocks on this reaching zero, same as
/// [`crate::result::error_result_count`].
#[must_use]
pub fn registered_thread_count() -> &'static ResourceCount {
    &REGISTERED_THREAD_COUNT
}

/// Whether the calling thread is currently registered.
#[must_use]
pub fn is_registered() -> bool {
    REGISTERED.with(Cell::get)
}

/// Registers the calling thread, if not already registered.
///
/// Idempotent: a second call on an already-registered thread is a no-op.
/// Touching `CLEANUP`'s thread-local wires up the [`Drop`] impl that fires
/// on thread exit, so cleanup never depends on an explicit `unregister`
/// call racing the thread's teardown.
pub fn register() {
    if REGISTERED.with(Cell::get) {
        return;
    }
    REGISTERED.with(|flag| flag.set(true));
    CLEANUP.with(|_| {});
    REGISTERED_THREAD_COUNT.increase();
}

/// Unregisters the calling thread, if currently registered.
///
/// Clears the thread's current result as part of unregistration, matching
/// the context-teardown order in §4.1 (per-thread state is drained last,
/// after the subsystems that might otherwise still report into it).
pub fn unregister() {
    if !REGISTERED.with(Cell::get) {
        return;
    }
    crate::result::clear_result();
    REGISTERED.with(|flag| flag.set(false));
    REGISTERED_THREAD_COUNT.decrease();
}

struct ThreadCleanup;

impl Drop for ThreadCleanup {
    fn drop(&mut self) {
        unregister();
    }
}
