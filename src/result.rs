//! Thread-local "current result" slot (`spec.md` §4.1, §7).
//!
//! Every thread that has attached to the context owns a single current
//! result: the outcome of the last fallible call made on that thread.
//! `replace_result` is the primitive every public entry point funnels
//! through; `has_error_result`/`take_result` are how a caller that does not
//! want the `Result<T, Error>` return-value plumbing (status-code style
//! APIs, per the `err_no_report` propagation policy in §7) finds out what
//! happened afterward.
//!
//! The process-wide [`error_result_count`] tracks how many threads currently
//! hold a non-ok result; [`crate::context`] blocks teardown on it reaching
//! zero so a thread can never have its result slot torn out from under it
//! mid-inspection.

use std::cell::RefCell;

use crate::error::Error;
use crate::resource_count::ResourceCount;

thread_local! {
    static CURRENT_RESULT: RefCell<Option<Error>> = const { RefCell::new(None) };
}

static ERROR_RESULT_COUNT: ResourceCount = ResourceCount::new();

/// The process-wide count of threads currently holding an `err` result.
///
/// Context teardown blocks on this reaching zero.
#[must_use]
pub fn error_result_count() -> &'static ResourceCount {
    &ERROR_RESULT_COUNT
}

/// Whether the calling thread's current result is an error.
#[must_use]
pub fn has_error_result() -> bool {
    CURRENT_RESULT.with(|slot| slot.borrow().is_some())
}

/// Replaces the calling thread's current result, returning the previous one.
///
/// Adjusts [`error_result_count`] on `ok`<->`err` transitions so the global
/// count always reflects the number of threads currently sitting on an
/// error.
pub fn replace_result(new: Option<Error>) -> Option<Error> {
    CURRENT_RESULT.with(|slot| {
        let mut slot = slot.borrow_mut();
        match (slot.is_some(), new.is_some()) {
            (false, true) => ERROR_RESULT_COUNT.increase(),
            (true, false) => ERROR_RESULT_COUNT.decrease(),
            _ => {}
        }
        std::mem::replace(&mut *slot, new)
    })
}

/// Sets the calling thread's current result to `ok`.
pub fn clear_result() {
    replace_result(None);
}

/// Sets the calling thread's current result, discarding whatever was there.
pub fn set_result(new: Option<Error>) {
    replace_result(new);
}

/// Takes the calling thread's current result, resetting it to `ok`.
pub fn take_result() -> Option<Error> {
    replace_result(None)
}

/// Runs `f`, capturing its outcome into the calling thread's current result
/// slot and returning whatever `f` returned.
///
/// This is the funnel every `extern "C"`-shaped entry point in the runtime
/// routes through: callers that only check a boolean/status return can then
/// recover the full [`Error`] via [`take_result`].
pub fn report<T>(f: impl FnOnce() -> crate::error::Result<T>) -> crate::error::Result<T> {
    match f() {
        Ok(value) => {
            clear_result();
            Ok(value)
        }
        Err(err) => {
            replace_result(Some(err.clone()));
            Err(err)
        }
    }
}
