//! Async contracts: poll/waker, blocking waiters, and future composition
//! (`spec.md` §4.7, §4.8).
//!
//! This crate does not define its own `Future` trait: the spec's poll
//! contract (`poll(&mut self, waker) -> Poll<T>`, a future may not be
//! polled again after returning `ready`) is exactly `core::future::Future`,
//! and the spec's `Waker` vtable (`ref`/`unref`/`wake`/`wake_unref`) is
//! exactly `std::task::Waker`'s `Arc`-based refcounting (see
//! [`waker::waker_for`]). Building on the standard traits means every
//! combinator here composes with `async fn`/`.await` the ordinary way and
//! with [`crate::runtime`]'s event loop, which polls `dyn Future` objects
//! directly.

pub mod combinator;
pub mod fallible;
pub mod fsm;
pub mod waiter;
pub mod waker;

pub use combinator::{MapFuture, ReadyFuture};
pub use fallible::Fallible;
pub use fsm::{FsmDef, FsmFuture, StateOutcome, UnwindOutcome, UnwindReason};
pub use waiter::Waiter;
pub use waker::{waker_for, WakeSink};

/// An opaque, type-erased future for cross-module use, mirroring the spec's
/// `ExternFuture` (`spec.md` §4.8): a boxed, pinned `dyn Future` with its
/// output type parameter kept, so callers on either side of a module
/// boundary agree on `T` without needing a C-ABI-shaped vtable themselves.
///
/// A genuine C-ABI `ExternFuture` (`{data, poll_fn, deinit_fn?}`) is left to
/// the FFI export surface named out of scope in `spec.md` §1; this type is
/// the in-process Rust equivalent the loader and event loop actually pass
/// around.
pub type OpaqueFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Boxes and pins `future` as an [`OpaqueFuture`].
#[must_use]
pub fn boxed<T, F>(future: F) -> OpaqueFuture<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
{
    Box::pin(future)
}
