//! fimo-runtime: a native, process-wide modular runtime context.
//!
//! # Overview
//!
//! The runtime hosts a single process-global [`context`] that owns three
//! cooperating subsystems:
//!
//! - a **tracing** subsystem ([`tracing`]): per-thread call stacks of
//!   nested spans, level filtering, an event-info cache, and pluggable
//!   subscribers (stderr, a TCP wire protocol, an OS sampler);
//! - an **async/futures** subsystem ([`future`], [`runtime`]): a poll +
//!   waker contract, FSM-driven state-machine futures, and a
//!   single-threaded cooperative event loop; and
//! - a **modules** subsystem ([`modules`]): dependency-ordered loading of
//!   versioned, symbol-exporting module bundles into an acyclic dependency
//!   graph, with strong/weak instance lifetimes and typed parameters.
//!
//! A small shared core ties these together: [`version`] (semver
//! compatibility), [`error`]/[`result`] (a type-erased `Result` with a
//! thread-local current-result slot), [`resource_count`] and
//! [`thread_state`] (the futex-backed counters and per-thread bookkeeping
//! that let [`context::deinit`] block until every subsystem has drained),
//! and [`context`] itself (the tagged `init(options)` list and the
//! refcounted [`context::Handle`]).
//!
//! # Module Structure
//!
//! - [`version`]: semantic versions and the `satisfies` compatibility rule.
//! - [`error`]: the type-erased `Error`/`Result`.
//! - [`result`]: the thread-local current-result slot.
//! - [`resource_count`]: the futex-backed blocking counter.
//! - [`thread_state`]: per-thread registration bookkeeping.
//! - [`context`]: context lifecycle (`init`/`deinit`) and the global
//!   `Handle`.
//! - [`tracing`]: spans, call stacks, subscribers, the wire protocol.
//! - [`future`]: the poll/waker contract, combinators, `FsmFuture`.
//! - [`runtime`]: the event loop, task enqueue, timers.
//! - [`modules`]: the dependency graph, loader, and parameters.
//! - [`util`]: internal utilities shared across subsystems (the
//!   generational arena).
//!
//! # API Stability
//!
//! This crate is in the 0.x series; public items should be treated as
//! unstable. [`version::Version`], [`error::Error`], and [`context::Handle`]
//! are intended to stabilize first.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[cfg(feature = "config-file")]
pub mod config_file;
pub mod context;
pub mod error;
pub mod future;
pub mod modules;
pub mod resource_count;
pub mod result;
pub mod runtime;
pub mod thread_state;
pub mod time;
pub mod tracing;
pub mod util;
pub mod version;

pub use context::{ConfigRecord, Handle, ModulesConfig, TracingConfig};
pub use error::{Error, ErrorKind, Result};
pub use version::Version;

/// Generates an [`future::fsm::FsmDef`] implementation and a `Future`-ready
/// type alias from a declarative state-table description.
///
/// See `fimo_runtime::future::fsm` for the trait this expands into an
/// implementation of.
#[cfg(feature = "proc-macros")]
pub use fimo_runtime_macros::fsm_future;
