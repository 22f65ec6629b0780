//! Tracing subsystem: span lifecycle, log filtering, per-thread call stack
//! management, subscriber fan-out, event-info interning (`spec.md` §4.3).
//!
//! This is the runtime's structured-logging layer; there is no separate
//! ambient `log`/`tracing`-crate dependency underneath it because this *is*
//! that layer. An optional bridge to the `tracing` crate's own `Subscriber`
//! trait is available behind the `tracing-integration` feature for
//! embedding in a host that already has a `tracing` subscriber installed.

pub mod call_stack;
pub mod event_info;
pub mod network;
pub mod sampler;
pub mod stderr;
pub mod subscriber;

#[cfg(feature = "tracing-integration")]
pub mod bridge;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

pub use call_stack::{CallStack, CallStackState};
pub use event_info::EventInfo;
pub use subscriber::{CallStackId, ExitReason, Subscriber, SubscriberSet, Timestamp};

use crate::error::{Error, ErrorKind};
use crate::resource_count::ResourceCount;

/// Severity / verbosity level, ordered from least to most verbose
/// (`spec.md` §4.3 Invariant 7: `max_level` is the *minimum* along the
/// frame path, i.e. the most restrictive level wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Tracing disabled entirely.
    Off = 0,
    /// Error conditions.
    Error = 1,
    /// Potentially problematic situations.
    Warn = 2,
    /// General informational messages.
    Info = 3,
    /// Debugging information for development.
    Debug = 4,
    /// Fine-grained debugging information (very verbose).
    Trace = 5,
}

impl Level {
    /// Whether a message at `self` passes a filter of `max_level`.
    #[must_use]
    pub const fn passes(self, max_level: Self) -> bool {
        (self as u8) <= (max_level as u8)
    }
}

static START: OnceLock<Instant> = OnceLock::new();
static SUBSCRIBERS: OnceLock<SubscriberSet> = OnceLock::new();
static STARTED: AtomicBool = AtomicBool::new(false);
static CALL_STACK_COUNT: ResourceCount = ResourceCount::new();
static DEFAULT_LEVEL: AtomicU8 = AtomicU8::new(Level::Trace as u8);

/// Sets the base level new call stacks are created at
/// (`tracing_config.max_level`, §6.1). Takes effect for call stacks created
/// after this call; existing ones are unaffected.
pub fn set_default_level(level: Level) {
    DEFAULT_LEVEL.store(level as u8, Ordering::Relaxed);
}

fn default_level() -> Level {
    match DEFAULT_LEVEL.load(Ordering::Relaxed) {
        0 => Level::Off,
        1 => Level::Error,
        2 => Level::Warn,
        3 => Level::Info,
        4 => Level::Debug,
        _ => Level::Trace,
    }
}

/// The process-wide count of currently live call stacks (bound or not).
///
/// [`crate::context`] blocks teardown on this reaching zero alongside
/// [`crate::thread_state::registered_thread_count`] and
/// [`crate::result::error_result_count`] (Invariant 8).
#[must_use]
pub fn call_stack_count() -> &'static ResourceCount {
    &CALL_STACK_COUNT
}

thread_local! {
    static CURRENT_STACK: RefCell<Option<Box<CallStack>>> = const { RefCell::new(None) };
}

fn now() -> Timestamp {
    let start = START.get_or_init(Instant::now);
    u64::try_from(Instant::now().saturating_duration_since(*start).as_nanos()).unwrap_or(u64::MAX)
}

fn subscribers() -> &'static SubscriberSet {
    SUBSCRIBERS.get_or_init(SubscriberSet::default)
}

/// Tears down the installed subscriber fan-out, firing `finish` on each.
///
/// Called once, by [`crate::context`], as the last step of tracing
/// shutdown during `deinit` (§4.1). Subscriber workers drain their queues
/// and join on `Drop`, not here — this only delivers the `finish` event.
pub fn shutdown_subscribers() {
    let time = now();
    for sub in subscribers().iter() {
        sub.finish(time);
    }
}

/// Installs the fixed subscriber fan-out list. Only the first call takes
/// effect; later calls are a no-op, matching "established at init and never
/// mutated".
pub fn install_subscribers(subscribers: Vec<std::sync::Arc<dyn Subscriber>>) {
    if SUBSCRIBERS.set(SubscriberSet::new(subscribers)).is_ok() && !STARTED.swap(true, Ordering::AcqRel) {
        let time = now();
        for sub in subscribers_ref().iter() {
            sub.start(time);
        }
    }
}

fn subscribers_ref() -> &'static SubscriberSet {
    subscribers()
}

fn declare_if_new(info: &'static EventInfo) {
    if event_info::cache().cache_info(info) {
        let time = now();
        for sub in subscribers().iter() {
            sub.declare_event_info(time, info);
        }
    }
}

/// Registers the calling thread with the tracing subsystem: emits
/// `register_thread`, then allocates a fresh call stack through the same
/// path [`init_call_stack`] uses (firing `create_call_stack`), then binds it
/// active (firing `resume_call_stack`) — `spec.md` §8 end-to-end scenario
/// #3's ordering: `register_thread, create_call_stack, resume_call_stack,
/// ...`.
///
/// Idempotent: a thread that is already registered keeps its existing call
/// stack untouched.
pub fn register_thread() {
    crate::thread_state::register();
    let already_registered = CURRENT_STACK.with(|slot| slot.borrow().is_some());
    let time = now();
    for sub in subscribers().iter() {
        sub.register_thread(time);
    }
    if !already_registered {
        let mut stack = init_call_stack();
        stack.bind_active();
        let time = now();
        for sub in subscribers().iter() {
            sub.resume_call_stack(time, stack.id());
        }
        CURRENT_STACK.with(|slot| {
            *slot.borrow_mut() = Some(stack);
        });
    }
}

/// Unregisters the calling thread. Requires the current call stack's frame
/// stack to be empty and not blocked (fatal otherwise).
pub fn unregister_thread() {
    CURRENT_STACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        let Some(stack) = slot.take() else {
            return;
        };
        assert!(
            stack.is_empty(),
            "tracing misuse: unregister_thread with a non-empty frame stack"
        );
        assert!(
            stack.state() == CallStackState::BoundActive,
            "tracing misuse: unregister_thread while blocked or suspended"
        );
        let time = now();
        for sub in subscribers().iter() {
            sub.destroy_call_stack(time, stack.id());
        }
        CALL_STACK_COUNT.decrease();
    });
    let time = now();
    for sub in subscribers().iter() {
        sub.unregister_thread(time);
    }
    crate::thread_state::unregister();
}

/// Allocates a new, unbound, suspended call stack; emits `create_call_stack`.
#[must_use]
pub fn init_call_stack() -> Box<CallStack> {
    let stack = Box::new(CallStack::new(default_level()));
    CALL_STACK_COUNT.increase();
    let time = now();
    for sub in subscribers().iter() {
        sub.create_call_stack(time, stack.id());
    }
    stack
}

/// Destroys `stack`. If `abort`, unwinds every remaining frame first,
/// firing `exit_span` events with [`ExitReason::Unwinding`].
pub fn deinit_call_stack(mut stack: Box<CallStack>, abort: bool) {
    let time = now();
    if abort {
        for info in stack.unwind_all() {
            for sub in subscribers().iter() {
                sub.exit_span(time, stack.id(), info, ExitReason::Unwinding);
            }
        }
    }
    for sub in subscribers().iter() {
        sub.destroy_call_stack(time, stack.id());
    }
    CALL_STACK_COUNT.decrease();
}

/// Atomically swaps the calling thread's bound call stack for `new`, which
/// must be suspended and unbound. Returns the previous stack, now unbound
/// and suspended.
pub fn replace_current_call_stack(mut new: Box<CallStack>) -> crate::error::Result<Box<CallStack>> {
    if new.state() != CallStackState::UnboundSuspended {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "replace_current_call_stack requires an unbound, suspended stack",
        ));
    }
    new.bind_active();
    CURRENT_STACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        let mut old = slot
            .take()
            .expect("tracing misuse: no current call stack to replace");
        old.suspend(false);
        old.unbind();
        *slot = Some(new);
        Ok(old)
    })
}

/// Suspends the current thread's call stack.
pub fn suspend_current_call_stack(mark_blocked: bool) {
    CURRENT_STACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        let stack = slot.as_mut().expect("tracing misuse: no current call stack");
        stack.suspend(mark_blocked);
    });
    let (time, id, blocked) = CURRENT_STACK.with(|slot| {
        let slot = slot.borrow();
        let stack = slot.as_ref().unwrap();
        (now(), stack.id(), mark_blocked)
    });
    for sub in subscribers().iter() {
        sub.suspend_call_stack(time, id, blocked);
    }
}

/// Resumes the current thread's suspended, non-blocked call stack.
pub fn resume_current_call_stack() {
    CURRENT_STACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        slot.as_mut()
            .expect("tracing misuse: no current call stack")
            .resume();
    });
    let (time, id) = CURRENT_STACK.with(|slot| {
        let slot = slot.borrow();
        let stack = slot.as_ref().unwrap();
        (now(), stack.id())
    });
    for sub in subscribers().iter() {
        sub.resume_call_stack(time, id);
    }
}

/// Unblocks the current thread's blocked call stack.
pub fn unblock_current_call_stack() {
    CURRENT_STACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        slot.as_mut()
            .expect("tracing misuse: no current call stack")
            .unblock();
    });
    let (time, id) = CURRENT_STACK.with(|slot| {
        let slot = slot.borrow();
        let stack = slot.as_ref().unwrap();
        (now(), stack.id())
    });
    for sub in subscribers().iter() {
        sub.unblock_call_stack(time, id);
    }
}

/// Enters a span on the current thread's call stack, formatting `message`
/// and dispatching `enter_span` to every subscriber.
pub fn enter_span(info: &'static EventInfo, override_level: Option<Level>, message: &str) {
    declare_if_new(info);
    let id = CURRENT_STACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        let stack = slot.as_mut().expect("tracing misuse: no current call stack");
        stack.enter_span(info, override_level);
        stack.id()
    });
    let time = now();
    for sub in subscribers().iter() {
        sub.enter_span(time, id, info, message);
    }
}

/// Exits a span, which must be the top frame on the current call stack
/// (Invariant 6; fatal otherwise).
pub fn exit_span(info: &'static EventInfo) {
    let id = CURRENT_STACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        let stack = slot.as_mut().expect("tracing misuse: no current call stack");
        stack.exit_span(info);
        stack.id()
    });
    let time = now();
    for sub in subscribers().iter() {
        sub.exit_span(time, id, info, ExitReason::Normal);
    }
}

/// Logs `message` at `info.level`, filtered by the current call stack's
/// `max_level`.
pub fn log_message(info: &'static EventInfo, message: &str) {
    declare_if_new(info);
    let (id, passes, span_chain) = CURRENT_STACK.with(|slot| {
        let slot = slot.borrow();
        let stack = slot.as_ref().expect("tracing misuse: no current call stack");
        (
            stack.id(),
            info.level.passes(stack.max_level()),
            stack.frame_chain(),
        )
    });
    if !passes {
        return;
    }
    let time = now();
    for sub in subscribers().iter() {
        sub.log_message(time, id, info, message, &span_chain);
    }
}

/// RAII guard pairing `enter_span`/`exit_span`, mirroring the diagnostic
/// context guard pattern used elsewhere in the runtime for scoped state.
pub struct SpanGuard {
    info: &'static EventInfo,
}

impl SpanGuard {
    /// Enters `info` as a span, returning a guard that exits it on drop.
    #[must_use]
    pub fn enter(info: &'static EventInfo, message: &str) -> Self {
        enter_span(info, None, message);
        Self { info }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        exit_span(self.info);
    }
}
