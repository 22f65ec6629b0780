//! Per-thread call stack state machine (`spec.md` §4.3, Invariant 6, Invariant 7).
//!
//! A `CallStack` is either unbound (not attached to any thread) or bound to
//! exactly one thread, and while bound is either active, suspended, or
//! blocked. Entering/exiting a span is only legal while bound & active;
//! `mod.rs` is responsible for actually attaching a `CallStack` to a
//! thread-local slot, this type only tracks the FSM and the frame stack
//! itself, mirroring the separation the diagnostic-context guard pattern
//! uses between the stack and its thread-local storage.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::tracing::event_info::EventInfo;
use crate::tracing::Level;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The call-stack state machine (`spec.md` §4.3 "Call stack FSM").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStackState {
    /// Not attached to any thread.
    UnboundSuspended,
    /// Attached and actively running on its thread.
    BoundActive,
    /// Attached but suspended, not blocked.
    BoundSuspended,
    /// Attached, suspended, and blocked (e.g. awaiting I/O).
    BoundBlocked,
}

/// A single entered span.
#[derive(Debug)]
struct Frame {
    info: *const EventInfo,
    previous_max_level: Level,
}

/// A call stack: FSM state plus the LIFO frame stack of currently entered
/// spans.
#[derive(Debug)]
pub struct CallStack {
    id: u64,
    state: CallStackState,
    frames: Vec<Frame>,
    max_level: Level,
    base_level: Level,
}

impl CallStack {
    /// Creates a new call stack in `UnboundSuspended`, with `base_level` as
    /// the initial (least restrictive) filtering level.
    #[must_use]
    pub fn new(base_level: Level) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: CallStackState::UnboundSuspended,
            frames: Vec::new(),
            max_level: base_level,
            base_level,
        }
    }

    /// A process-unique identifier, stable for the lifetime of this stack,
    /// used to correlate subscriber events.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current FSM state.
    #[must_use]
    pub const fn state(&self) -> CallStackState {
        self.state
    }

    /// The effective filter level: the minimum (most restrictive) level
    /// along the current frame path (Invariant 7).
    #[must_use]
    pub const fn max_level(&self) -> Level {
        self.max_level
    }

    /// Whether the frame stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Binds this (unbound, suspended) stack to the current thread as
    /// active. Used both for `initBound` and for `replace_current_call_stack`
    /// installing a new stack.
    pub fn bind_active(&mut self) {
        assert!(
            self.state == CallStackState::UnboundSuspended,
            "call stack misuse: bind requires an unbound, suspended stack"
        );
        self.state = CallStackState::BoundActive;
    }

    /// Unbinds a bound, suspended stack back to `UnboundSuspended`. Used
    /// when a stack is displaced by `replace_current_call_stack`.
    pub fn unbind(&mut self) {
        assert!(
            self.state == CallStackState::BoundSuspended,
            "call stack misuse: unbind requires a bound, suspended stack"
        );
        self.state = CallStackState::UnboundSuspended;
    }

    /// `suspend`: `BoundActive -> BoundSuspended` (optionally `BoundBlocked`).
    pub fn suspend(&mut self, mark_blocked: bool) {
        assert!(
            self.state == CallStackState::BoundActive,
            "call stack misuse: suspend requires BoundActive"
        );
        self.state = if mark_blocked {
            CallStackState::BoundBlocked
        } else {
            CallStackState::BoundSuspended
        };
    }

    /// `resume`: requires `BoundSuspended` and not blocked ⇒ `BoundActive`.
    pub fn resume(&mut self) {
        assert!(
            self.state == CallStackState::BoundSuspended,
            "call stack misuse: resume requires BoundSuspended (not blocked)"
        );
        self.state = CallStackState::BoundActive;
    }

    /// `unblock`: requires `BoundBlocked` ⇒ `BoundSuspended`.
    pub fn unblock(&mut self) {
        assert!(
            self.state == CallStackState::BoundBlocked,
            "call stack misuse: unblock requires BoundBlocked"
        );
        self.state = CallStackState::BoundSuspended;
    }

    /// Pushes a frame for `info`, tightening `max_level` if `override_level`
    /// is more restrictive than the current one.
    ///
    /// Fatal (panics) unless the stack is `BoundActive` (Invariant 6).
    pub fn enter_span(&mut self, info: &'static EventInfo, override_level: Option<Level>) {
        assert!(
            self.state == CallStackState::BoundActive,
            "call stack misuse: enter_span requires BoundActive"
        );
        let previous_max_level = self.max_level;
        if let Some(level) = override_level {
            self.max_level = self.max_level.min(level);
        }
        self.frames.push(Frame {
            info: std::ptr::from_ref(info),
            previous_max_level,
        });
    }

    /// Pops the top frame, which must be `info` (Invariant 6). Fatal
    /// otherwise.
    pub fn exit_span(&mut self, info: &'static EventInfo) {
        assert!(
            self.state == CallStackState::BoundActive,
            "call stack misuse: exit_span requires BoundActive"
        );
        let top = self
            .frames
            .last()
            .expect("call stack misuse: exit_span on an empty frame stack");
        assert!(
            top.info == std::ptr::from_ref(info),
            "call stack misuse: exit_span target does not match the top frame"
        );
        let frame = self.frames.pop().expect("checked non-empty above");
        self.max_level = frame.previous_max_level;
    }

    /// The chain of currently entered spans, outermost first. Used by
    /// subscribers (the stderr worker in particular) to print a backtrace
    /// alongside a log message.
    pub fn frame_chain(&self) -> Vec<&'static EventInfo> {
        self.frames
            .iter()
            // SAFETY: every pushed frame's `info` came from a `&'static
            // EventInfo` in `enter_span`.
            .map(|frame| unsafe { &*frame.info })
            .collect()
    }

    /// Unwinds every remaining frame (LIFO), as on `abort`/`deinit_call_stack`.
    /// Returns the infos in unwind order, for the caller to fire `exit_span`
    /// events with `is_unwinding=true`.
    pub fn unwind_all(&mut self) -> Vec<&'static EventInfo> {
        let mut unwound = Vec::with_capacity(self.frames.len());
        while let Some(frame) = self.frames.pop() {
            self.max_level = frame.previous_max_level;
            // SAFETY: every pushed frame's `info` came from a `&'static
            // EventInfo` in `enter_span`.
            unwound.push(unsafe { &*frame.info });
        }
        debug_assert_eq!(self.max_level, self.base_level);
        unwound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INFO_A: EventInfo = EventInfo::new("a.rs", 1, "t", Level::Info, "a");
    static INFO_B: EventInfo = EventInfo::new("b.rs", 2, "t", Level::Info, "b");

    #[test]
    fn bind_and_enter_exit_roundtrip() {
        let mut stack = CallStack::new(Level::Trace);
        stack.bind_active();
        stack.enter_span(&INFO_A, None);
        stack.enter_span(&INFO_B, Some(Level::Warn));
        assert_eq!(stack.max_level(), Level::Warn);
        stack.exit_span(&INFO_B);
        assert_eq!(stack.max_level(), Level::Trace);
        stack.exit_span(&INFO_A);
        assert!(stack.is_empty());
    }

    #[test]
    #[should_panic(expected = "does not match the top frame")]
    fn exit_out_of_order_is_fatal() {
        let mut stack = CallStack::new(Level::Trace);
        stack.bind_active();
        stack.enter_span(&INFO_A, None);
        stack.enter_span(&INFO_B, None);
        stack.exit_span(&INFO_A);
    }

    #[test]
    #[should_panic(expected = "requires BoundActive")]
    fn enter_while_blocked_is_fatal() {
        let mut stack = CallStack::new(Level::Trace);
        stack.bind_active();
        stack.suspend(true);
        stack.enter_span(&INFO_A, None);
    }

    #[test]
    fn suspend_resume_unblock_cycle() {
        let mut stack = CallStack::new(Level::Trace);
        stack.bind_active();
        stack.suspend(true);
        assert_eq!(stack.state(), CallStackState::BoundBlocked);
        stack.unblock();
        assert_eq!(stack.state(), CallStackState::BoundSuspended);
        stack.resume();
        assert_eq!(stack.state(), CallStackState::BoundActive);
    }

    #[test]
    fn unwind_all_restores_base_level() {
        let mut stack = CallStack::new(Level::Trace);
        stack.bind_active();
        stack.enter_span(&INFO_A, Some(Level::Error));
        stack.enter_span(&INFO_B, Some(Level::Warn));
        let unwound = stack.unwind_all();
        assert_eq!(unwound.len(), 2);
        assert_eq!(stack.max_level(), Level::Trace);
        assert!(stack.is_empty());
    }

    fn level_from_tag(tag: u8) -> Level {
        match tag % 6 {
            0 => Level::Off,
            1 => Level::Error,
            2 => Level::Warn,
            3 => Level::Info,
            4 => Level::Debug,
            _ => Level::Trace,
        }
    }

    proptest::proptest! {
        // Invariant 7: `max_level` is always the minimum (most restrictive)
        // override along the path of currently open frames, never anything
        // looser, regardless of how deeply or unevenly spans are nested.
        #[test]
        fn max_level_is_always_the_minimum_override_on_the_open_path(
            overrides in proptest::collection::vec(proptest::option::of(0u8..6u8), 0..16)
        ) {
            let mut stack = CallStack::new(Level::Trace);
            stack.bind_active();

            let mut expected = vec![Level::Trace];
            for raw in &overrides {
                let override_level = raw.map(level_from_tag);
                stack.enter_span(&INFO_A, override_level);
                let next = match override_level {
                    Some(level) => (*expected.last().unwrap()).min(level),
                    None => *expected.last().unwrap(),
                };
                expected.push(next);
                proptest::prop_assert_eq!(stack.max_level(), next);
            }

            for _ in &overrides {
                stack.exit_span(&INFO_A);
                expected.pop();
                proptest::prop_assert_eq!(stack.max_level(), *expected.last().unwrap());
            }
            proptest::prop_assert!(stack.is_empty());
        }
    }
}
