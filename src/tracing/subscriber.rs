//! The subscriber fan-out vtable (`spec.md` §4.3 "Subscriber fan-out").
//!
//! A fixed slice of subscribers is installed at context init and never
//! mutated afterward, so dispatch never needs to lock the registry itself —
//! only individual subscribers (the stderr worker's queue, the network
//! worker's socket) serialize their own state. Every method has a no-op
//! default so a subscriber interested in only e.g. `log_message` doesn't
//! have to stub out the other nineteen.

use crate::tracing::event_info::EventInfo;
use crate::tracing::Level;

/// Nanoseconds since an unspecified but fixed epoch (runtime start, for
/// most events; Unix epoch where the event description says so).
pub type Timestamp = u64;

/// Identifies a call stack across `create`/`destroy`/span events.
pub type CallStackId = u64;

/// Whether a span exit happened as part of normal control flow or as part
/// of an abort/unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Ordinary `exit_span`.
    Normal,
    /// Unwound as part of an abort.
    Unwinding,
}

/// The full set of events a subscriber may observe (`spec.md` §4.5 "Event
/// tags").
pub trait Subscriber: Send + Sync {
    /// The subscriber is being installed; `time` is the runtime's start
    /// timestamp.
    fn start(&self, time: Timestamp) {
        let _ = time;
    }
    /// The subscriber is being torn down; no further calls will follow.
    fn finish(&self, time: Timestamp) {
        let _ = time;
    }

    /// A thread registered with the tracing subsystem.
    fn register_thread(&self, time: Timestamp) {
        let _ = time;
    }
    /// A thread unregistered.
    fn unregister_thread(&self, time: Timestamp) {
        let _ = time;
    }

    /// A new call stack was allocated.
    fn create_call_stack(&self, time: Timestamp, stack: CallStackId) {
        let _ = (time, stack);
    }
    /// A call stack was destroyed.
    fn destroy_call_stack(&self, time: Timestamp, stack: CallStackId) {
        let _ = (time, stack);
    }
    /// A call stack transitioned `BoundBlocked -> BoundSuspended`.
    fn unblock_call_stack(&self, time: Timestamp, stack: CallStackId) {
        let _ = (time, stack);
    }
    /// A call stack transitioned `BoundActive -> BoundSuspended[&Blocked]`.
    fn suspend_call_stack(&self, time: Timestamp, stack: CallStackId, blocked: bool) {
        let _ = (time, stack, blocked);
    }
    /// A call stack transitioned `BoundSuspended -> BoundActive`.
    fn resume_call_stack(&self, time: Timestamp, stack: CallStackId) {
        let _ = (time, stack);
    }

    /// A span was entered; `message` is the formatted entry message.
    fn enter_span(&self, time: Timestamp, stack: CallStackId, info: &'static EventInfo, message: &str) {
        let _ = (time, stack, info, message);
    }
    /// A span was exited.
    fn exit_span(&self, time: Timestamp, stack: CallStackId, info: &'static EventInfo, reason: ExitReason) {
        let _ = (time, stack, info, reason);
    }

    /// A log message passed the `max_level` filter. `span_chain` is the
    /// currently entered spans on `stack`, outermost first, for subscribers
    /// that want to print a backtrace alongside the message.
    fn log_message(
        &self,
        time: Timestamp,
        stack: CallStackId,
        info: &'static EventInfo,
        message: &str,
        span_chain: &[&'static EventInfo],
    ) {
        let _ = (time, stack, info, message, span_chain);
    }

    /// An `EventInfo` was observed on this subscriber for the first time.
    fn declare_event_info(&self, time: Timestamp, info: &'static EventInfo) {
        let _ = (time, info);
    }

    /// Sampler: a new OS thread started.
    fn start_thread(&self, time: Timestamp, os_tid: u64) {
        let _ = (time, os_tid);
    }
    /// Sampler: an OS thread stopped.
    fn stop_thread(&self, time: Timestamp, os_tid: u64) {
        let _ = (time, os_tid);
    }
    /// Sampler: an image (executable/shared library) was loaded.
    fn load_image(&self, time: Timestamp, path: &str, base: u64) {
        let _ = (time, path, base);
    }
    /// Sampler: an image was unloaded.
    fn unload_image(&self, time: Timestamp, base: u64) {
        let _ = (time, base);
    }
    /// Sampler: the scheduler switched which thread runs on a CPU.
    fn context_switch(&self, time: Timestamp, from_tid: u64, to_tid: u64) {
        let _ = (time, from_tid, to_tid);
    }
    /// Sampler: a sleeping thread was woken.
    fn thread_wakeup(&self, time: Timestamp, os_tid: u64) {
        let _ = (time, os_tid);
    }
    /// Sampler: a stack sample for `os_tid`, as raw frame addresses.
    fn call_stack_sample(&self, time: Timestamp, os_tid: u64, frames: &[u64]) {
        let _ = (time, os_tid, frames);
    }
}

/// A fixed, never-mutated fan-out list of subscribers, installed once at
/// tracing init.
#[derive(Default)]
pub struct SubscriberSet {
    subscribers: Vec<std::sync::Arc<dyn Subscriber>>,
}

impl SubscriberSet {
    /// Builds a fan-out set from a fixed list.
    #[must_use]
    pub fn new(subscribers: Vec<std::sync::Arc<dyn Subscriber>>) -> Self {
        Self { subscribers }
    }

    /// Iterates the installed subscribers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &std::sync::Arc<dyn Subscriber>> {
        self.subscribers.iter()
    }

    /// Whether any subscribers are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSubscriber(AtomicUsize);

    impl Subscriber for CountingSubscriber {
        fn log_message(
            &self,
            _time: Timestamp,
            _stack: CallStackId,
            _info: &'static EventInfo,
            _message: &str,
            _span_chain: &[&'static EventInfo],
        ) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn fan_out_reaches_every_subscriber() {
        let a = Arc::new(CountingSubscriber(AtomicUsize::new(0)));
        let b = Arc::new(CountingSubscriber(AtomicUsize::new(0)));
        let set = SubscriberSet::new(vec![a.clone(), b.clone()]);

        static INFO: EventInfo = EventInfo::new("f.rs", 1, "t", Level::Info, "m");
        for sub in set.iter() {
            sub.log_message(0, 0, &INFO, "hello", &[]);
        }

        assert_eq!(a.0.load(Ordering::Relaxed), 1);
        assert_eq!(b.0.load(Ordering::Relaxed), 1);
    }
}
