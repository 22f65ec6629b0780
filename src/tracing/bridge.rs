//! Bridge forwarding runtime tracing events into a host-installed
//! `tracing` crate dispatcher (`tracing-integration` feature,
//! `SPEC_FULL.md` §B.5).
//!
//! Useful when this runtime is embedded inside a larger Rust process that
//! already has its own `tracing` subscriber (e.g. `tracing-subscriber`'s
//! fmt layer) installed and wants the runtime's events to show up there
//! too, instead of only through the runtime's own stderr/network
//! subscribers.

use crate::tracing::event_info::EventInfo;
use crate::tracing::subscriber::{CallStackId, ExitReason, Subscriber, Timestamp};
use crate::tracing::Level;

/// A [`Subscriber`] that re-emits every event through `tracing::event!`.
#[derive(Debug, Default)]
pub struct TracingBridge;

fn emit(level: Level, target: &'static str, file: &'static str, line: u32, message: &str) {
    match level {
        Level::Off => {}
        Level::Error => tracing::event!(tracing::Level::ERROR, target = target, file, line, "{}", message),
        Level::Warn => tracing::event!(tracing::Level::WARN, target = target, file, line, "{}", message),
        Level::Info => tracing::event!(tracing::Level::INFO, target = target, file, line, "{}", message),
        Level::Debug => tracing::event!(tracing::Level::DEBUG, target = target, file, line, "{}", message),
        Level::Trace => tracing::event!(tracing::Level::TRACE, target = target, file, line, "{}", message),
    }
}

impl Subscriber for TracingBridge {
    fn log_message(
        &self,
        _time: Timestamp,
        _stack: CallStackId,
        info: &'static EventInfo,
        message: &str,
        _span_chain: &[&'static EventInfo],
    ) {
        emit(info.level, info.target, info.file, info.line, message);
    }

    fn enter_span(&self, _time: Timestamp, _stack: CallStackId, info: &'static EventInfo, message: &str) {
        emit(info.level, info.target, info.file, info.line, &format!("enter: {message}"));
    }

    fn exit_span(&self, _time: Timestamp, _stack: CallStackId, info: &'static EventInfo, reason: ExitReason) {
        let suffix = match reason {
            ExitReason::Normal => "exit",
            ExitReason::Unwinding => "exit (unwinding)",
        };
        emit(info.level, info.target, info.file, info.line, suffix);
    }
}
