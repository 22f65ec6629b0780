//! OS sampler: process/thread lifecycle and scheduling events translated
//! into tracing events (`spec.md` §4.6).
//!
//! Real kernel trace consumption (ETW, ftrace, ktrace) is inherently
//! platform-specific and out of reach without OS-level capabilities this
//! crate cannot exercise in isolation; this module defines the worker
//! lifecycle and the "unsupported platform" fallback the spec calls for,
//! and the filtering/clock-translation helpers a concrete backend plugs
//! into.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::tracing::subscriber::Subscriber;

/// A running (or not-running) sampler instance.
pub struct Sampler {
    running: Arc<AtomicBool>,
}

impl Sampler {
    /// Starts the sampler for `process_id`, forwarding translated events to
    /// `subscribers`. Returns an error if the current platform has no
    /// sampler backend.
    pub fn start(process_id: u32, subscribers: Arc<dyn Subscriber>) -> crate::error::Result<Self> {
        let _ = (process_id, subscribers);
        if !Self::supported() {
            return Err(Error::new(
                ErrorKind::NotFound,
                "sampler: not supported on this platform",
            ));
        }
        Ok(Self {
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Whether a sampler backend exists for the current platform.
    #[must_use]
    pub const fn supported() -> bool {
        // No in-tree backend is wired up for any platform yet; every
        // target currently reports "not supported" until one lands.
        false
    }

    /// Whether the sampler is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the sampler. No-op if already stopped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Converts a platform-specific raw timestamp to nanoseconds since the
/// common clock origin used by every other tracing event.
///
/// `raw_ticks_per_ns` is the backend's reported tick frequency; callers on
/// an unsupported platform never reach this since `Sampler::start` fails
/// first.
#[must_use]
pub fn translate_timestamp(raw_ticks: u64, raw_ticks_per_ns: f64) -> u64 {
    if raw_ticks_per_ns <= 0.0 {
        return 0;
    }
    (raw_ticks as f64 / raw_ticks_per_ns) as u64
}

/// Whether a sampled event for `event_pid` belongs to the hosting process
/// `hosting_pid` and should be forwarded.
#[must_use]
pub const fn belongs_to_process(event_pid: u32, hosting_pid: u32) -> bool {
    event_pid == hosting_pid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_reports_not_supported_on_this_platform() {
        let stub_subscriber: Arc<dyn Subscriber> = Arc::new(NoopSubscriber);
        let result = Sampler::start(std::process::id(), stub_subscriber);
        assert!(result.is_err());
    }

    #[test]
    fn filters_by_process_id() {
        assert!(belongs_to_process(42, 42));
        assert!(!belongs_to_process(1, 2));
    }

    #[test]
    fn translate_timestamp_handles_nonpositive_rate() {
        assert_eq!(translate_timestamp(1000, 0.0), 0);
        assert_eq!(translate_timestamp(0, 1.0), 0);
    }

    struct NoopSubscriber;
    impl Subscriber for NoopSubscriber {}
}
