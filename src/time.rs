//! Monotonic runtime time and duration arithmetic (`SPEC_FULL.md` §B.1,
//! `spec.md` §8 Boundary behaviors: "Duration overflow saturates via
//! `*_saturating` but errors via `add`/`sub`").
//!
//! [`Time`] is nanoseconds since an unspecified but fixed origin — the
//! instant the hosting process's tracing subsystem started, matching the
//! wire protocol's "u64 ns since runtime start" (`spec.md` §4.5). It is a
//! plain newtype over `u64`, not a wall-clock timestamp; callers that need
//! one compose it with whatever OS-clock collaborator they already use
//! (`spec.md` §1 scopes raw OS time/clock access out of this crate).

use std::fmt;
use std::time::Duration;

use crate::error::{Error, ErrorKind};

/// Nanoseconds since the runtime's monotonic time origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The origin instant, `t = 0`.
    pub const ZERO: Self = Self(0);

    /// Constructs a `Time` directly from a nanosecond count.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Constructs a `Time` from a millisecond count, for test/demo code
    /// where nanosecond precision is noise.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// The raw nanosecond count since the origin.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// `self + duration`, erroring on overflow rather than wrapping/saturating
    /// (`spec.md` §8: "errors via `add`/`sub`").
    pub fn checked_add(self, duration: Duration) -> crate::error::Result<Self> {
        let nanos = u64::try_from(duration.as_nanos())
            .map_err(|_| Error::new(ErrorKind::Overflow, "duration exceeds u64 nanoseconds"))?;
        self.0
            .checked_add(nanos)
            .map(Self)
            .ok_or_else(|| Error::new(ErrorKind::Overflow, "Time::checked_add overflowed"))
    }

    /// `self - duration`, erroring on underflow.
    pub fn checked_sub(self, duration: Duration) -> crate::error::Result<Self> {
        let nanos = u64::try_from(duration.as_nanos())
            .map_err(|_| Error::new(ErrorKind::Overflow, "duration exceeds u64 nanoseconds"))?;
        self.0
            .checked_sub(nanos)
            .map(Self)
            .ok_or_else(|| Error::new(ErrorKind::Overflow, "Time::checked_sub underflowed"))
    }

    /// `self + duration`, saturating at `u64::MAX` nanoseconds instead of
    /// erroring (`spec.md` §8: "overflow saturates via `*_saturating`").
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// `self - duration`, saturating at zero instead of erroring.
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(nanos))
    }

    /// The duration elapsed between `earlier` and `self`, or `None` if
    /// `earlier` is after `self`.
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Option<Duration> {
        self.0
            .checked_sub(earlier.0)
            .map(Duration::from_nanos)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A source of monotonic [`Time`], abstracting over a real OS clock (used in
/// production) and a deterministic virtual clock (used by the lab-style
/// tests described in `SPEC_FULL.md` §A.4), mirroring the teacher's split
/// between a real clock and `LabRuntime`'s virtual time.
pub trait Clock: Send + Sync {
    /// The current time according to this clock.
    fn now(&self) -> Time;
}

/// A [`Clock`] backed by `std::time::Instant`, relative to the instant the
/// clock was constructed.
pub struct MonotonicClock {
    origin: std::time::Instant,
}

impl MonotonicClock {
    /// Starts a new clock with its origin at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Time {
        let nanos = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        Time::from_nanos(nanos)
    }
}

/// A [`Clock`] whose value is advanced explicitly by the caller, used by
/// deterministic tests (the [`crate::runtime::timer`] test suite in
/// particular) instead of sleeping real wall-clock time.
#[derive(Default)]
pub struct VirtualClock {
    now: std::sync::atomic::AtomicU64,
}

impl VirtualClock {
    /// Starts a virtual clock at `t = 0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Advances the clock by `duration`, returning the new time.
    pub fn advance(&self, duration: Duration) -> Time {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let new = self.now.fetch_add(nanos, std::sync::atomic::Ordering::AcqRel) + nanos;
        Time::from_nanos(new)
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Time {
        Time::from_nanos(self.now.load(std::sync::atomic::Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_errors_on_overflow() {
        let t = Time::from_nanos(u64::MAX);
        assert!(t.checked_add(Duration::from_nanos(1)).is_err());
    }

    #[test]
    fn checked_sub_errors_on_underflow() {
        let t = Time::ZERO;
        assert!(t.checked_sub(Duration::from_nanos(1)).is_err());
    }

    #[test]
    fn saturating_add_clamps_at_max() {
        let t = Time::from_nanos(u64::MAX - 1);
        assert_eq!(t.saturating_add(Duration::from_nanos(10)), Time::from_nanos(u64::MAX));
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        let t = Time::from_nanos(5);
        assert_eq!(t.saturating_sub(Duration::from_nanos(10)), Time::ZERO);
    }

    #[test]
    fn duration_since_requires_non_negative_order() {
        let later = Time::from_nanos(100);
        let earlier = Time::from_nanos(40);
        assert_eq!(later.duration_since(earlier), Some(Duration::from_nanos(60)));
        assert_eq!(earlier.duration_since(later), None);
    }

    #[test]
    fn virtual_clock_advances_deterministically() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now(), Time::ZERO);
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Time::from_millis(5));
    }

    #[test]
    fn monotonic_clock_is_non_decreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
