//! Event-info interning cache (`spec.md` §4.3).
//!
//! Every call site that can emit a tracing event owns a `'static`
//! [`EventInfo`] describing it (file, line, target, level, message
//! template). The first time a given `EventInfo` is actually emitted, the
//! cache notices and reports "newly cached" so `mod.rs` can fan out a
//! synthetic `declare_event_info` event to subscribers exactly once per
//! info; afterward lookups are a relaxed load.

use std::sync::atomic::{AtomicPtr, Ordering};

use crate::tracing::Level;

/// Static, call-site-scoped description of something that can be traced.
#[derive(Debug)]
pub struct EventInfo {
    /// Source file the event was emitted from.
    pub file: &'static str,
    /// Source line.
    pub line: u32,
    /// A logical grouping, analogous to a logger name / module path.
    pub target: &'static str,
    /// The severity this event is emitted at.
    pub level: Level,
    /// A human-readable name, e.g. the span or message template.
    pub name: &'static str,
}

impl EventInfo {
    /// Declares a new, uninterned event info.
    #[must_use]
    pub const fn new(file: &'static str, line: u32, target: &'static str, level: Level, name: &'static str) -> Self {
        Self {
            file,
            line,
            target,
            level,
            name,
        }
    }
}

const CACHE_SLOTS: usize = 4096;

/// Hash-indexed cache of every `EventInfo` seen so far on this process.
///
/// Collisions are resolved by simply re-declaring: at worst a subscriber
/// observes `declare_event_info` twice for the info that lost the race,
/// which the spec calls out as acceptable ("collisions cause a single
/// re-declaration; never incorrect behavior").
pub struct EventInfoCache {
    slots: [AtomicPtr<EventInfo>; CACHE_SLOTS],
}

#[allow(clippy::declare_interior_mutable_const)]
const NULL_SLOT: AtomicPtr<EventInfo> = AtomicPtr::new(std::ptr::null_mut());

impl EventInfoCache {
    const fn new() -> Self {
        Self {
            slots: [NULL_SLOT; CACHE_SLOTS],
        }
    }

    fn hash(info: *const EventInfo) -> usize {
        (info as usize / std::mem::align_of::<EventInfo>().max(1)) % CACHE_SLOTS
    }

    /// Registers `info` (a `'static` reference) in the cache.
    ///
    /// Returns `true` if this call is the one that newly cached `info`
    /// (i.e. the caller should emit `declare_event_info`), `false` if some
    /// other reference already occupies the slot.
    pub fn cache_info(&self, info: &'static EventInfo) -> bool {
        let ptr = std::ptr::from_ref(info).cast_mut();
        let idx = Self::hash(ptr);
        let slot = &self.slots[idx];
        match slot.compare_exchange(std::ptr::null_mut(), ptr, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => true,
            Err(existing) => existing != ptr && slot.swap(ptr, Ordering::AcqRel) != ptr,
        }
    }
}

impl Default for EventInfoCache {
    fn default() -> Self {
        Self::new()
    }
}

static CACHE: EventInfoCache = EventInfoCache::new();

/// The process-wide event-info cache.
#[must_use]
pub fn cache() -> &'static EventInfoCache {
    &CACHE
}

#[cfg(test)]
mod tests {
    use super::*;

    static INFO_A: EventInfo = EventInfo::new("a.rs", 1, "t", Level::Info, "a");
    static INFO_B: EventInfo = EventInfo::new("b.rs", 2, "t", Level::Info, "b");

    #[test]
    fn first_emission_is_newly_cached() {
        let cache = EventInfoCache::new();
        assert!(cache.cache_info(&INFO_A));
    }

    #[test]
    fn repeated_emission_is_not_newly_cached() {
        let cache = EventInfoCache::new();
        assert!(cache.cache_info(&INFO_A));
        assert!(!cache.cache_info(&INFO_A));
        assert!(!cache.cache_info(&INFO_A));
    }

    #[test]
    fn distinct_infos_can_both_be_newly_cached() {
        let cache = EventInfoCache::new();
        assert!(cache.cache_info(&INFO_A));
        assert!(cache.cache_info(&INFO_B));
    }
}
