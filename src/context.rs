//! Process-wide context lifecycle: `init`/`deinit`, the tagged config record
//! list, and the global refcounted `Handle` (`spec.md` §4.1, §6.1).
//!
//! Everything else in this crate is reachable without a `Handle` — the
//! tracing, async, and modules subsystems are free functions and
//! independently constructible types, not methods gated behind a context
//! object. `Handle` exists for the thing the spec actually needs a process
//! singleton for: one shared event loop and one shared module graph that
//! every subsystem user agrees to tear down together, plus the version
//! handshake a caller performs once before touching any of it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, ErrorKind, Result};
use crate::modules::{DependencyGraph, Loader};
use crate::result;
use crate::runtime::EventLoop;
use crate::thread_state;
use crate::tracing::{self, Level, Subscriber};
use crate::version::Version;

/// The runtime's own compiled-in version (`spec.md` §4.1 `get_version`).
pub const RUNTIME_VERSION: Version = Version::new(0, 1, 0);

/// The `tracing_config` tagged record (`spec.md` §6.1).
#[derive(Clone)]
pub struct TracingConfig {
    /// Call stacks created after `init` start with this as their base level
    /// (`spec.md` §3 Invariant 7's `max_level`, seeded here).
    pub max_level: Level,
    /// The fixed subscriber fan-out installed for the life of the context.
    pub subscribers: Vec<Arc<dyn Subscriber>>,
    /// Per-thread format buffer size in bytes. Stored for API completeness;
    /// this Rust rendering formats into heap `String`s rather than a
    /// preallocated buffer (see `src/tracing/stderr.rs`'s `MAX_MESSAGE_LEN`
    /// for the analogous truncation bound), so this does not itself bound
    /// anything, but a future fixed-buffer subscriber can read it back off
    /// the config that installed it.
    pub format_buffer_len: usize,
    /// Application name reported by subscribers that print one (e.g. a
    /// future log-file header); not currently read by any subscriber in
    /// this crate.
    pub app_name: Arc<str>,
    /// Whether `init` should also register the calling thread.
    pub register_thread: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            max_level: Level::Info,
            subscribers: Vec::new(),
            format_buffer_len: 1024,
            app_name: Arc::from("fimo_runtime"),
            register_thread: true,
        }
    }
}

/// Module loading profile (`modules_config.profile`, `spec.md` §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Optimized, no extra diagnostics.
    #[default]
    Release,
    /// Development profile; loaders may enable extra validation.
    Dev,
}

/// A requested loader feature's desired state (`modules_config.feature_requests[].flag`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureFlag {
    /// The feature must be available; its absence fails `init`. Checked
    /// against [`known_feature`] by [`init`]: a `Required` request for a
    /// tag this loader doesn't recognize fails with
    /// [`ErrorKind::InvalidInput`].
    Required,
    /// Enable the feature if available; a no-op if it isn't.
    On,
    /// Disable the feature even if available; a no-op if it isn't.
    Off,
}

/// Whether this crate's loader currently recognizes `tag` as an available
/// feature (`modules_config.feature_requests[].tag`, `spec.md` §6.1).
///
/// Feature tags are opaque and namespaced by the loader/build that defines
/// them; this core crate does not yet implement any optional,
/// feature-gated loader capability, so every tag is presently unknown.
/// `init` still evaluates `feature_requests` against this: a tag with
/// [`FeatureFlag::Required`] that isn't known here fails `init`, matching
/// the documented contract, while `On`/`Off` requests for an unknown tag
/// resolve to a harmless no-op. Extend this (and the registry backing it)
/// the day the loader grows its first real optional feature.
#[must_use]
const fn known_feature(_tag: u16) -> bool {
    false
}

/// One entry of `modules_config.feature_requests[]`.
#[derive(Debug, Clone, Copy)]
pub struct FeatureRequest {
    /// Opaque feature tag, namespaced by the loader/build that defines it.
    pub tag: u16,
    /// The requested state.
    pub flag: FeatureFlag,
}

/// The `modules_config` tagged record (`spec.md` §6.1).
#[derive(Clone, Default)]
pub struct ModulesConfig {
    /// Loading profile.
    pub profile: Profile,
    /// Requested loader feature flags, evaluated in order.
    pub feature_requests: Vec<FeatureRequest>,
}

/// One tagged record in the ordered list `init` accepts (`spec.md` §6.1
/// "Recognized config tags"). Each variant corresponds to exactly one tag;
/// supplying the same variant twice is rejected by [`init`] as a duplicate
/// tag.
pub enum ConfigRecord {
    /// The `tracing_config` tag.
    TracingConfig(TracingConfig),
    /// The `modules_config` tag.
    ModulesConfig(ModulesConfig),
}

struct ContextInner {
    event_loop: Arc<EventLoop>,
    graph: Arc<Mutex<DependencyGraph>>,
    loader: Mutex<Loader>,
    modules_config: ModulesConfig,
}

static CONTEXT: Mutex<Option<Arc<ContextInner>>> = Mutex::new(None);
static HANDLE_COUNT: AtomicU32 = AtomicU32::new(0);

/// A refcounted registration against the live, process-wide context
/// (`spec.md` §4.1 `Handle`).
///
/// Acquiring a handle asserts the runtime's compiled-in version
/// [`satisfies`](Version::satisfies) the caller's compile-time expectation;
/// every subsystem entry point that needs the shared event loop or module
/// graph takes a `&Handle` rather than reaching for ambient global state
/// directly, so the one place a caller can get that wrong is here, at
/// acquisition.
pub struct Handle {
    inner: Arc<ContextInner>,
}

impl Handle {
    /// Acquires a handle to the live context, asserting version
    /// compatibility with `required`.
    ///
    /// # Errors
    /// Returns [`ErrorKind::VersionNotSupported`] if the runtime's compiled
    /// version does not [`satisfy`](Version::satisfies) `required`, or
    /// [`ErrorKind::InvalidInput`] if no context is currently initialized.
    pub fn acquire(required: &Version) -> Result<Self> {
        if !RUNTIME_VERSION.satisfies(required) {
            return Err(Error::with_message(
                ErrorKind::VersionNotSupported,
                format!(
                    "runtime version {RUNTIME_VERSION} does not satisfy required version {required}"
                ),
            ));
        }
        let guard = CONTEXT.lock().unwrap();
        let Some(inner) = guard.as_ref() else {
            return Err(Error::new(ErrorKind::InvalidInput, "context is not initialized"));
        };
        let inner = Arc::clone(inner);
        drop(guard);
        HANDLE_COUNT.fetch_add(1, Ordering::AcqRel);
        Ok(Self { inner })
    }

    /// The runtime's compiled-in version.
    #[must_use]
    pub const fn get_version(&self) -> Version {
        RUNTIME_VERSION
    }

    /// The event loop backing this context's async subsystem.
    #[must_use]
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.inner.event_loop
    }

    /// The module dependency graph backing this context's modules subsystem.
    #[must_use]
    pub fn module_graph(&self) -> &Arc<Mutex<DependencyGraph>> {
        &self.inner.graph
    }

    /// The modules config this context was initialized with.
    #[must_use]
    pub fn modules_config(&self) -> &ModulesConfig {
        &self.inner.modules_config
    }

    /// Runs `f` with exclusive access to the context's loader scratch space
    /// (`spec.md` §4.11).
    pub fn with_loader<R>(&self, f: impl FnOnce(&mut Loader) -> R) -> R {
        let mut loader = self.inner.loader.lock().unwrap();
        f(&mut loader)
    }

    /// Whether the calling thread's current result is an error
    /// (`spec.md` §4.1 `has_error_result`).
    #[must_use]
    pub fn has_error_result(&self) -> bool {
        result::has_error_result()
    }

    /// Replaces the calling thread's current result, returning the previous
    /// one (`spec.md` §4.1 `replace_result`).
    pub fn replace_result(&self, new: Option<Error>) -> Option<Error> {
        result::replace_result(new)
    }

    /// Takes the calling thread's current result, resetting it to `ok`
    /// (`spec.md` §4.1 `take_result`).
    pub fn take_result(&self) -> Option<Error> {
        result::take_result()
    }

    /// Sets the calling thread's current result (`spec.md` §4.1 `set_result`).
    pub fn set_result(&self, new: Option<Error>) {
        result::set_result(new);
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        HANDLE_COUNT.fetch_add(1, Ordering::AcqRel);
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        HANDLE_COUNT.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The number of [`Handle`]s currently outstanding. Exposed for tests and
/// diagnostics; `deinit` does not itself wait on this (it waits on the
/// per-subsystem `ResourceCount`s instead, per §4.1's documented order),
/// so a caller that drops its last handle without calling `deinit` leaks
/// the context rather than freeing it implicitly — matching the spec's
/// explicit, caller-driven teardown.
#[must_use]
pub fn outstanding_handles() -> u32 {
    HANDLE_COUNT.load(Ordering::Acquire)
}

/// Initializes the process-wide context from an ordered list of tagged
/// config records (`spec.md` §4.1, §6.1).
///
/// Rejects with [`ErrorKind::InvalidInput`] — rather than panicking — if a
/// tag repeats, if the context is already initialized, or if
/// `modules_config.feature_requests` names a [`FeatureFlag::Required`]
/// feature tag this loader doesn't recognize (see [`known_feature`]).
/// Every [`ConfigRecord`] variant already corresponds to exactly one of the
/// two recognized tags, so there is no "unknown tag" case to reject at this
/// typed layer (an untyped FFI boundary built on top of this constructor is
/// where an unrecognized tag number would be surfaced).
///
/// # Errors
/// See above.
pub fn init(options: Vec<ConfigRecord>) -> Result<Handle> {
    let mut tracing_config: Option<TracingConfig> = None;
    let mut modules_config: Option<ModulesConfig> = None;
    for option in options {
        match option {
            ConfigRecord::TracingConfig(cfg) => {
                if tracing_config.is_some() {
                    return Err(Error::new(ErrorKind::InvalidInput, "duplicate tracing_config tag"));
                }
                tracing_config = Some(cfg);
            }
            ConfigRecord::ModulesConfig(cfg) => {
                if modules_config.is_some() {
                    return Err(Error::new(ErrorKind::InvalidInput, "duplicate modules_config tag"));
                }
                modules_config = Some(cfg);
            }
        }
    }
    let tracing_config = tracing_config.unwrap_or_default();
    let modules_config = modules_config.unwrap_or_default();
    for request in &modules_config.feature_requests {
        if request.flag == FeatureFlag::Required && !known_feature(request.tag) {
            return Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!("required modules_config feature {} is not available", request.tag),
            ));
        }
    }

    let mut guard = CONTEXT.lock().unwrap();
    if guard.is_some() {
        return Err(Error::new(ErrorKind::InvalidInput, "context is already initialized"));
    }

    tracing::set_default_level(tracing_config.max_level);
    tracing::install_subscribers(tracing_config.subscribers);
    if tracing_config.register_thread {
        tracing::register_thread();
    }

    let event_loop = EventLoop::new();
    event_loop.start();
    let graph = Arc::new(Mutex::new(DependencyGraph::new()));
    let loader = Mutex::new(Loader::new(Arc::clone(&graph)));

    let inner = Arc::new(ContextInner {
        event_loop,
        graph,
        loader,
        modules_config,
    });
    *guard = Some(Arc::clone(&inner));
    drop(guard);

    HANDLE_COUNT.fetch_add(1, Ordering::AcqRel);
    Ok(Handle { inner })
}

/// Tears down the process-wide context (`spec.md` §4.1 `deinit`).
///
/// Idempotent: a second call with no intervening `init` is a no-op. Order,
/// per the spec: modules (drains every loaded instance), then async (stops
/// the event loop, cancelling anything still enqueued), then tracing
/// (fires `finish` on every subscriber), then thread-local state (blocks on
/// the registered-thread, call-stack, and error-result counts reaching
/// zero — Invariant 8).
pub fn deinit() {
    let inner = {
        let mut guard = CONTEXT.lock().unwrap();
        guard.take()
    };
    let Some(inner) = inner else {
        return;
    };

    drain_modules(&inner);
    inner.event_loop.stop();
    tracing::shutdown_subscribers();

    thread_state::registered_thread_count().wait_until_zero();
    tracing::call_stack_count().wait_until_zero();
    result::error_result_count().wait_until_zero();
}

/// Marks every remaining instance unloadable and removes it once its
/// dependents and strong count allow, repeating until no further progress
/// is made. Any instance still held by an outstanding strong reference (or
/// with a live dependent holding one) simply survives past `deinit` inside
/// `inner`'s `Arc`, released only once that last reference drops — `deinit`
/// does not forcibly invalidate live instance pointers.
fn drain_modules(inner: &ContextInner) {
    let mut graph = inner.graph.lock().unwrap();
    loop {
        let indices = graph.indices();
        if indices.is_empty() {
            return;
        }
        for &index in &indices {
            if let Some(instance) = graph.instance(index) {
                instance.handle().mark_unloadable();
            }
        }
        let mut removed_any = false;
        for &index in &indices {
            if graph.can_unload(index) && graph.remove_instance(index).is_ok() {
                removed_any = true;
            }
        }
        if !removed_any {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    // Serializes tests against the process-global context; `init`/`deinit`
    // racing across test threads would otherwise make every other test in
    // this module flaky.
    static CONTEXT_TEST_LOCK: StdMutex<()> = StdMutex::new(());

    #[test]
    fn init_rejects_duplicate_tag() {
        let _guard = CONTEXT_TEST_LOCK.lock().unwrap();
        deinit();
        let err = init(vec![
            ConfigRecord::TracingConfig(TracingConfig {
                register_thread: false,
                ..TracingConfig::default()
            }),
            ConfigRecord::TracingConfig(TracingConfig::default()),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        deinit();
    }

    #[test]
    fn double_init_is_rejected() {
        let _guard = CONTEXT_TEST_LOCK.lock().unwrap();
        deinit();
        let handle = init(vec![ConfigRecord::TracingConfig(TracingConfig {
            register_thread: false,
            ..TracingConfig::default()
        })])
        .unwrap();
        let err = init(vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        drop(handle);
        deinit();
    }

    #[test]
    fn deinit_without_init_is_a_harmless_no_op() {
        let _guard = CONTEXT_TEST_LOCK.lock().unwrap();
        deinit();
        deinit();
    }

    #[test]
    fn handle_acquire_rejects_incompatible_major_version() {
        let _guard = CONTEXT_TEST_LOCK.lock().unwrap();
        deinit();
        let _handle = init(vec![ConfigRecord::TracingConfig(TracingConfig {
            register_thread: false,
            ..TracingConfig::default()
        })])
        .unwrap();
        let required = Version::new(RUNTIME_VERSION.major + 1, 0, 0);
        let err = Handle::acquire(&required).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionNotSupported);
        deinit();
    }

    #[test]
    fn handle_acquire_without_init_fails() {
        let _guard = CONTEXT_TEST_LOCK.lock().unwrap();
        deinit();
        let err = Handle::acquire(&RUNTIME_VERSION).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn init_then_deinit_drains_an_empty_loader_cleanly() {
        let _guard = CONTEXT_TEST_LOCK.lock().unwrap();
        deinit();
        let handle = init(vec![
            ConfigRecord::TracingConfig(TracingConfig {
                register_thread: false,
                ..TracingConfig::default()
            }),
            ConfigRecord::ModulesConfig(ModulesConfig::default()),
        ])
        .unwrap();
        assert_eq!(handle.get_version(), RUNTIME_VERSION);
        assert!(Arc::strong_count(handle.module_graph()) >= 1);
        drop(handle);
        deinit();
    }

    #[test]
    fn init_rejects_a_required_but_unrecognized_feature_request() {
        let _guard = CONTEXT_TEST_LOCK.lock().unwrap();
        deinit();
        let err = init(vec![
            ConfigRecord::TracingConfig(TracingConfig {
                register_thread: false,
                ..TracingConfig::default()
            }),
            ConfigRecord::ModulesConfig(ModulesConfig {
                feature_requests: vec![FeatureRequest {
                    tag: 7,
                    flag: FeatureFlag::Required,
                }],
                ..ModulesConfig::default()
            }),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        // init must not have left a live context behind.
        assert!(Handle::acquire(&RUNTIME_VERSION).is_err());
    }

    #[test]
    fn init_accepts_an_optional_unrecognized_feature_request() {
        let _guard = CONTEXT_TEST_LOCK.lock().unwrap();
        deinit();
        let handle = init(vec![
            ConfigRecord::TracingConfig(TracingConfig {
                register_thread: false,
                ..TracingConfig::default()
            }),
            ConfigRecord::ModulesConfig(ModulesConfig {
                feature_requests: vec![FeatureRequest {
                    tag: 7,
                    flag: FeatureFlag::On,
                }],
                ..ModulesConfig::default()
            }),
        ])
        .unwrap();
        drop(handle);
        deinit();
    }
}
