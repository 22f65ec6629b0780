//! Loaded module state: `InstanceHandle` and `Instance` (`spec.md` §3).

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::modules::parameters::Parameter;
use crate::modules::symbol::SymbolId;

/// Static metadata about a loaded module, shared and refcounted
/// (`spec.md` §3 "InstanceHandle").
///
/// `strong_count` is the explicit "don't unload" reference count distinct
/// from the dependency graph's dependency count (`spec.md` §4.10): an
/// instance cannot be unloaded while either is nonzero.
pub struct InstanceHandle {
    name: Arc<str>,
    description: Arc<str>,
    author: Arc<str>,
    license: Arc<str>,
    module_path: Option<Arc<str>>,
    strong_count: AtomicU32,
    loaded: AtomicBool,
    unloadable: AtomicBool,
}

impl InstanceHandle {
    /// Builds a handle with a strong count of zero and `loaded = true`.
    #[must_use]
    pub fn new(
        name: impl Into<Arc<str>>,
        description: impl Into<Arc<str>>,
        author: impl Into<Arc<str>>,
        license: impl Into<Arc<str>>,
        module_path: Option<Arc<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            author: author.into(),
            license: license.into(),
            module_path,
            strong_count: AtomicU32::new(0),
            loaded: AtomicBool::new(true),
            unloadable: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    #[must_use]
    pub fn license(&self) -> &str {
        &self.license
    }

    #[must_use]
    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    /// Increments the strong ("don't unload") count.
    pub fn strong_ref(&self) {
        self.strong_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the strong count. Panics on underflow (double-unref).
    pub fn strong_unref(&self) {
        let previous = self.strong_count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "InstanceHandle strong count underflow");
    }

    /// The current strong count.
    #[must_use]
    pub fn strong_count(&self) -> u32 {
        self.strong_count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_unloaded(&self) {
        self.loaded.store(false, Ordering::Release);
    }

    /// Marks this instance eligible for unload once its strong count and
    /// dependency count both reach zero (`spec.md` §3 Invariant 3).
    /// Idempotent.
    pub fn mark_unloadable(&self) {
        self.unloadable.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_unloadable(&self) -> bool {
        self.unloadable.load(Ordering::Acquire)
    }
}

/// The live embodiment of a loaded module (`spec.md` §3 "Instance"):
/// parameters, its opaque state blob, and back-references to its own
/// handle and its node in the dependency graph.
pub struct Instance {
    handle: Arc<InstanceHandle>,
    parameters: HashMap<Arc<str>, Parameter>,
    exports: HashMap<SymbolId, crate::modules::symbol::Symbol>,
    state: Option<Box<dyn Any + Send + Sync>>,
}

impl Instance {
    /// Constructs an instance from its handle and the parameters/exports
    /// declared by its `ModuleExport`.
    #[must_use]
    pub fn new(
        handle: Arc<InstanceHandle>,
        parameters: HashMap<Arc<str>, Parameter>,
        exports: HashMap<SymbolId, crate::modules::symbol::Symbol>,
        state: Option<Box<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            handle,
            parameters,
            exports,
            state,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<InstanceHandle> {
        &self.handle
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    #[must_use]
    pub fn exported_symbol(&self, id: &SymbolId) -> Option<&crate::modules::symbol::Symbol> {
        self.exports.get(id)
    }

    #[must_use]
    pub fn exports(&self) -> impl Iterator<Item = &crate::modules::symbol::Symbol> {
        self.exports.values()
    }

    /// Downcasts the instance's opaque state to `T`, if it was constructed
    /// with that type.
    #[must_use]
    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.state.as_deref().and_then(<dyn Any>::downcast_ref)
    }
}
