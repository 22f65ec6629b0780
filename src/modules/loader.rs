//! The module loader: a scratch batch workspace and its commit algorithm
//! (`spec.md` §4.11).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::task::Waker;

use crate::error::{Error, ErrorKind, Result};
use crate::modules::export::{ConstructorContext, ModuleExport};
use crate::modules::graph::{DependencyGraph, EdgeKind};
use crate::modules::instance::{Instance, InstanceHandle};
use crate::modules::export::ParameterDecl;
use crate::modules::parameters::{AccessGroup, Parameter, ParameterTag, ParameterValue};
use crate::modules::symbol::SymbolId;

/// The outcome of trying to load one queued module as part of a commit.
#[derive(Debug, Clone)]
pub enum ModuleOutcome {
    /// The module loaded and is now part of the graph.
    Loaded,
    /// The module was not loaded; the commit as a whole still succeeds
    /// (`spec.md` §4.11: "Skipped modules do not fail the commit").
    Skipped { reason: String },
}

enum ModuleState {
    Pending,
    Resolved { handle: Arc<InstanceHandle> },
    Skipped { reason: String },
}

struct QueuedModule {
    export: ModuleExport,
    state: ModuleState,
    wakers: Vec<Waker>,
}

/// A decision about whether to load a discovered export, returned by a
/// caller-supplied filter function (`spec.md` §4.11 `add_modules_from_path`
/// / `add_modules_from_iter`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Load,
    Skip,
}

/// The result a `poll_module` future resolves with (`spec.md` §4.11).
#[derive(Debug, Clone)]
pub struct PolledModule {
    pub handle: Option<Arc<InstanceHandle>>,
}

/// A scratch workspace holding a batch of candidate modules queued for
/// loading (`spec.md` §3 "Loader", §4.11).
pub struct Loader {
    graph: Arc<Mutex<DependencyGraph>>,
    queued: HashMap<Arc<str>, QueuedModule>,
}

impl Loader {
    /// Opens a loader batch against a shared dependency graph.
    #[must_use]
    pub fn new(graph: Arc<Mutex<DependencyGraph>>) -> Self {
        Self {
            graph,
            queued: HashMap::new(),
        }
    }

    /// Whether `name` is already loaded in the graph (not just queued).
    #[must_use]
    pub fn contains_module(&self, name: &str) -> bool {
        self.graph.lock().unwrap().index_of(name).is_some()
    }

    /// Whether `symbol` is currently exported by a loaded instance.
    #[must_use]
    pub fn contains_symbol(&self, symbol: &SymbolId) -> bool {
        self.graph.lock().unwrap().exporter_of(symbol).is_some()
    }

    /// Queues a programmatically-built export directly (`spec.md` §4.11
    /// `add_module`).
    pub fn add_module(&mut self, export: ModuleExport) -> Result<()> {
        if self.queued.contains_key(&export.name) || self.contains_module(&export.name) {
            return Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!("module `{}` is already queued or loaded", export.name),
            ));
        }
        self.queued.insert(
            Arc::clone(&export.name),
            QueuedModule {
                export,
                state: ModuleState::Pending,
                wakers: Vec::new(),
            },
        );
        Ok(())
    }

    /// Queues every export from `exports` for which `filter` returns
    /// [`FilterDecision::Load`] (`spec.md` §4.11 `add_modules_from_iter`).
    ///
    /// `add_modules_from_path` (opening a `.fimo_module` binary and reading
    /// its exported-module directory) is left to the platform loader
    /// collaborator named out of scope by `spec.md` §1; once that
    /// collaborator produces an iterator of [`ModuleExport`]s this method
    /// is exactly the shared code path it drives.
    pub fn add_modules_from_iter<I, F>(&mut self, exports: I, mut filter: F) -> Result<()>
    where
        I: IntoIterator<Item = ModuleExport>,
        F: FnMut(&ModuleExport) -> FilterDecision,
    {
        for export in exports {
            if filter(&export) == FilterDecision::Load {
                self.add_module(export)?;
            }
        }
        Ok(())
    }

    /// Polls the per-module state machine for `name`.
    ///
    /// `Poll::Pending` before [`Loader::commit`] has resolved it,
    /// `Poll::Ready` once the module has been loaded or skipped.
    pub fn poll_module(&mut self, waker: &Waker, name: &str) -> std::task::Poll<Result<PolledModule>> {
        use std::task::Poll;
        let Some(module) = self.queued.get_mut(name) else {
            return Poll::Ready(Err(Error::new(ErrorKind::NotFound, "no such queued module")));
        };
        match &module.state {
            ModuleState::Pending => {
                module.wakers.push(waker.clone());
                Poll::Pending
            }
            ModuleState::Resolved { handle } => Poll::Ready(Ok(PolledModule {
                handle: Some(Arc::clone(handle)),
            })),
            ModuleState::Skipped { .. } => Poll::Ready(Ok(PolledModule { handle: None })),
        }
    }

    /// Orders and loads every queued module (`spec.md` §4.11 "Load
    /// algorithm for a commit").
    ///
    /// Returns, per module name, whether it loaded or was skipped (with a
    /// diagnostic). The commit as a whole only fails on a catastrophic,
    /// unrecoverable condition; ordinary unresolvable imports or export
    /// conflicts are reported as [`ModuleOutcome::Skipped`] instead.
    pub fn commit(&mut self) -> Result<HashMap<Arc<str>, ModuleOutcome>> {
        let order = self.topological_order();
        let mut outcomes = HashMap::new();

        for name in order {
            let outcome = self.load_one(&name);
            let reason = match &outcome {
                ModuleOutcome::Loaded => None,
                ModuleOutcome::Skipped { reason } => Some(reason.clone()),
            };
            outcomes.insert(Arc::clone(&name), outcome);
            self.resolve(&name, reason);
        }

        Ok(outcomes)
    }

    /// Computes a load order from each queued module's declared imports:
    /// modules whose imports are satisfied by other *queued* modules sort
    /// after them; modules importing only already-loaded symbols (or
    /// nothing) can go first. Unlike the dependency graph's cycle check,
    /// a cycle among queued-but-not-yet-loaded modules just means neither
    /// can resolve the other's import yet, which the per-module resolution
    /// step below reports as a normal skip rather than a fatal error.
    fn topological_order(&self) -> Vec<Arc<str>> {
        let mut remaining: HashSet<Arc<str>> = self.queued.keys().cloned().collect();
        let mut order = Vec::with_capacity(remaining.len());

        let mut resolved: HashSet<SymbolId> = {
            let graph = self.graph.lock().unwrap();
            self.queued
                .values()
                .flat_map(|m| m.export.imports.iter())
                .map(|s| s.id().clone())
                .filter(|id| graph.exporter_of(id).is_some())
                .collect()
        };

        while !remaining.is_empty() {
            let mut ready: Vec<Arc<str>> = remaining
                .iter()
                .filter(|name| {
                    let module = &self.queued[*name];
                    module
                        .export
                        .imports
                        .iter()
                        .all(|required| resolved.contains(required.id()))
                })
                .cloned()
                .collect();

            if ready.is_empty() {
                // Every remaining module's imports are unsatisfiable from
                // what's already ordered; load the rest in a stable,
                // deterministic (sorted) order and let per-module
                // resolution report the unmet imports as skips.
                let mut rest: Vec<_> = remaining.into_iter().collect();
                rest.sort();
                order.extend(rest);
                break;
            }

            ready.sort();
            for name in &ready {
                remaining.remove(name);
                for exported in &self.queued[name].export.exports {
                    resolved.insert(exported.id().clone());
                }
            }
            order.extend(ready);
        }

        order
    }

    fn load_one(&self, name: &str) -> ModuleOutcome {
        let module = &self.queued[name];
        let graph = self.graph.lock().unwrap();

        let mut resolved_imports = HashMap::new();
        for required in &module.export.imports {
            let Some(exporter) = graph.exporter_of(required.id()) else {
                return ModuleOutcome::Skipped {
                    reason: format!("unresolved import `{}`", required.id()),
                };
            };
            let Some(exported) = exporter.exported_symbol(required.id()) else {
                return ModuleOutcome::Skipped {
                    reason: format!("unresolved import `{}`", required.id()),
                };
            };
            if !exported.compatible_with(required) {
                return ModuleOutcome::Skipped {
                    reason: format!("incompatible version for import `{}`", required.id()),
                };
            }
            resolved_imports.insert(required.id().clone(), Arc::clone(exporter));
        }

        for exported in &module.export.exports {
            if graph.exporter_of(exported.id()).is_some() {
                return ModuleOutcome::Skipped {
                    reason: format!("symbol `{}` is already exported", exported.id()),
                };
            }
        }
        if graph.index_of(name).is_some() {
            return ModuleOutcome::Skipped {
                reason: format!("module name `{name}` is already loaded"),
            };
        }
        drop(graph);

        let mut parameters = HashMap::with_capacity(module.export.parameters.len());
        for decl in &module.export.parameters {
            let parameter = match Parameter::new_checked(decl.tag, decl.default, decl.read_group, decl.write_group) {
                Ok(parameter) => parameter,
                Err(error) => {
                    return ModuleOutcome::Skipped {
                        reason: format!("parameter `{}`: {error}", decl.name),
                    };
                }
            };
            parameters.insert(Arc::clone(&decl.name), parameter);
        }

        let ctx = ConstructorContext {
            imports: &resolved_imports,
        };
        let state = match (module.export.constructor)(&ctx) {
            Ok(state) => state,
            Err(error) => {
                return ModuleOutcome::Skipped {
                    reason: format!("constructor failed: {}", error.description()),
                };
            }
        };

        let handle = Arc::new(InstanceHandle::new(
            Arc::clone(&module.export.name),
            Arc::clone(&module.export.description),
            Arc::clone(&module.export.author),
            Arc::clone(&module.export.license),
            None,
        ));
        let exports = module
            .export
            .exports
            .iter()
            .map(|symbol| (symbol.id().clone(), symbol.clone()))
            .collect();
        let instance = Arc::new(Instance::new(Arc::clone(&handle), parameters, exports, state));

        let mut graph = self.graph.lock().unwrap();
        if graph.insert_instance(Arc::clone(&module.export.name), instance).is_err() {
            return ModuleOutcome::Skipped {
                reason: "invariant conflict detected at publish time".to_owned(),
            };
        }
        let index = graph.index_of(name).expect("just inserted this instance");
        let dependency_indices: Vec<_> = module
            .export
            .imports
            .iter()
            .filter_map(|required| {
                let exporter_name = graph.exporter_of(required.id())?.handle().name().to_owned();
                graph.index_of(&exporter_name)
            })
            .collect();
        for dependency_index in dependency_indices {
            let _ = graph.add_dependency(index, dependency_index, EdgeKind::Static);
        }

        ModuleOutcome::Loaded
    }

    fn resolve(&mut self, name: &str, skip_reason: Option<String>) {
        let graph = Arc::clone(&self.graph);
        let Some(module) = self.queued.get_mut(name) else {
            return;
        };
        module.state = match skip_reason {
            Some(reason) => ModuleState::Skipped { reason },
            None => {
                let index = graph
                    .lock()
                    .unwrap()
                    .index_of(name)
                    .expect("load_one reported Loaded, so the instance must be in the graph");
                let handle = Arc::clone(graph.lock().unwrap().instance(index).unwrap().handle());
                ModuleState::Resolved { handle }
            }
        };
        for waker in module.wakers.drain(..) {
            waker.wake();
        }
    }
}
