//! The module dependency graph: acyclic, name-unique, symbol-unique
//! (`spec.md` §4.10, design note §9 "Cyclic graphs → arena + indices").
//!
//! Nodes are stored in a [`crate::util::Arena`] rather than linked by raw
//! pointers, so a node's [`ArenaIndex`] stays a safe, generation-checked
//! handle even after other nodes are removed, and the cycle-check BFS below
//! walks plain indices instead of chasing pointers through instances that
//! might be mid-unload on another thread.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::modules::instance::Instance;
use crate::modules::symbol::SymbolId;
use crate::util::{Arena, ArenaIndex};

/// Whether a dependency edge survives for the instance's whole lifetime or
/// may be removed later (`spec.md` §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Declared at load time; permanent until the instance unloads.
    Static,
    /// May be added or removed after load.
    Dynamic,
}

struct Node {
    name: Arc<str>,
    instance: Arc<Instance>,
    dependencies: HashMap<ArenaIndex, EdgeKind>,
    dependents: HashSet<ArenaIndex>,
    namespaces: HashSet<Arc<str>>,
}

/// The directed acyclic graph of loaded instances (`spec.md` §3
/// "DependencyGraph").
#[derive(Default)]
pub struct DependencyGraph {
    nodes: Arena<Node>,
    by_name: HashMap<Arc<str>, ArenaIndex>,
    by_symbol: HashMap<SymbolId, ArenaIndex>,
}

impl DependencyGraph {
    /// Constructs an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of live instances in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The indices of every instance currently in the graph, in arena slot
    /// order. Used by [`crate::context`] to drain the graph during shutdown.
    #[must_use]
    pub fn indices(&self) -> Vec<ArenaIndex> {
        self.nodes.iter().map(|(index, _)| index).collect()
    }

    /// Inserts a newly loaded instance. Fails if its name or any exported
    /// symbol identity is already registered (`spec.md` §3 Invariants 4, 5).
    pub fn insert_instance(&mut self, name: impl Into<Arc<str>>, instance: Arc<Instance>) -> Result<ArenaIndex> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!("module name `{name}` is already loaded"),
            ));
        }
        for symbol in instance.exports() {
            if self.by_symbol.contains_key(symbol.id()) {
                return Err(Error::with_message(
                    ErrorKind::InvalidInput,
                    format!("symbol `{}` is already exported by another instance", symbol.id()),
                ));
            }
        }

        let index = self.nodes.insert(Node {
            name: Arc::clone(&name),
            instance: Arc::clone(&instance),
            dependencies: HashMap::new(),
            dependents: HashSet::new(),
            namespaces: HashSet::new(),
        });
        self.by_name.insert(name, index);
        for symbol in instance.exports() {
            self.by_symbol.insert(symbol.id().clone(), index);
        }
        Ok(index)
    }

    /// Looks up a node's index by module name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<ArenaIndex> {
        self.by_name.get(name).copied()
    }

    /// Looks up the instance currently exporting `symbol`.
    #[must_use]
    pub fn exporter_of(&self, symbol: &SymbolId) -> Option<&Arc<Instance>> {
        let index = self.by_symbol.get(symbol)?;
        self.nodes.get(*index).map(|n| &n.instance)
    }

    /// Borrows an instance by its node index.
    #[must_use]
    pub fn instance(&self, index: ArenaIndex) -> Option<&Arc<Instance>> {
        self.nodes.get(index).map(|n| &n.instance)
    }

    /// The number of instances depending on `index` (`spec.md` §4.10
    /// "dependency count").
    #[must_use]
    pub fn dependency_count(&self, index: ArenaIndex) -> usize {
        self.nodes.get(index).map_or(0, |n| n.dependents.len())
    }

    /// Registers that `from` now includes namespace table `namespace`
    /// (`spec.md` §3: edges may target "namespace tables of exporters").
    pub fn add_namespace(&mut self, from: ArenaIndex, namespace: impl Into<Arc<str>>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(from)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such instance"))?;
        node.namespaces.insert(namespace.into());
        Ok(())
    }

    /// Adds a dependency edge `from -> to`. Rejects the edge if it would
    /// introduce a cycle (`spec.md` §3 Invariant 2, §8 Testable Property 3).
    pub fn add_dependency(&mut self, from: ArenaIndex, to: ArenaIndex, kind: EdgeKind) -> Result<()> {
        if !self.nodes.contains(from) || !self.nodes.contains(to) {
            return Err(Error::new(ErrorKind::NotFound, "no such instance"));
        }
        if from == to {
            return Err(Error::new(ErrorKind::InvalidInput, "an instance cannot depend on itself"));
        }
        if self.path_exists(to, from) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "adding this dependency would introduce a cycle",
            ));
        }

        self.nodes.get_mut(from).unwrap().dependencies.insert(to, kind);
        self.nodes.get_mut(to).unwrap().dependents.insert(from);
        Ok(())
    }

    /// Removes a dynamic dependency edge. Static edges may not be removed
    /// before the dependent instance itself unloads.
    pub fn remove_dependency(&mut self, from: ArenaIndex, to: ArenaIndex) -> Result<()> {
        let kind = self
            .nodes
            .get(from)
            .and_then(|n| n.dependencies.get(&to).copied())
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such dependency edge"))?;
        if kind == EdgeKind::Static {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "a static dependency edge cannot be removed before unload",
            ));
        }
        self.nodes.get_mut(from).unwrap().dependencies.remove(&to);
        self.nodes.get_mut(to).unwrap().dependents.remove(&from);
        Ok(())
    }

    /// Whether `index` may be unloaded right now: its strong count and
    /// dependency count are both zero, and it has been marked unloadable
    /// (`spec.md` §3 Invariant 3).
    #[must_use]
    pub fn can_unload(&self, index: ArenaIndex) -> bool {
        let Some(node) = self.nodes.get(index) else {
            return false;
        };
        node.dependents.is_empty() && node.instance.handle().strong_count() == 0 && node.instance.handle().is_unloadable()
    }

    /// Removes an unloadable instance from the graph, dropping its name and
    /// symbol registrations. Fails if [`Self::can_unload`] would be `false`.
    pub fn remove_instance(&mut self, index: ArenaIndex) -> Result<Arc<Instance>> {
        if !self.can_unload(index) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "instance still has dependents, a nonzero strong count, or is not marked unloadable",
            ));
        }
        let node = self.nodes.remove(index).expect("can_unload already checked liveness");
        self.by_name.remove(&node.name);
        for symbol in node.instance.exports() {
            self.by_symbol.remove(symbol.id());
        }
        for dependency in node.dependencies.keys() {
            if let Some(dep_node) = self.nodes.get_mut(*dependency) {
                dep_node.dependents.remove(&index);
            }
        }
        node.instance.handle().mark_unloaded();
        Ok(node.instance)
    }

    /// Breadth-first search for a path `from -> to`.
    fn path_exists(&self, from: ArenaIndex, to: ArenaIndex) -> bool {
        if from == to {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for next in node.dependencies.keys() {
                if *next == to {
                    return true;
                }
                if visited.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::instance::InstanceHandle;
    use std::collections::HashMap as StdHashMap;

    fn instance(name: &str) -> Arc<Instance> {
        Arc::new(Instance::new(
            Arc::new(InstanceHandle::new(name, "", "", "", None)),
            StdHashMap::new(),
            StdHashMap::new(),
            None,
        ))
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut graph = DependencyGraph::new();
        graph.insert_instance("a", instance("a")).unwrap();
        assert!(graph.insert_instance("a", instance("a")).is_err());
    }

    #[test]
    fn cycle_is_rejected_and_graph_stays_unchanged() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert_instance("a", instance("a")).unwrap();
        let b = graph.insert_instance("b", instance("b")).unwrap();

        graph.add_dependency(a, b, EdgeKind::Static).unwrap();
        let err = graph.add_dependency(b, a, EdgeKind::Static).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
        assert_eq!(graph.dependency_count(b), 1);
        assert_eq!(graph.dependency_count(a), 0);
    }

    #[test]
    fn unload_requires_zero_dependents_and_strong_count_and_unloadable_flag() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert_instance("a", instance("a")).unwrap();
        let b = graph.insert_instance("b", instance("b")).unwrap();
        graph.add_dependency(b, a, EdgeKind::Static).unwrap();

        assert!(!graph.can_unload(a));
        graph.instance(a).unwrap().handle().mark_unloadable();
        assert!(!graph.can_unload(a), "b still depends on a");

        graph.remove_dependency(b, a).unwrap_err();
    }

    #[test]
    fn dynamic_edges_are_removable_static_edges_are_not() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert_instance("a", instance("a")).unwrap();
        let b = graph.insert_instance("b", instance("b")).unwrap();
        graph.add_dependency(b, a, EdgeKind::Dynamic).unwrap();
        graph.remove_dependency(b, a).unwrap();
        assert_eq!(graph.dependency_count(a), 0);

        graph.add_dependency(b, a, EdgeKind::Static).unwrap();
        assert!(graph.remove_dependency(b, a).is_err());
    }

    #[test]
    fn remove_instance_frees_its_name_and_symbols() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert_instance("a", instance("a")).unwrap();
        graph.instance(a).unwrap().handle().mark_unloadable();
        let removed = graph.remove_instance(a).unwrap();
        assert!(!removed.handle().is_loaded());
        assert!(graph.index_of("a").is_none());
        assert!(graph.insert_instance("a", instance("a")).is_ok());
    }
}
