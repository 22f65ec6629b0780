//! End-to-end: a dependent module queued alongside its dependency loads
//! after it, and its `poll_module` future resolves referencing the
//! dependency's published instance.

use std::sync::{Arc, Mutex};
use std::task::{Poll, RawWaker, RawWakerVTable, Waker};

use fimo_runtime::modules::{DependencyGraph, Loader, ModuleExport, ModuleOutcome, Symbol, SymbolId};
use fimo_runtime::version::Version;

fn noop_waker() -> Waker {
    fn clone(_: *const ()) -> RawWaker {
        raw()
    }
    fn noop(_: *const ()) {}
    fn raw() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    unsafe { Waker::from_raw(raw()) }
}

#[test]
fn dependent_loads_after_its_dependency_and_resolves_against_it() {
    let graph = Arc::new(Mutex::new(DependencyGraph::new()));
    let mut loader = Loader::new(Arc::clone(&graph));

    let sym_id = SymbolId::new("make_widget", "acme");
    let exporter = ModuleExport::new("acme.widgets")
        .with_exports(vec![Symbol::new(sym_id.clone(), Version::new(1, 2, 0), "fn() -> Widget")]);
    let importer = ModuleExport::new("acme.widgets.consumer")
        .with_imports(vec![Symbol::new(sym_id.clone(), Version::new(1, 0, 0), "fn() -> Widget")]);

    // Queue the dependent before its dependency: the loader's topological
    // order must still resolve it after.
    loader.add_module(importer).unwrap();
    loader.add_module(exporter).unwrap();

    let outcomes = loader.commit().unwrap();
    assert!(matches!(outcomes["acme.widgets"], ModuleOutcome::Loaded));
    assert!(matches!(outcomes["acme.widgets.consumer"], ModuleOutcome::Loaded));

    let waker = noop_waker();
    let Poll::Ready(Ok(polled)) = loader.poll_module(&waker, "acme.widgets.consumer") else {
        panic!("commit already resolved this module; poll_module must be immediately ready");
    };
    let consumer_handle = polled.handle.expect("the import was resolvable, so the module loaded");
    assert_eq!(consumer_handle.name(), "acme.widgets.consumer");

    let graph = graph.lock().unwrap();
    let exporter_index = graph.index_of("acme.widgets").unwrap();
    let consumer_index = graph.index_of("acme.widgets.consumer").unwrap();
    assert_eq!(graph.dependency_count(exporter_index), 1, "the consumer depends on the exporter");
    assert_eq!(graph.dependency_count(consumer_index), 0);
}

#[test]
fn incompatible_major_version_leaves_the_import_unresolved() {
    let graph = Arc::new(Mutex::new(DependencyGraph::new()));
    let mut loader = Loader::new(Arc::clone(&graph));

    let sym_id = SymbolId::new("make_widget", "acme");
    let exporter = ModuleExport::new("acme.widgets")
        .with_exports(vec![Symbol::new(sym_id.clone(), Version::new(1, 0, 0), "fn() -> Widget")]);
    let importer = ModuleExport::new("acme.widgets.consumer")
        .with_imports(vec![Symbol::new(sym_id, Version::new(2, 0, 0), "fn() -> Widget")]);

    loader.add_module(exporter).unwrap();
    loader.add_module(importer).unwrap();

    let outcomes = loader.commit().unwrap();
    assert!(matches!(outcomes["acme.widgets"], ModuleOutcome::Loaded));
    assert!(matches!(outcomes["acme.widgets.consumer"], ModuleOutcome::Skipped { .. }));
}
