//! The modules subsystem: dependency-ordered loading of versioned module
//! bundles, symbol resolution, and typed parameters (`spec.md` §4.10-§4.12).

pub mod export;
pub mod graph;
pub mod instance;
pub mod loader;
pub mod parameters;
pub mod symbol;

pub use export::{ConstructorContext, Constructor, Destructor, ModuleExport, ParameterDecl};
pub use graph::{DependencyGraph, EdgeKind};
pub use instance::{Instance, InstanceHandle};
pub use loader::{FilterDecision, Loader, ModuleOutcome, PolledModule};
pub use parameters::{AccessGroup, CallerScope, Parameter, ParameterError, ParameterTag, ParameterValue};
pub use symbol::{Symbol, SymbolId};
