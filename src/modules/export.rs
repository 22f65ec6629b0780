//! `ModuleExport`: the manifest a shared binary exposes for a module
//! (`spec.md` §3 "ModuleExport", §6.3 "Module binary format").
//!
//! `spec.md` §6.3 leaves the exact binary layout to the build system and
//! only specifies the logical contents (name, imports, exports, parameters,
//! constructor/destructor entry points). This is the in-process Rust
//! rendering of that manifest: constructors/destructors are plain closures
//! rather than raw function pointers, since the C-ABI directory-walking
//! machinery that would produce a `ModuleExport` from a binary's symbol
//! table is named out of scope (`spec.md` §1).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::modules::parameters::{AccessGroup, ParameterTag, ParameterValue};
use crate::modules::symbol::{Symbol, SymbolId};

/// A default value and access groups for a parameter declared by a
/// `ModuleExport` (`spec.md` §4.12).
///
/// `tag` and `default` are declared separately because on the wire (and in
/// a hand-written `ModuleExport`) nothing stops an author writing a default
/// value of the wrong shape for the tag they declared; the loader checks
/// the two agree before the instance is constructed.
#[derive(Clone)]
pub struct ParameterDecl {
    pub name: Arc<str>,
    pub tag: ParameterTag,
    pub default: ParameterValue,
    pub read_group: AccessGroup,
    pub write_group: AccessGroup,
}

/// Context handed to an instance constructor: its resolved imports and a
/// view of the declared parameter defaults, which the constructor may
/// override before the instance is published.
pub struct ConstructorContext<'a> {
    pub imports: &'a HashMap<SymbolId, Arc<crate::modules::instance::Instance>>,
}

/// An instance's constructor: allocates whatever opaque state blob the
/// module needs, or fails (aborting the load of this one module, per the
/// loader's per-module guard, `spec.md` §4.11 step 3).
pub type Constructor = Arc<dyn Fn(&ConstructorContext<'_>) -> Result<Option<Box<dyn Any + Send + Sync>>> + Send + Sync>;

/// An instance's destructor, run when its state is torn down on unload.
pub type Destructor = Arc<dyn Fn(Box<dyn Any + Send + Sync>) + Send + Sync>;

/// The manifest describing one loadable module (`spec.md` §3
/// "ModuleExport").
#[derive(Clone)]
pub struct ModuleExport {
    pub name: Arc<str>,
    pub description: Arc<str>,
    pub author: Arc<str>,
    pub license: Arc<str>,
    /// Symbols this module requires, expressed as the *required* version
    /// (`spec.md` §3: importer's required version).
    pub imports: Vec<Symbol>,
    pub exports: Vec<Symbol>,
    pub export_namespaces: Vec<Arc<str>>,
    pub parameters: Vec<ParameterDecl>,
    pub constructor: Constructor,
    pub destructor: Option<Destructor>,
}

impl ModuleExport {
    /// Starts building a minimal export with no imports, exports,
    /// parameters, or destructor and a constructor that allocates no state.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            description: Arc::from(""),
            author: Arc::from(""),
            license: Arc::from(""),
            imports: Vec::new(),
            exports: Vec::new(),
            export_namespaces: Vec::new(),
            parameters: Vec::new(),
            constructor: Arc::new(|_ctx| Ok(None)),
            destructor: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<Arc<str>>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_exports(mut self, exports: Vec<Symbol>) -> Self {
        self.exports = exports;
        self
    }

    #[must_use]
    pub fn with_imports(mut self, imports: Vec<Symbol>) -> Self {
        self.imports = imports;
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<ParameterDecl>) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = constructor;
        self
    }

    #[must_use]
    pub fn with_destructor(mut self, destructor: Destructor) -> Self {
        self.destructor = Some(destructor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_an_empty_module() {
        let export = ModuleExport::new("acme.widgets");
        assert_eq!(export.name.as_ref(), "acme.widgets");
        assert!(export.imports.is_empty());
        assert!(export.exports.is_empty());
        assert!(export.destructor.is_none());
    }

    #[test]
    fn default_constructor_allocates_no_state() {
        let export = ModuleExport::new("acme.widgets");
        let ctx = ConstructorContext {
            imports: &HashMap::new(),
        };
        let state = (export.constructor)(&ctx).unwrap();
        assert!(state.is_none());
    }
}
