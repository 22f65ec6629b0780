//! Symbol identity and version compatibility (`spec.md` §3 "Symbol",
//! §4.10 "exactly-one exporter per symbol identity").

use std::fmt;
use std::sync::Arc;

use crate::version::Version;

/// Identifies a symbol independent of its version: `(name, namespace)`
/// (`spec.md` §3: "Identity is `(name, namespace)`").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolId {
    name: Arc<str>,
    namespace: Arc<str>,
}

impl SymbolId {
    /// Builds an identity from a name and namespace.
    pub fn new(name: impl Into<Arc<str>>, namespace: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// The symbol's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace the symbol is exported under.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.namespace, self.name)
    }
}

/// A versioned, typed symbol exported by a module (`spec.md` §3 "Symbol").
///
/// `type_tag` is an opaque, build-system-assigned string identifying the
/// symbol's ABI shape; this crate never interprets it beyond equality, the
/// same way it treats `ModuleExport`'s layout as opaque (`spec.md` §6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    id: SymbolId,
    version: Version,
    type_tag: Arc<str>,
}

impl Symbol {
    /// Constructs a symbol record.
    pub fn new(id: SymbolId, version: Version, type_tag: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            version,
            type_tag: type_tag.into(),
        }
    }

    /// The symbol's identity.
    #[must_use]
    pub const fn id(&self) -> &SymbolId {
        &self.id
    }

    /// The exporter's version of this symbol.
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    /// The symbol's opaque ABI type tag.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Whether `self` (as exported) satisfies `required` (as imported):
    /// identity must match and `self.version.satisfies(required.version)`
    /// (`spec.md` §3: "two symbols are compatible when names/namespaces
    /// match and exporter's version satisfies importer's").
    #[must_use]
    pub fn compatible_with(&self, required: &Self) -> bool {
        self.id == required.id
            && self.type_tag == required.type_tag
            && self.version.satisfies(&required.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(major: u64, minor: u64) -> Symbol {
        Symbol::new(
            SymbolId::new("widget_new", "acme"),
            Version::new(major, minor, 0),
            "fn(i32) -> i32",
        )
    }

    #[test]
    fn matching_identity_and_satisfying_version_is_compatible() {
        let exported = sym(1, 2);
        let required = sym(1, 0);
        assert!(exported.compatible_with(&required));
    }

    #[test]
    fn mismatched_major_is_incompatible() {
        let exported = sym(2, 0);
        let required = sym(1, 0);
        assert!(!exported.compatible_with(&required));
    }

    #[test]
    fn different_identity_is_incompatible_even_with_same_version() {
        let exported = Symbol::new(SymbolId::new("a", "ns"), Version::new(1, 0, 0), "t");
        let required = Symbol::new(SymbolId::new("b", "ns"), Version::new(1, 0, 0), "t");
        assert!(!exported.compatible_with(&required));
    }

    #[test]
    fn display_formats_as_namespace_then_name() {
        let id = SymbolId::new("widget_new", "acme");
        assert_eq!(id.to_string(), "acme::widget_new");
    }
}
