//! Typed module parameter cells with access-group gating (`spec.md` §4.12).
//!
//! A parameter's value is read/written atomically with respect to other
//! reads/writes of the *same* parameter (`spec.md` §8 "Parameter read while
//! write in progress atomically observes either old or new full value,
//! never torn"); this is implemented with a `parking_lot::RwLock` guarding
//! the tagged value, which gives exactly that guarantee without needing
//! width-specific atomics.

use parking_lot::RwLock;

use crate::error::{Error, ErrorKind};

/// The access group controlling who may read or write a parameter
/// (`spec.md` §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessGroup {
    /// Only the owning instance.
    Private,
    /// The owning instance and any instance that depends on it.
    Dependency,
    /// Any instance or external caller.
    Public,
}

/// The value tag a parameter is declared with. Read/write type-checks
/// (`checkType`) compare against this, not against Rust's own type system,
/// since the value crosses the instance/caller boundary untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterTag {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

/// A tagged parameter value, matching one of [`ParameterTag`]'s variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
}

impl ParameterValue {
    /// The tag this value was constructed with.
    #[must_use]
    pub const fn tag(self) -> ParameterTag {
        match self {
            Self::U8(_) => ParameterTag::U8,
            Self::U16(_) => ParameterTag::U16,
            Self::U32(_) => ParameterTag::U32,
            Self::U64(_) => ParameterTag::U64,
            Self::I8(_) => ParameterTag::I8,
            Self::I16(_) => ParameterTag::I16,
            Self::I32(_) => ParameterTag::I32,
            Self::I64(_) => ParameterTag::I64,
        }
    }
}

/// A failure accessing or writing a parameter (`spec.md` §7
/// "ParameterError — type/access mismatch").
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter value tag {actual:?} does not match declared tag {expected:?}")]
    TypeMismatch {
        expected: ParameterTag,
        actual: ParameterTag,
    },
    #[error("caller is not permitted to read this parameter (requires {required:?} or better)")]
    ReadDenied { required: AccessGroup },
    #[error("caller is not permitted to write this parameter (requires {required:?} or better)")]
    WriteDenied { required: AccessGroup },
}

impl From<ParameterError> for Error {
    fn from(error: ParameterError) -> Self {
        Error::wrap(ErrorKind::Parameter, error)
    }
}

/// A caller's claimed standing when reading or writing a parameter,
/// corresponding to `(caller-scope)` in the spec's `(operation,
/// caller-scope, parameter.group)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerScope {
    /// The caller is the instance that owns the parameter.
    Owner,
    /// The caller is some other instance that depends on the owner.
    Dependent,
    /// The caller is external to the dependency graph entirely.
    External,
}

impl CallerScope {
    fn satisfies(self, group: AccessGroup) -> bool {
        match group {
            AccessGroup::Private => matches!(self, Self::Owner),
            AccessGroup::Dependency => matches!(self, Self::Owner | Self::Dependent),
            AccessGroup::Public => true,
        }
    }
}

/// A typed, access-controlled parameter cell (`spec.md` §3 "Parameter",
/// §4.12).
pub struct Parameter {
    tag: ParameterTag,
    value: RwLock<ParameterValue>,
    read_group: AccessGroup,
    write_group: AccessGroup,
}

impl Parameter {
    /// Declares a parameter with an initial (default) value and its access
    /// groups.
    #[must_use]
    pub fn new(default: ParameterValue, read_group: AccessGroup, write_group: AccessGroup) -> Self {
        Self {
            tag: default.tag(),
            value: RwLock::new(default),
            read_group,
            write_group,
        }
    }

    /// Declares a parameter the way a loaded module does: against a `tag`
    /// written down separately from `default`, failing if the two disagree
    /// (`spec.md` §4.12 `checkType`, applied at declaration time rather
    /// than deferred to the first read or write).
    pub fn new_checked(
        tag: ParameterTag,
        default: ParameterValue,
        read_group: AccessGroup,
        write_group: AccessGroup,
    ) -> Result<Self, ParameterError> {
        if default.tag() != tag {
            return Err(ParameterError::TypeMismatch {
                expected: tag,
                actual: default.tag(),
            });
        }
        Ok(Self {
            tag,
            value: RwLock::new(default),
            read_group,
            write_group,
        })
    }

    /// The parameter's declared tag.
    #[must_use]
    pub const fn tag(&self) -> ParameterTag {
        self.tag
    }

    fn check_type(&self, value: ParameterValue) -> Result<(), ParameterError> {
        if value.tag() == self.tag {
            Ok(())
        } else {
            Err(ParameterError::TypeMismatch {
                expected: self.tag,
                actual: value.tag(),
            })
        }
    }

    /// Reads the current value, gated by `checkReadPublic`-style access
    /// control against `caller`.
    pub fn read(&self, caller: CallerScope) -> Result<ParameterValue, ParameterError> {
        if !caller.satisfies(self.read_group) {
            return Err(ParameterError::ReadDenied {
                required: self.read_group,
            });
        }
        Ok(*self.value.read())
    }

    /// Writes a new value, gated by `checkWritePublic`-style access control
    /// and by `checkType`.
    pub fn write(&self, caller: CallerScope, value: ParameterValue) -> Result<(), ParameterError> {
        if !caller.satisfies(self.write_group) {
            return Err(ParameterError::WriteDenied {
                required: self.write_group,
            });
        }
        self.check_type(value)?;
        *self.value.write() = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_can_read_and_write_private_parameter() {
        let p = Parameter::new(ParameterValue::U32(1), AccessGroup::Private, AccessGroup::Private);
        assert_eq!(p.read(CallerScope::Owner), Ok(ParameterValue::U32(1)));
        assert!(p.write(CallerScope::Owner, ParameterValue::U32(2)).is_ok());
        assert_eq!(p.read(CallerScope::Owner), Ok(ParameterValue::U32(2)));
    }

    #[test]
    fn dependent_is_denied_private_access() {
        let p = Parameter::new(ParameterValue::U32(1), AccessGroup::Private, AccessGroup::Private);
        assert!(matches!(
            p.read(CallerScope::Dependent),
            Err(ParameterError::ReadDenied { .. })
        ));
    }

    #[test]
    fn dependent_may_access_dependency_group() {
        let p = Parameter::new(ParameterValue::I64(-1), AccessGroup::Dependency, AccessGroup::Dependency);
        assert!(p.read(CallerScope::Dependent).is_ok());
        assert!(p.write(CallerScope::Dependent, ParameterValue::I64(7)).is_ok());
        assert!(p.write(CallerScope::External, ParameterValue::I64(9)).is_err());
    }

    #[test]
    fn public_group_allows_any_caller() {
        let p = Parameter::new(ParameterValue::U8(0), AccessGroup::Public, AccessGroup::Public);
        assert!(p.read(CallerScope::External).is_ok());
        assert!(p.write(CallerScope::External, ParameterValue::U8(1)).is_ok());
    }

    #[test]
    fn new_checked_rejects_a_default_that_disagrees_with_the_declared_tag() {
        let err = Parameter::new_checked(ParameterTag::U32, ParameterValue::U8(0), AccessGroup::Public, AccessGroup::Public)
            .unwrap_err();
        assert_eq!(
            err,
            ParameterError::TypeMismatch {
                expected: ParameterTag::U32,
                actual: ParameterTag::U8,
            }
        );
    }

    #[test]
    fn new_checked_accepts_a_default_matching_the_declared_tag() {
        let p = Parameter::new_checked(ParameterTag::I16, ParameterValue::I16(-5), AccessGroup::Public, AccessGroup::Public)
            .unwrap();
        assert_eq!(p.tag(), ParameterTag::I16);
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let p = Parameter::new(ParameterValue::U8(0), AccessGroup::Public, AccessGroup::Public);
        assert!(matches!(
            p.write(CallerScope::Owner, ParameterValue::U32(1)),
            Err(ParameterError::TypeMismatch { .. })
        ));
    }
}
