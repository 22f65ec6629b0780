//! The type-erased runtime error and its closed set of payload variants
//! (`spec.md` §3 Result/Error, §7 Error Handling Design, design note §9:
//! "Dynamic dispatch → narrow interface abstractions").
//!
//! A C ABI would express `Result.vtable` as three function pointers
//! (`name`, `description`, `deinit`). In Rust, `deinit` is just `Drop`, so
//! the vtable collapses to the two introspection methods; `Error` carries a
//! closed [`Payload`] enum rather than a `dyn Trait` so every variant is
//! known at compile time, matching the design note's "sealed set of
//! variants" option.

use std::fmt;
use std::sync::Arc;

/// The taxonomy of runtime errors (`spec.md` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Parameter type/access mismatch (§4.12).
    Parameter,
    /// Missing module, symbol, namespace, or parameter.
    NotFound,
    /// Bad config, duplicate tags, cycle creation, duplicate export/name.
    InvalidInput,
    /// Version handshake failure.
    VersionNotSupported,
    /// Time/duration arithmetic overflow.
    Overflow,
    /// Rejected by the path/UTF-8 collaborator, surfaced up.
    InvalidUtf8,
    /// OS errno / platform error code.
    Platform,
    /// Tracing wire protocol violation.
    Protocol,
    /// Caller-supplied error not otherwise classified.
    User,
}

impl ErrorKind {
    /// The stable, machine-readable name for this kind (`Result.vtable.name`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Parameter => "ParameterError",
            Self::NotFound => "NotFound",
            Self::InvalidInput => "InvalidInput",
            Self::VersionNotSupported => "VersionNotSupported",
            Self::Overflow => "Overflow",
            Self::InvalidUtf8 => "InvalidUtf8",
            Self::Platform => "PlatformError",
            Self::Protocol => "ProtocolError",
            Self::User => "Error",
        }
    }
}

#[derive(Clone)]
enum Payload {
    /// A `'static` string literal; the common case, zero allocation.
    Static(&'static str),
    /// An owned, heap-allocated description.
    Owned(Arc<str>),
    /// An OS errno / Win32 error code, with a human-readable lookup.
    Platform { code: i32, message: Arc<str> },
    /// An arbitrary wrapped error, for `From` conversions at module
    /// boundaries (e.g. `io::Error`, a parameter/protocol leaf error).
    Any(Arc<dyn std::error::Error + Send + Sync>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Self::Owned(s) => f.debug_tuple("Owned").field(s).finish(),
            Self::Platform { code, message } => f
                .debug_struct("Platform")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Any(e) => f.debug_tuple("Any").field(&e.to_string()).finish(),
        }
    }
}

/// An owned, type-erased runtime error.
///
/// Invariant #1 (`spec.md` §3/§8): an `ok` result never carries a non-null
/// error; in this rendering `ok` is simply the absence of an `Error` (see
/// [`crate::result`]), so `Error` only ever represents the `err` arm.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    payload: Payload,
}

impl Error {
    /// Builds an error from a `'static` string description.
    #[must_use]
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            payload: Payload::Static(message),
        }
    }

    /// Builds an error from an owned, dynamically formatted description.
    #[must_use]
    pub fn with_message(kind: ErrorKind, message: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            payload: Payload::Owned(message.into()),
        }
    }

    /// Builds a platform error from an OS errno / Win32 error code and a
    /// human-readable message produced by the platform lookup collaborator.
    #[must_use]
    pub fn platform(code: i32, message: impl Into<Arc<str>>) -> Self {
        Self {
            kind: ErrorKind::Platform,
            payload: Payload::Platform {
                code,
                message: message.into(),
            },
        }
    }

    /// Wraps an arbitrary error, classifying it under `kind`.
    pub fn wrap<E>(kind: ErrorKind, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            payload: Payload::Any(Arc::new(source)),
        }
    }

    /// `Result.vtable.name`: the stable, machine-readable kind name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// `Result.vtable.description`: a human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        match &self.payload {
            Payload::Static(s) => (*s).to_owned(),
            Payload::Owned(s) => s.to_string(),
            Payload::Platform { code, message } => format!("{message} (code {code})"),
            Payload::Any(e) => e.to_string(),
        }
    }

    /// The taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The platform error code, if this is a [`ErrorKind::Platform`] error.
    #[must_use]
    pub const fn platform_code(&self) -> Option<i32> {
        match &self.payload {
            Payload::Platform { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.description())
    }
}

impl std::error::Error for Error {}

/// The crate-wide fallible return type: `Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Extension trait adding error-kind helpers to [`Result`].
pub trait ResultExt<T> {
    /// Attaches additional context to the error, if any, by wrapping its
    /// description. No-op on the `Ok` path.
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| {
            let kind = e.kind();
            Error::with_message(kind, format!("{context}: {}", e.description()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_error_reports_kind_and_description() {
        let err = Error::new(ErrorKind::NotFound, "symbol missing");
        assert_eq!(err.name(), "NotFound");
        assert_eq!(err.description(), "symbol missing");
    }

    #[test]
    fn platform_error_embeds_code() {
        let err = Error::platform(13, "permission denied");
        assert_eq!(err.platform_code(), Some(13));
        assert!(err.description().contains("13"));
    }

    #[test]
    fn context_prefixes_description() {
        let err: Result<()> = Err(Error::new(ErrorKind::InvalidInput, "bad tag"));
        let err = err.context("init").unwrap_err();
        assert_eq!(err.description(), "init: bad tag");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn wrap_preserves_source_description() {
        #[derive(Debug, thiserror::Error)]
        #[error("leaf failure")]
        struct Leaf;

        let err = Error::wrap(ErrorKind::Protocol, Leaf);
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.description(), "leaf failure");
    }
}
