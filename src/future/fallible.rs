//! `Fallible<T>`: an error/value pair that reports into the thread-local
//! result slot on unwrap (`spec.md` §4.8).

use crate::error::Error;

/// Either a value or an error, with an ergonomic unwrap that mirrors the
/// thread-local status-code style APIs the rest of the runtime exposes
/// (`has_error_result`/`take_result` in [`crate::result`]).
pub struct Fallible<T> {
    inner: Result<T, Error>,
}

impl<T> Fallible<T> {
    /// Wraps a successful value.
    #[must_use]
    pub const fn ok(value: T) -> Self {
        Self { inner: Ok(value) }
    }

    /// Wraps an error.
    #[must_use]
    pub const fn err(error: Error) -> Self {
        Self { inner: Err(error) }
    }

    /// Whether this holds a value.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.inner.is_ok()
    }

    /// Returns the value, recording the error (if any) into the calling
    /// thread's current result slot and clearing it on success.
    pub fn unwrap(self) -> Option<T> {
        match self.inner {
            Ok(value) => {
                crate::result::clear_result();
                Some(value)
            }
            Err(error) => {
                crate::result::replace_result(Some(error));
                None
            }
        }
    }

    /// Converts to a plain `Result`, without touching the thread-local
    /// result slot.
    #[must_use]
    pub fn into_result(self) -> Result<T, Error> {
        self.inner
    }
}

impl<T> From<Result<T, Error>> for Fallible<T> {
    fn from(inner: Result<T, Error>) -> Self {
        Self { inner }
    }
}
