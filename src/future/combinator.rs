//! Basic future combinators (`spec.md` §4.8 "Combinators").

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that is immediately ready with a fixed value.
pub struct ReadyFuture<T>(Option<T>);

impl<T> ReadyFuture<T> {
    /// Wraps `value` as an already-ready future.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self(Some(value))
    }
}

impl<T> Future for ReadyFuture<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(
            self.0
                .take()
                .expect("ReadyFuture polled again after returning Ready"),
        )
    }
}

/// Maps the ready value of an inner future through `f`.
pub struct MapFuture<Fut, F> {
    inner: Fut,
    map: Option<F>,
}

impl<Fut, F> MapFuture<Fut, F> {
    /// Wraps `inner`, applying `map` once it resolves.
    #[must_use]
    pub const fn new(inner: Fut, map: F) -> Self {
        Self { inner, map: Some(map) }
    }
}

impl<Fut, F, T, U> Future for MapFuture<Fut, F>
where
    Fut: Future<Output = T>,
    F: FnOnce(T) -> U,
{
    type Output = U;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: structural pinning projection; `inner` is only ever moved
        // out of when `self` itself is, `map` is never pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };
        match inner.poll(cx) {
            Poll::Ready(value) => {
                let map = this.map.take().expect("MapFuture polled again after returning Ready");
                Poll::Ready(map(value))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
