//! Compile-time-derived multi-state futures (`spec.md` §4.8 "FSMFuture").
//!
//! [`fsm_future!`](crate::fsm_future) (in `fimo-runtime-macros`) expands a
//! small DSL into an [`FsmDef`] impl for a marker type; this module supplies
//! the generic driver, [`FsmFuture`], that actually implements
//! [`std::future::Future`] on top of it. Splitting the two keeps the macro
//! itself a thin, easily-audited translation from DSL to trait impl, while
//! all control-flow and unwinding logic lives in ordinary, type-checked
//! Rust.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// What a state function reports back to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    /// Advance to the next state (wrapping to the terminal `ret` after the
    /// last declared state).
    Next,
    /// Return `Pending`; resume at the same state on the next poll.
    Yield,
    /// Jump straight to the terminal `ret`.
    Ret,
    /// Jump to an arbitrary state index.
    Transition(u32),
    /// The state failed; begin unwinding.
    Error,
}

/// What an unwind function reports back to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindOutcome {
    /// Continue unwinding at the previous state (or terminate if already at
    /// state 0).
    Unwind,
    /// Stop unwinding and jump to the terminal `ret`.
    Ret,
    /// Stop unwinding and resume normal execution at an arbitrary state.
    Transition(u32),
}

/// Why an unwind chain is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindReason {
    /// A state reported [`StateOutcome::Error`].
    Error,
    /// The future is being dropped before completion.
    Abort,
}

/// The state-table contract a `fsm_future!`-generated type implements.
pub trait FsmDef: Sized {
    /// The future's working storage, threaded through every state/unwind
    /// call.
    type Data;
    /// What the future ultimately resolves to.
    type Output;

    /// Number of declared `state[i]` functions.
    const STATE_COUNT: u32;
    /// Skip unwinding entirely on error/abort; data is just dropped.
    const NO_UNWIND: bool = false;
    /// Forbid dropping the future mid-run (anywhere but state 0 or the
    /// terminal state).
    const NO_ABORT: bool = false;

    /// Runs state `state`, producing the next [`StateOutcome`].
    fn poll_state(state: u32, data: &mut Self::Data, waker: &Waker) -> StateOutcome;

    /// Runs the unwind function for `state`, if any was declared (states
    /// with no declared unwind function behave as `UnwindOutcome::Ret`).
    fn unwind_state(state: u32, data: &mut Self::Data, reason: UnwindReason) -> UnwindOutcome;

    /// Produces the future's output from its final data.
    fn ret(data: Self::Data) -> Self::Output;
}

const TERMINAL: u32 = u32::MAX;

/// The generic driver for any [`FsmDef`]: a state index plus the FSM's
/// working data, implementing [`Future`].
pub struct FsmFuture<F: FsmDef> {
    state: u32,
    data: Option<F::Data>,
}

impl<F: FsmDef> FsmFuture<F> {
    /// Starts a new FSM future at state 0 with the given initial data.
    #[must_use]
    pub fn new(data: F::Data) -> Self {
        Self {
            state: 0,
            data: Some(data),
        }
    }

    fn run_unwind(data: &mut F::Data, mut state: u32, reason: UnwindReason) -> Option<u32> {
        loop {
            match F::unwind_state(state, data, reason) {
                UnwindOutcome::Unwind => {
                    if state == 0 {
                        return None;
                    }
                    state -= 1;
                }
                UnwindOutcome::Ret => return None,
                UnwindOutcome::Transition(next) => return Some(next),
            }
        }
    }
}

impl<F: FsmDef> Future for FsmFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `FsmFuture` has no `!Unpin` fields and does not rely on
        // pinning guarantees itself; it only forwards `&mut Self::Data` to
        // `F`'s state functions, which take it by value each call.
        let this = unsafe { self.get_unchecked_mut() };

        loop {
            if this.state == TERMINAL {
                let data = this
                    .data
                    .take()
                    .expect("fsm future polled again after returning Ready");
                return Poll::Ready(F::ret(data));
            }

            let data = this
                .data
                .as_mut()
                .expect("fsm future polled again after returning Ready");

            match F::poll_state(this.state, data, cx.waker()) {
                StateOutcome::Next => {
                    this.state = if this.state + 1 >= F::STATE_COUNT {
                        TERMINAL
                    } else {
                        this.state + 1
                    };
                }
                StateOutcome::Yield => return Poll::Pending,
                StateOutcome::Ret => this.state = TERMINAL,
                StateOutcome::Transition(next) => this.state = next,
                StateOutcome::Error => {
                    if F::NO_UNWIND {
                        this.state = TERMINAL;
                    } else {
                        let data = this.data.as_mut().expect("checked above");
                        this.state = Self::run_unwind(data, this.state, UnwindReason::Error).unwrap_or(TERMINAL);
                    }
                }
            }
        }
    }
}

impl<F: FsmDef> Drop for FsmFuture<F> {
    fn drop(&mut self) {
        let Some(mut data) = self.data.take() else {
            return;
        };
        if self.state == TERMINAL {
            return;
        }
        assert!(
            !F::NO_ABORT || self.state == 0,
            "fsm future dropped mid-run but its definition forbids abort (no_abort)"
        );
        if !F::NO_UNWIND {
            let _ = Self::run_unwind(&mut data, self.state, UnwindReason::Abort);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::{RawWaker, RawWakerVTable};

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

    struct CountToThree;

    impl FsmDef for CountToThree {
        type Data = u32;
        type Output = u32;

        const STATE_COUNT: u32 = 3;

        fn poll_state(state: u32, data: &mut Self::Data, _waker: &Waker) -> StateOutcome {
            *data += 1;
            assert_eq!(state as u64, u64::from(*data) - 1);
            StateOutcome::Next
        }

        fn unwind_state(_state: u32, _data: &mut Self::Data, _reason: UnwindReason) -> UnwindOutcome {
            UnwindOutcome::Ret
        }

        fn ret(data: Self::Data) -> Self::Output {
            data
        }
    }

    #[test]
    fn runs_through_every_declared_state_then_terminates() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut future = FsmFuture::<CountToThree>::new(0);
        let pinned = unsafe { Pin::new_unchecked(&mut future) };
        match pinned.poll(&mut cx) {
            Poll::Ready(value) => assert_eq!(value, 3),
            Poll::Pending => panic!("expected immediate completion"),
        }
    }

    struct YieldsOnce;

    impl FsmDef for YieldsOnce {
        type Data = bool;
        type Output = ();

        const STATE_COUNT: u32 = 1;

        fn poll_state(_state: u32, data: &mut Self::Data, _waker: &Waker) -> StateOutcome {
            if *data {
                StateOutcome::Next
            } else {
                *data = true;
                StateOutcome::Yield
            }
        }

        fn unwind_state(_state: u32, _data: &mut Self::Data, _reason: UnwindReason) -> UnwindOutcome {
            UnwindOutcome::Ret
        }

        fn ret(_data: Self::Data) {}
    }

    #[test]
    fn yield_returns_pending_then_completes_on_next_poll() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut future = FsmFuture::<YieldsOnce>::new(false);
        let pinned = unsafe { Pin::new_unchecked(&mut future) };
        assert_eq!(pinned.poll(&mut cx), Poll::Pending);

        let pinned = unsafe { Pin::new_unchecked(&mut future) };
        assert_eq!(pinned.poll(&mut cx), Poll::Ready(()));
    }

    struct UnwindsOnError;

    thread_local! {
        static UNWOUND_FLAG: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
    }

    impl FsmDef for UnwindsOnError {
        type Data = ();
        type Output = ();

        const STATE_COUNT: u32 = 2;

        fn poll_state(state: u32, _data: &mut Self::Data, _waker: &Waker) -> StateOutcome {
            if state == 0 {
                StateOutcome::Error
            } else {
                StateOutcome::Next
            }
        }

        fn unwind_state(_state: u32, _data: &mut Self::Data, reason: UnwindReason) -> UnwindOutcome {
            assert_eq!(reason, UnwindReason::Error);
            UNWOUND_FLAG.with(|flag| flag.set(true));
            UnwindOutcome::Ret
        }

        fn ret(_data: Self::Data) {}
    }

    #[test]
    fn error_triggers_unwind_then_terminates() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut future = FsmFuture::<UnwindsOnError>::new(());
        let pinned = unsafe { Pin::new_unchecked(&mut future) };
        assert_eq!(pinned.poll(&mut cx), Poll::Ready(()));
        assert!(UNWOUND_FLAG.with(std::cell::Cell::get));
    }

    #[test]
    #[should_panic(expected = "forbids abort")]
    fn dropping_mid_run_with_no_abort_panics() {
        struct NeverAborts;
        impl FsmDef for NeverAborts {
            type Data = ();
            type Output = ();
            const STATE_COUNT: u32 = 2;
            const NO_ABORT: bool = true;

            fn poll_state(_state: u32, _data: &mut Self::Data, _waker: &Waker) -> StateOutcome {
                StateOutcome::Yield
            }
            fn unwind_state(_state: u32, _data: &mut Self::Data, _reason: UnwindReason) -> UnwindOutcome {
                UnwindOutcome::Ret
            }
            fn ret(_data: Self::Data) {}
        }

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut future = FsmFuture::<NeverAborts>::new(());
        let pinned = unsafe { Pin::new_unchecked(&mut future) };
        let _ = pinned.poll(&mut cx);
        drop(future);
    }
}
