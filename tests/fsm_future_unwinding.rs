//! End-to-end: a two-state FSM future whose second state errors unwinds
//! back through its declared unwind functions in reverse order before the
//! future resolves.

use std::pin::Pin;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use fimo_runtime::future::fsm::{FsmDef, FsmFuture, StateOutcome, UnwindOutcome, UnwindReason};

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

struct TwoStateThenError;

impl FsmDef for TwoStateThenError {
    type Data = Vec<&'static str>;
    type Output = Vec<&'static str>;

    const STATE_COUNT: u32 = 2;

    fn poll_state(state: u32, data: &mut Self::Data, _waker: &Waker) -> StateOutcome {
        match state {
            0 => {
                data.push("state0");
                StateOutcome::Next
            }
            1 => {
                data.push("state1_errors");
                StateOutcome::Error
            }
            _ => unreachable!(),
        }
    }

    fn unwind_state(state: u32, data: &mut Self::Data, reason: UnwindReason) -> UnwindOutcome {
        assert_eq!(reason, UnwindReason::Error);
        match state {
            1 => {
                data.push("unwind1");
                UnwindOutcome::Unwind
            }
            0 => {
                data.push("unwind0");
                UnwindOutcome::Ret
            }
            _ => unreachable!(),
        }
    }

    fn ret(data: Self::Data) -> Self::Output {
        data
    }
}

#[test]
fn error_in_state_one_unwinds_state_one_then_state_zero() {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    let mut future = FsmFuture::<TwoStateThenError>::new(Vec::new());
    let pinned = unsafe { Pin::new_unchecked(&mut future) };
    let Poll::Ready(trace) = pinned.poll(&mut cx) else {
        panic!("this FSM never yields, so the first poll must complete it");
    };

    assert_eq!(trace, vec!["state0", "state1_errors", "unwind1", "unwind0"]);
}

struct YieldsForever;

impl FsmDef for YieldsForever {
    type Data = ();
    type Output = ();

    const STATE_COUNT: u32 = 1;

    fn poll_state(_state: u32, _data: &mut Self::Data, _waker: &Waker) -> StateOutcome {
        StateOutcome::Yield
    }

    fn unwind_state(_state: u32, _data: &mut Self::Data, reason: UnwindReason) -> UnwindOutcome {
        assert_eq!(reason, UnwindReason::Abort);
        ABORTED.with(|flag| flag.set(true));
        UnwindOutcome::Ret
    }

    fn ret(_data: Self::Data) {}
}

thread_local! {
    static ABORTED: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

#[test]
fn dropping_a_pending_future_runs_the_abort_unwind() {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    let mut future = FsmFuture::<YieldsForever>::new(());
    let pinned = unsafe { Pin::new_unchecked(&mut future) };
    assert_eq!(pinned.poll(&mut cx), Poll::Pending);

    drop(future);
    assert!(ABORTED.with(std::cell::Cell::get), "dropping mid-run must fire the abort-reason unwind");
}
