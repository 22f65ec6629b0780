//! `Timer`: a future that becomes ready once a deadline has passed on some
//! [`Clock`] (`SPEC_FULL.md` §B.2 "Timer future").
//!
//! `Timer::new` drives a real wall-clock deadline with a dedicated sleeper
//! thread spawned on first poll, parking for the remaining duration and
//! waking whichever waker was registered by the most recent poll. This
//! keeps the event loop itself free of timer-wheel bookkeeping —
//! [`crate::runtime::timer::TimerHeap`] is available separately for callers
//! that want to batch many deadlines behind one driver thread instead of
//! one thread per timer.
//!
//! `Timer::new_with_clock` instead checks a caller-supplied [`Clock`] on
//! every poll and never spawns a thread: readiness only advances when the
//! clock does, which is exactly what a [`VirtualClock`](crate::time::VirtualClock)-driven
//! test wants — the test thread calls `clock.advance(..)` and re-polls
//! (or wakes the task) itself, so the same poll sequence always produces
//! the same result.

use std::sync::{Arc, Mutex};
use std::task::Waker;
use std::time::Duration;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::time::{Clock, Time};

struct Shared {
    done: bool,
    waker: Option<Waker>,
}

enum State {
    NotStarted(Duration),
    Started(Arc<Mutex<Shared>>),
    Clocked { clock: Arc<dyn Clock>, deadline: Time },
}

/// A future that resolves once a deadline has passed.
pub struct Timer {
    state: State,
}

impl Timer {
    /// Constructs a timer that becomes ready `duration` from its first poll,
    /// measured by a real sleeper thread against the wall clock.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            state: State::NotStarted(duration),
        }
    }

    /// Constructs a timer whose deadline is `duration` past `clock`'s time
    /// at construction, checked against `clock` on every poll instead of
    /// sleeping. No thread is spawned; with a [`VirtualClock`](crate::time::VirtualClock)
    /// this makes the timer advance only when the test explicitly advances
    /// the clock.
    #[must_use]
    pub fn new_with_clock(duration: Duration, clock: Arc<dyn Clock>) -> Self {
        let deadline = clock.now().saturating_add(duration);
        Self {
            state: State::Clocked { clock, deadline },
        }
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if let State::Clocked { clock, deadline } = &this.state {
            return if clock.now() >= *deadline {
                Poll::Ready(())
            } else {
                Poll::Pending
            };
        }

        if let State::NotStarted(duration) = this.state {
            let shared = Arc::new(Mutex::new(Shared {
                done: false,
                waker: Some(cx.waker().clone()),
            }));
            let sleeper = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("fimo-timer".to_owned())
                .spawn(move || {
                    std::thread::sleep(duration);
                    let mut shared = sleeper.lock().unwrap();
                    shared.done = true;
                    if let Some(waker) = shared.waker.take() {
                        waker.wake();
                    }
                })
                .expect("failed to spawn timer sleeper thread");
            this.state = State::Started(shared);
        }

        let State::Started(shared) = &this.state else {
            unreachable!("state transitions to Started above")
        };
        let mut shared = shared.lock().unwrap();
        if shared.done {
            Poll::Ready(())
        } else {
            shared.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}
