//! The single-threaded cooperative event loop and task enqueue primitive
//! (`spec.md` §4.9 "Async — Event Loop & Task Enqueue").
//!
//! Tasks never preempt each other mid-poll (`spec.md` §5): the loop thread
//! pops one ready task at a time off its ready queue and polls it to
//! completion or `Pending`. A task's [`std::task::Waker`] re-enqueues it by
//! pushing its [`TaskId`] back onto the same queue and notifying the loop's
//! condvar, so a task parked on an external event (a timer, an I/O
//! completion reported from another thread) is picked back up on its next
//! scheduling turn rather than polled again immediately.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::runtime::stored_task::StoredTask;
use crate::util::{Arena, ArenaIndex};

/// Identifies a task enqueued on an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(ArenaIndex);

impl TaskId {
    /// Wraps an arena index as a `TaskId`, for callers (such as the timer
    /// heap) that key their own bookkeeping off the loop's task arena.
    #[must_use]
    pub const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }
}

struct Inner {
    tasks: Mutex<Arena<StoredTask>>,
    ready: Mutex<VecDeque<ArenaIndex>>,
    ready_cv: Condvar,
    running: AtomicBool,
    shutdown: AtomicBool,
}

/// A single-threaded cooperative scheduler dispatching enqueued futures
/// (`spec.md` §4.9, §5 "Single-threaded cooperative" regime).
///
/// Application threads never poll tasks directly; they communicate with the
/// loop exclusively through [`EventLoop::enqueue`] (returning an
/// [`EnqueuedFuture`]) or by blocking on one with a [`crate::future::Waiter`].
pub struct EventLoop {
    inner: Arc<Inner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoop {
    /// Constructs a loop that is not yet running; [`EventLoop::start`] spawns
    /// its dedicated thread.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(Arena::new()),
                ready: Mutex::new(VecDeque::new()),
                ready_cv: Condvar::new(),
                running: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        })
    }

    /// Starts the dedicated event-loop thread. A second call on an
    /// already-started loop is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("fimo-event-loop".to_owned())
            .spawn(move || run(&inner))
            .expect("failed to spawn the event loop thread");
        *self.thread.lock() = Some(handle);
    }

    /// Starts the loop (if not already running) and blocks the calling
    /// thread until every currently enqueued task has drained (`spec.md`
    /// §4.9: "`run_to_completion` which starts and waits for drain").
    pub fn run_to_completion(self: &Arc<Self>) {
        self.start();
        loop {
            let tasks_empty = self.inner.tasks.lock().is_empty();
            let ready_empty = self.inner.ready.lock().is_empty();
            if tasks_empty && ready_empty {
                return;
            }
            std::thread::yield_now();
        }
    }

    /// Signals the loop thread to stop and joins it. Any tasks still pending
    /// are dropped (cancelled) without completing.
    pub fn stop(self: &Arc<Self>) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.ready_cv.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        self.inner.running.store(false, Ordering::Release);
    }

    /// Moves `future` onto the loop's task storage and returns a handle that
    /// can be polled from any thread (`spec.md` §4.9 `future_enqueue`).
    ///
    /// In the spec's C-ABI rendering, `future_enqueue` takes `data`/layout
    /// parameters and optional `cleanup_data`/`cleanup_result` callbacks
    /// because it has no language-level ownership to rely on; in Rust,
    /// moving `future` into the loop's arena and relying on `Drop` to run
    /// cleanup on cancellation is the same contract without the manual
    /// layout bookkeeping (design note §9: "Scoped resources").
    pub fn enqueue<F, T>(self: &Arc<Self>, future: F) -> EnqueuedFuture<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.start();

        let shared = Arc::new(Shared::<T> {
            state: Mutex::new(TaskState::Running { external_waker: None }),
        });
        let completion = Arc::clone(&shared);

        let wrapped = async move {
            let value = future.await;
            let mut state = completion.state.lock();
            if let TaskState::Running { external_waker } = std::mem::replace(&mut *state, TaskState::Done) {
                *state = TaskState::Ready(value);
                if let Some(waker) = external_waker {
                    waker.wake();
                }
            }
        };

        let id = self.inner.tasks.lock().insert(StoredTask::new(wrapped));
        self.inner.ready.lock().push_back(id);
        self.inner.ready_cv.notify_all();

        EnqueuedFuture {
            loop_inner: Arc::clone(&self.inner),
            id: TaskId(id),
            shared,
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.ready_cv.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

enum TaskState<T> {
    Running { external_waker: Option<Waker> },
    Ready(T),
    /// The task body finished but its completion raced a cancellation that
    /// already tore down the shared state; the value is simply dropped.
    Done,
}

struct Shared<T> {
    state: Mutex<TaskState<T>>,
}

struct TaskWaker {
    inner: Arc<Inner>,
    id: ArenaIndex,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.inner.ready.lock().push_back(self.id);
        self.inner.ready_cv.notify_all();
    }
}

fn run(inner: &Arc<Inner>) {
    loop {
        let id = {
            let mut ready = inner.ready.lock();
            loop {
                if let Some(id) = ready.pop_front() {
                    break Some(id);
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                inner
                    .ready_cv
                    .wait_for(&mut ready, std::time::Duration::from_millis(50));
            }
        };
        let Some(id) = id else {
            return;
        };

        let waker = Waker::from(Arc::new(TaskWaker {
            inner: Arc::clone(inner),
            id,
        }));
        let mut cx = Context::from_waker(&waker);

        let mut tasks = inner.tasks.lock();
        let Some(task) = tasks.get_mut(id) else {
            // Cancelled between enqueue and poll.
            continue;
        };
        let poll = task.poll(&mut cx);
        if matches!(poll, Poll::Ready(())) {
            tasks.remove(id);
        }
    }
}

/// A handle to a future running on an [`EventLoop`], pollable from any
/// thread (`spec.md` §4.9: "Polling the handle from outside the loop
/// returns `pending` until the task internally reports ready").
///
/// Dropping an `EnqueuedFuture` before completion cancels the underlying
/// task: its future is removed from the loop's arena and dropped, running
/// whatever `Drop` glue its captured state needs.
pub struct EnqueuedFuture<T> {
    loop_inner: Arc<Inner>,
    id: TaskId,
    shared: Arc<Shared<T>>,
}

impl<T> EnqueuedFuture<T> {
    /// The identifier of the underlying task.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }
}

impl<T> Future for EnqueuedFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.shared.state.lock();
        match &mut *state {
            TaskState::Ready(_) => {
                let TaskState::Ready(value) = std::mem::replace(&mut *state, TaskState::Done) else {
                    unreachable!("matched Ready above")
                };
                Poll::Ready(value)
            }
            TaskState::Running { external_waker } => {
                *external_waker = Some(cx.waker().clone());
                Poll::Pending
            }
            TaskState::Done => {
                panic!("EnqueuedFuture polled again after returning Ready")
            }
        }
    }
}

impl<T> Drop for EnqueuedFuture<T> {
    fn drop(&mut self) {
        self.loop_inner.tasks.lock().remove(self.id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn enqueued_future_resolves_with_the_inner_value() {
        let event_loop = EventLoop::new();
        let handle = event_loop.enqueue(async { 7 });
        let waiter = crate::future::Waiter::new();
        let value = waiter.await_future(std::pin::pin!(handle));
        assert_eq!(value, 7);
        event_loop.stop();
    }

    #[test]
    fn run_to_completion_drains_every_enqueued_task() {
        let event_loop = EventLoop::new();
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            let _ = event_loop.enqueue(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        event_loop.run_to_completion();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        event_loop.stop();
    }

    #[test]
    fn dropping_before_completion_cancels_the_task() {
        let event_loop = EventLoop::new();
        let dropped = Arc::new(AtomicBool::new(false));

        struct MarkOnDrop(Arc<AtomicBool>);
        impl Drop for MarkOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let guard = MarkOnDrop(Arc::clone(&dropped));
        let handle = event_loop.enqueue(async move {
            // Never completes on its own; relies on cancellation.
            loop {
                crate::runtime::yield_now::yield_now().await;
                let _ = &guard;
            }
        });
        std::thread::sleep(Duration::from_millis(10));
        drop(handle);
        std::thread::sleep(Duration::from_millis(10));
        assert!(dropped.load(Ordering::SeqCst));
        event_loop.stop();
    }
}
