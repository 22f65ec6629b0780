//! Stderr subscriber: a worker thread draining a lock-free queue of
//! formatted messages (`spec.md` §4.4).
//!
//! The producer side (`log_message`, called on whatever thread logged)
//! never blocks on I/O: it only pushes a preformatted message onto a
//! [`crossbeam_queue::SegQueue`], which grows by linking in new fixed-size
//! blocks as it fills rather than ever blocking the producer — the same
//! "allocate/reuse a free block on overflow" behavior the spec describes,
//! built from the block-queue primitive the teacher's stack already
//! depends on instead of a hand-rolled ring buffer.

use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_queue::SegQueue;

use crate::tracing::event_info::EventInfo;
use crate::tracing::subscriber::{CallStackId, Subscriber, Timestamp};
use crate::tracing::Level;

/// Oversize messages are truncated to this many bytes (at a char boundary)
/// before printing, so a single runaway message can't dominate the worker.
const MAX_MESSAGE_LEN: usize = 32 * 1024;

/// Whether to colorize stderr output with ANSI escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Colorize only if stderr is a terminal.
    #[default]
    Auto,
    /// Always colorize.
    Always,
    /// Never colorize.
    Never,
}

impl ColorMode {
    fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::stderr().is_terminal(),
        }
    }
}

struct QueuedMessage {
    time: Timestamp,
    level: Level,
    info: &'static EventInfo,
    message: String,
    span_chain: Vec<&'static EventInfo>,
}

/// A subscriber that prints log messages to stderr from a dedicated worker
/// thread.
pub struct StderrSubscriber {
    queue: Arc<SegQueue<QueuedMessage>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl StderrSubscriber {
    /// Spawns the worker thread.
    #[must_use]
    pub fn new(color: ColorMode) -> Self {
        let queue = Arc::new(SegQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_queue = Arc::clone(&queue);
        let worker_shutdown = Arc::clone(&shutdown);
        let worker = std::thread::Builder::new()
            .name("fimo-tracing-stderr".to_owned())
            .spawn(move || worker_loop(&worker_queue, &worker_shutdown, color))
            .expect("failed to spawn stderr subscriber worker thread");

        Self {
            queue,
            shutdown,
            worker: Some(worker),
        }
    }
}

fn worker_loop(queue: &SegQueue<QueuedMessage>, shutdown: &AtomicBool, color: ColorMode) {
    let colorize = color.enabled();
    loop {
        match queue.pop() {
            Some(msg) => write_message(&msg, colorize),
            None => {
                if shutdown.load(Ordering::Acquire) {
                    // Drain whatever arrived between the last pop and the
                    // shutdown flag being observed, then exit.
                    while let Some(msg) = queue.pop() {
                        write_message(&msg, colorize);
                    }
                    return;
                }
                std::thread::yield_now();
            }
        }
    }
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Off => "",
        Level::Error => "\x1b[31m",
        Level::Warn => "\x1b[33m",
        Level::Info => "\x1b[32m",
        Level::Debug => "\x1b[36m",
        Level::Trace => "\x1b[90m",
    }
}

fn truncate(message: &str) -> &str {
    if message.len() <= MAX_MESSAGE_LEN {
        return message;
    }
    let mut end = MAX_MESSAGE_LEN;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

fn write_message(msg: &QueuedMessage, colorize: bool) {
    let mut stderr = std::io::stderr().lock();
    let body = truncate(&msg.message);
    let reset = if colorize { "\x1b[0m" } else { "" };
    let color = if colorize { level_color(msg.level) } else { "" };

    let write_result = (|| -> std::io::Result<()> {
        write!(
            stderr,
            "{color}[{:>5}]{reset} {}:{}: {}",
            format!("{:?}", msg.level),
            msg.info.file,
            msg.info.line,
            body
        )?;
        if !msg.span_chain.is_empty() {
            write!(stderr, " (")?;
            for (i, frame) in msg.span_chain.iter().enumerate() {
                if i > 0 {
                    write!(stderr, " < ")?;
                }
                write!(stderr, "{}", frame.name)?;
            }
            write!(stderr, ")")?;
        }
        writeln!(stderr)
    })();

    // Per §4.4: if the stderr write fails, drop the message and continue.
    let _ = write_result;
}

impl Subscriber for StderrSubscriber {
    fn log_message(
        &self,
        time: Timestamp,
        _stack: CallStackId,
        info: &'static EventInfo,
        message: &str,
        span_chain: &[&'static EventInfo],
    ) {
        self.queue.push(QueuedMessage {
            time,
            level: info.level,
            info,
            message: message.to_owned(),
            span_chain: span_chain.to_vec(),
        });
    }

    fn finish(&self, _time: Timestamp) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl Drop for StderrSubscriber {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
