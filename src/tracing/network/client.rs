//! Network subscriber: client side (`spec.md` §4.5).
//!
//! Performs the handshake, then hands every subscriber callback to a
//! worker thread that batches events into length-prefixed `RawBlock`
//! frames no larger than [`MAX_RAW_BLOCK_LEN`] and writes them to the
//! socket. A partial read/write, a reset connection, or a handshake
//! mismatch all end the worker the same way: drop whatever is left in the
//! queue and exit without propagating the error further, matching the
//! spec's "drops remaining events, clears the queue, and exits cleanly".

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_queue::SegQueue;

use crate::error::{Error, ErrorKind};
use crate::tracing::event_info::EventInfo;
use crate::tracing::network::protocol::{FrameTag, Handshake, HandshakeResponse, WireEvent, MAX_RAW_BLOCK_LEN};
use crate::tracing::subscriber::{CallStackId, ExitReason, Subscriber, Timestamp};

/// Performs the client-side handshake on an already-connected stream.
pub fn handshake(stream: &mut TcpStream) -> crate::error::Result<()> {
    let request = Handshake::current().encode();
    stream
        .write_all(&request)
        .map_err(|e| Error::wrap(ErrorKind::Protocol, e))?;

    let mut tag = [0u8; 2];
    stream
        .read_exact(&mut tag)
        .map_err(|e| Error::wrap(ErrorKind::Protocol, e))?;
    match u16::from_le_bytes(tag) {
        0 => Ok(()),
        1 => {
            let mut versions = [0u8; 2];
            stream
                .read_exact(&mut versions)
                .map_err(|e| Error::wrap(ErrorKind::Protocol, e))?;
            Err(Error::with_message(
                ErrorKind::VersionNotSupported,
                format!(
                    "network tracing server rejected handshake (server version {}.{})",
                    versions[0], versions[1]
                ),
            ))
        }
        other => Err(Error::with_message(
            ErrorKind::Protocol,
            format!("network tracing handshake: unexpected response tag {other}"),
        )),
    }
}

/// Connects to `addr` and performs the handshake, returning the connected
/// stream on success.
pub fn connect(addr: impl ToSocketAddrs) -> crate::error::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).map_err(|e| Error::wrap(ErrorKind::Protocol, e))?;
    handshake(&mut stream)?;
    Ok(stream)
}

/// A subscriber that ships events to a remote collector over TCP.
pub struct NetworkSubscriber {
    queue: Arc<SegQueue<WireEvent>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl NetworkSubscriber {
    /// Spawns the batching worker over an already-handshaken `stream`.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        let queue = Arc::new(SegQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_queue = Arc::clone(&queue);
        let worker_shutdown = Arc::clone(&shutdown);
        let worker = std::thread::Builder::new()
            .name("fimo-tracing-network".to_owned())
            .spawn(move || worker_loop(stream, &worker_queue, &worker_shutdown))
            .expect("failed to spawn network subscriber worker thread");

        Self {
            queue,
            shutdown,
            worker: Some(worker),
        }
    }
}

fn worker_loop(mut stream: TcpStream, queue: &SegQueue<WireEvent>, shutdown: &AtomicBool) {
    loop {
        let mut block = Vec::new();
        while let Some(event) = queue.pop() {
            let encoded = event.encode();
            if block.len() + encoded.len() > MAX_RAW_BLOCK_LEN {
                if send_block(&mut stream, &block).is_err() {
                    return;
                }
                block.clear();
            }
            block.extend_from_slice(&encoded);
        }
        if !block.is_empty() && send_block(&mut stream, &block).is_err() {
            return;
        }
        if shutdown.load(Ordering::Acquire) {
            let _ = send_close(&mut stream);
            return;
        }
        std::thread::yield_now();
    }
}

fn send_block(stream: &mut TcpStream, block: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(FrameTag::RawBlock as u16).to_le_bytes())?;
    stream.write_all(&(block.len() as u16).to_le_bytes())?;
    stream.write_all(block)
}

fn send_close(stream: &mut TcpStream) -> std::io::Result<()> {
    stream.write_all(&(FrameTag::Close as u16).to_le_bytes())
}

impl Subscriber for NetworkSubscriber {
    fn start(&self, time: Timestamp) {
        self.queue.push(WireEvent::Start { time });
    }

    fn finish(&self, time: Timestamp) {
        self.queue.push(WireEvent::Finish { time });
        self.shutdown.store(true, Ordering::Release);
    }

    fn register_thread(&self, time: Timestamp) {
        self.queue.push(WireEvent::RegisterThread { time });
    }

    fn unregister_thread(&self, time: Timestamp) {
        self.queue.push(WireEvent::UnregisterThread { time });
    }

    fn create_call_stack(&self, time: Timestamp, stack: CallStackId) {
        self.queue.push(WireEvent::CreateCallStack { time, stack });
    }

    fn destroy_call_stack(&self, time: Timestamp, stack: CallStackId) {
        self.queue.push(WireEvent::DestroyCallStack { time, stack });
    }

    fn unblock_call_stack(&self, time: Timestamp, stack: CallStackId) {
        self.queue.push(WireEvent::UnblockCallStack { time, stack });
    }

    fn suspend_call_stack(&self, time: Timestamp, stack: CallStackId, blocked: bool) {
        self.queue.push(WireEvent::SuspendCallStack { time, stack, blocked });
    }

    fn resume_call_stack(&self, time: Timestamp, stack: CallStackId) {
        self.queue.push(WireEvent::ResumeCallStack { time, stack });
    }

    fn enter_span(&self, time: Timestamp, stack: CallStackId, _info: &'static EventInfo, message: &str) {
        self.queue.push(WireEvent::EnterSpan {
            time,
            stack,
            message: message.to_owned(),
        });
    }

    fn exit_span(&self, time: Timestamp, stack: CallStackId, _info: &'static EventInfo, reason: ExitReason) {
        self.queue.push(WireEvent::ExitSpan {
            time,
            stack,
            unwinding: reason == ExitReason::Unwinding,
        });
    }

    fn log_message(
        &self,
        time: Timestamp,
        stack: CallStackId,
        _info: &'static EventInfo,
        message: &str,
        _span_chain: &[&'static EventInfo],
    ) {
        self.queue.push(WireEvent::LogMessage {
            time,
            stack,
            message: message.to_owned(),
        });
    }

    fn declare_event_info(&self, time: Timestamp, info: &'static EventInfo) {
        self.queue.push(WireEvent::DeclareEventInfo {
            time,
            file: info.file.to_owned(),
            line: info.line,
            level: info.level as u8,
            name: info.name.to_owned(),
        });
    }
}

impl Drop for NetworkSubscriber {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Validates a handshake on the server side, producing the response to send
/// back (used by [`crate::tracing::network::server`], exposed here so
/// clients/tests can reason about compatibility without a live socket).
#[must_use]
pub fn respond_to(client: Handshake, server_minor: u8) -> HandshakeResponse {
    if client.is_compatible_with(server_minor) {
        HandshakeResponse::Accept
    } else {
        HandshakeResponse::Reject {
            version_major: crate::tracing::network::protocol::VERSION_MAJOR,
            version_minor: server_minor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respond_to_accepts_matching_major_lower_minor() {
        let client = Handshake { version_major: 1, version_minor: 0 };
        assert_eq!(respond_to(client, 3), HandshakeResponse::Accept);
    }

    #[test]
    fn respond_to_rejects_mismatched_major() {
        let client = Handshake { version_major: 2, version_minor: 0 };
        assert!(matches!(respond_to(client, 3), HandshakeResponse::Reject { .. }));
    }
}
