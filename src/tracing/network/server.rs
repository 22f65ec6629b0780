//! Network subscriber: server (collector) side (`spec.md` §4.5).
//!
//! The collector accepts a connection, validates the handshake, then reads
//! `RawBlock`/`Close` frames until the client closes, the connection
//! resets, or a frame fails to parse — any of which end the connection the
//! same way: stop reading and return, without retrying.

use std::io::Read;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::{Error, ErrorKind};
use crate::tracing::network::client::respond_to;
use crate::tracing::network::protocol::{decode_block, FrameTag, Handshake, HandshakeResponse, WireEvent};

/// A bound TCP listener accepting tracing client connections.
pub struct Server {
    listener: TcpListener,
    /// This server's minor version, advertised during the handshake.
    server_minor: u8,
}

impl Server {
    /// Binds a listener on `addr`.
    pub fn bind(addr: impl ToSocketAddrs, server_minor: u8) -> crate::error::Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| Error::wrap(ErrorKind::Protocol, e))?;
        Ok(Self { listener, server_minor })
    }

    /// The address this server is actually listening on (useful when `addr`
    /// used port 0).
    pub fn local_addr(&self) -> crate::error::Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| Error::wrap(ErrorKind::Protocol, e))
    }

    /// Accepts a single connection and serves it to completion, forwarding
    /// every decoded event to `on_event`. Returns once the client closes,
    /// the connection resets, or a frame fails to parse.
    pub fn accept_one(&self, mut on_event: impl FnMut(WireEvent)) -> crate::error::Result<()> {
        let (stream, _addr) = self
            .listener
            .accept()
            .map_err(|e| Error::wrap(ErrorKind::Protocol, e))?;
        serve_connection(stream, self.server_minor, &mut on_event)
    }
}

/// Serves a single already-accepted connection: handshake, then frames
/// until EOF/close/error.
pub fn serve_connection(
    mut stream: TcpStream,
    server_minor: u8,
    on_event: &mut impl FnMut(WireEvent),
) -> crate::error::Result<()> {
    let mut handshake_buf = [0u8; 29];
    if stream.read_exact(&mut handshake_buf).is_err() {
        // Partial read during handshake: drop the connection cleanly.
        return Ok(());
    }
    let client = match Handshake::decode(&handshake_buf) {
        Ok(hs) => hs,
        Err(_) => {
            write_reject(&stream, server_minor);
            return Ok(());
        }
    };

    match respond_to(client, server_minor) {
        HandshakeResponse::Accept => {
            use std::io::Write as _;
            let _ = stream.write_all(&HandshakeResponse::Accept.encode());
        }
        HandshakeResponse::Reject { .. } => {
            write_reject(&stream, server_minor);
            return Ok(());
        }
    }

    loop {
        let mut tag_buf = [0u8; 2];
        if stream.read_exact(&mut tag_buf).is_err() {
            return Ok(());
        }
        let Some(tag) = FrameTag::from_u16(u16::from_le_bytes(tag_buf)) else {
            return Ok(());
        };
        match tag {
            FrameTag::Close => return Ok(()),
            FrameTag::RawBlock => {
                let mut len_buf = [0u8; 2];
                if stream.read_exact(&mut len_buf).is_err() {
                    return Ok(());
                }
                let len = u16::from_le_bytes(len_buf) as usize;
                let mut payload = vec![0u8; len];
                if stream.read_exact(&mut payload).is_err() {
                    return Ok(());
                }
                match decode_block(&payload) {
                    Ok(events) => {
                        for event in events {
                            on_event(event);
                        }
                    }
                    Err(_) => return Ok(()),
                }
            }
        }
    }
}

fn write_reject(mut stream: &TcpStream, server_minor: u8) {
    use std::io::Write as _;
    let response = HandshakeResponse::Reject {
        version_major: crate::tracing::network::protocol::VERSION_MAJOR,
        version_minor: server_minor,
    };
    let _ = stream.write_all(&response.encode());
}
