//! TCP-based tracing subscriber and collector (`spec.md` §4.5).

pub mod client;
pub mod protocol;
pub mod server;

pub use client::NetworkSubscriber;
pub use protocol::{Handshake, HandshakeResponse, WireEvent};
pub use server::Server;
