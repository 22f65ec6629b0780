//! Wire protocol for the network tracing subscriber (`spec.md` §4.5).
//!
//! Everything here is little-endian, fixed-prefix-then-variable-tail
//! packed bytes, matching the spec's "strings are not null-terminated over
//! the wire" framing. Handshake and frame tags are a small closed set;
//! event tags are the twenty events a subscriber can observe.

use crate::error::{Error, ErrorKind};

/// The fixed 27-byte client identification string.
pub const CLIENT_NAME: &[u8] = b"Fimo Tracing Network Client";

/// Protocol major version this build implements.
pub const VERSION_MAJOR: u8 = 1;
/// Protocol minor version this build implements.
pub const VERSION_MINOR: u8 = 0;

/// The 29-byte handshake a client sends on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// Client-reported major version.
    pub version_major: u8,
    /// Client-reported minor version.
    pub version_minor: u8,
}

impl Handshake {
    /// This build's handshake.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
        }
    }

    /// Encodes the 29-byte handshake.
    #[must_use]
    pub fn encode(self) -> [u8; 29] {
        let mut buf = [0u8; 29];
        buf[..27].copy_from_slice(CLIENT_NAME);
        buf[27] = self.version_major;
        buf[28] = self.version_minor;
        buf
    }

    /// Decodes a 29-byte handshake, rejecting a mismatched name.
    pub fn decode(buf: &[u8; 29]) -> crate::error::Result<Self> {
        if &buf[..27] != CLIENT_NAME {
            return Err(Error::new(
                ErrorKind::Protocol,
                "network tracing handshake: client name mismatch",
            ));
        }
        Ok(Self {
            version_major: buf[27],
            version_minor: buf[28],
        })
    }

    /// Whether `self` (the client's handshake) is acceptable to a server
    /// declaring `server_minor` as its own minor version.
    ///
    /// Major versions must match exactly; the client's minor version must
    /// not exceed the server's (the server must understand every message
    /// the client might send).
    #[must_use]
    pub const fn is_compatible_with(self, server_minor: u8) -> bool {
        self.version_major == VERSION_MAJOR && self.version_minor <= server_minor
    }
}

/// The server's response to a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeResponse {
    /// The client is compatible; proceed to framing.
    Accept,
    /// Incompatible; the connection will be closed.
    Reject {
        /// The server's major version, for diagnostics.
        version_major: u8,
        /// The server's minor version, for diagnostics.
        version_minor: u8,
    },
}

impl HandshakeResponse {
    /// Encodes the response.
    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        match self {
            Self::Accept => 0u16.to_le_bytes().to_vec(),
            Self::Reject {
                version_major,
                version_minor,
            } => {
                let mut buf = 1u16.to_le_bytes().to_vec();
                buf.push(version_major);
                buf.push(version_minor);
                buf
            }
        }
    }
}

/// A post-handshake frame tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameTag {
    /// Sender finished; close the connection.
    Close = 2,
    /// A length-prefixed block of packed events follows.
    RawBlock = 3,
}

impl FrameTag {
    /// Parses a frame tag from its wire value.
    #[must_use]
    pub const fn from_u16(tag: u16) -> Option<Self> {
        match tag {
            2 => Some(Self::Close),
            3 => Some(Self::RawBlock),
            _ => None,
        }
    }
}

/// The maximum byte length of a single `RawBlock` payload.
pub const MAX_RAW_BLOCK_LEN: usize = u16::MAX as usize;

/// The tag identifying an individual packed event within a raw block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventTag {
    Start = 0,
    Finish = 1,
    RegisterThread = 2,
    UnregisterThread = 3,
    CreateCallStack = 4,
    DestroyCallStack = 5,
    UnblockCallStack = 6,
    SuspendCallStack = 7,
    ResumeCallStack = 8,
    EnterSpan = 9,
    ExitSpan = 10,
    LogMessage = 11,
    DeclareEventInfo = 12,
    StartThread = 13,
    StopThread = 14,
    LoadImage = 15,
    UnloadImage = 16,
    ContextSwitch = 17,
    ThreadWakeup = 18,
    CallStackSample = 19,
}

impl EventTag {
    #[must_use]
    const fn from_u16(tag: u16) -> Option<Self> {
        Some(match tag {
            0 => Self::Start,
            1 => Self::Finish,
            2 => Self::RegisterThread,
            3 => Self::UnregisterThread,
            4 => Self::CreateCallStack,
            5 => Self::DestroyCallStack,
            6 => Self::UnblockCallStack,
            7 => Self::SuspendCallStack,
            8 => Self::ResumeCallStack,
            9 => Self::EnterSpan,
            10 => Self::ExitSpan,
            11 => Self::LogMessage,
            12 => Self::DeclareEventInfo,
            13 => Self::StartThread,
            14 => Self::StopThread,
            15 => Self::LoadImage,
            16 => Self::UnloadImage,
            17 => Self::ContextSwitch,
            18 => Self::ThreadWakeup,
            19 => Self::CallStackSample,
            _ => return None,
        })
    }
}

/// A decoded event, owning any variable-length tail data.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Start { time: u64 },
    Finish { time: u64 },
    RegisterThread { time: u64 },
    UnregisterThread { time: u64 },
    CreateCallStack { time: u64, stack: u64 },
    DestroyCallStack { time: u64, stack: u64 },
    UnblockCallStack { time: u64, stack: u64 },
    SuspendCallStack { time: u64, stack: u64, blocked: bool },
    ResumeCallStack { time: u64, stack: u64 },
    EnterSpan { time: u64, stack: u64, message: String },
    ExitSpan { time: u64, stack: u64, unwinding: bool },
    LogMessage { time: u64, stack: u64, message: String },
    DeclareEventInfo { time: u64, file: String, line: u32, level: u8, name: String },
    StartThread { time: u64, os_tid: u64 },
    StopThread { time: u64, os_tid: u64 },
    LoadImage { time: u64, base: u64, path: String },
    UnloadImage { time: u64, base: u64 },
    ContextSwitch { time: u64, from_tid: u64, to_tid: u64 },
    ThreadWakeup { time: u64, os_tid: u64 },
    CallStackSample { time: u64, os_tid: u64, frames: Vec<u64> },
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_str(buf: &[u8], pos: &mut usize) -> crate::error::Result<String> {
    let len = read_u32(buf, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| Error::new(ErrorKind::Protocol, "wire event: truncated string"))?;
    let s = std::str::from_utf8(&buf[*pos..end])
        .map_err(|_| Error::new(ErrorKind::InvalidUtf8, "wire event: string is not valid utf-8"))?
        .to_owned();
    *pos = end;
    Ok(s)
}

fn read_u64(buf: &[u8], pos: &mut usize) -> crate::error::Result<u64> {
    let end = *pos + 8;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| Error::new(ErrorKind::Protocol, "wire event: truncated u64"))?;
    *pos = end;
    Ok(u64::from_le_bytes(bytes.try_into().expect("slice of len 8")))
}

fn read_u32(buf: &[u8], pos: &mut usize) -> crate::error::Result<u32> {
    let end = *pos + 4;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| Error::new(ErrorKind::Protocol, "wire event: truncated u32"))?;
    *pos = end;
    Ok(u32::from_le_bytes(bytes.try_into().expect("slice of len 4")))
}

fn read_u16(buf: &[u8], pos: &mut usize) -> crate::error::Result<u16> {
    let end = *pos + 2;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| Error::new(ErrorKind::Protocol, "wire event: truncated u16"))?;
    *pos = end;
    Ok(u16::from_le_bytes(bytes.try_into().expect("slice of len 2")))
}

fn read_u8(buf: &[u8], pos: &mut usize) -> crate::error::Result<u8> {
    let byte = *buf
        .get(*pos)
        .ok_or_else(|| Error::new(ErrorKind::Protocol, "wire event: truncated u8"))?;
    *pos += 1;
    Ok(byte)
}

impl WireEvent {
    /// Encodes this event as `EventTag` (u16 LE) followed by its packed
    /// fixed prefix and variable tail.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        macro_rules! tag {
            ($t:expr) => {
                buf.extend_from_slice(&(($t) as u16).to_le_bytes())
            };
        }
        match self {
            Self::Start { time } => {
                tag!(EventTag::Start);
                buf.extend_from_slice(&time.to_le_bytes());
            }
            Self::Finish { time } => {
                tag!(EventTag::Finish);
                buf.extend_from_slice(&time.to_le_bytes());
            }
            Self::RegisterThread { time } => {
                tag!(EventTag::RegisterThread);
                buf.extend_from_slice(&time.to_le_bytes());
            }
            Self::UnregisterThread { time } => {
                tag!(EventTag::UnregisterThread);
                buf.extend_from_slice(&time.to_le_bytes());
            }
            Self::CreateCallStack { time, stack } => {
                tag!(EventTag::CreateCallStack);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&stack.to_le_bytes());
            }
            Self::DestroyCallStack { time, stack } => {
                tag!(EventTag::DestroyCallStack);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&stack.to_le_bytes());
            }
            Self::UnblockCallStack { time, stack } => {
                tag!(EventTag::UnblockCallStack);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&stack.to_le_bytes());
            }
            Self::SuspendCallStack { time, stack, blocked } => {
                tag!(EventTag::SuspendCallStack);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&stack.to_le_bytes());
                buf.push(u8::from(*blocked));
            }
            Self::ResumeCallStack { time, stack } => {
                tag!(EventTag::ResumeCallStack);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&stack.to_le_bytes());
            }
            Self::EnterSpan { time, stack, message } => {
                tag!(EventTag::EnterSpan);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&stack.to_le_bytes());
                push_str(&mut buf, message);
            }
            Self::ExitSpan { time, stack, unwinding } => {
                tag!(EventTag::ExitSpan);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&stack.to_le_bytes());
                buf.push(u8::from(*unwinding));
            }
            Self::LogMessage { time, stack, message } => {
                tag!(EventTag::LogMessage);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&stack.to_le_bytes());
                push_str(&mut buf, message);
            }
            Self::DeclareEventInfo { time, file, line, level, name } => {
                tag!(EventTag::DeclareEventInfo);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&line.to_le_bytes());
                buf.push(*level);
                push_str(&mut buf, file);
                push_str(&mut buf, name);
            }
            Self::StartThread { time, os_tid } => {
                tag!(EventTag::StartThread);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&os_tid.to_le_bytes());
            }
            Self::StopThread { time, os_tid } => {
                tag!(EventTag::StopThread);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&os_tid.to_le_bytes());
            }
            Self::LoadImage { time, base, path } => {
                tag!(EventTag::LoadImage);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&base.to_le_bytes());
                push_str(&mut buf, path);
            }
            Self::UnloadImage { time, base } => {
                tag!(EventTag::UnloadImage);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&base.to_le_bytes());
            }
            Self::ContextSwitch { time, from_tid, to_tid } => {
                tag!(EventTag::ContextSwitch);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&from_tid.to_le_bytes());
                buf.extend_from_slice(&to_tid.to_le_bytes());
            }
            Self::ThreadWakeup { time, os_tid } => {
                tag!(EventTag::ThreadWakeup);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&os_tid.to_le_bytes());
            }
            Self::CallStackSample { time, os_tid, frames } => {
                tag!(EventTag::CallStackSample);
                buf.extend_from_slice(&time.to_le_bytes());
                buf.extend_from_slice(&os_tid.to_le_bytes());
                buf.extend_from_slice(&(frames.len() as u32).to_le_bytes());
                for frame in frames {
                    buf.extend_from_slice(&frame.to_le_bytes());
                }
            }
        }
        buf
    }

    /// Decodes a single event, returning the event and the number of bytes
    /// consumed.
    pub fn decode(buf: &[u8]) -> crate::error::Result<(Self, usize)> {
        let mut pos = 0;
        let tag = EventTag::from_u16(read_u16(buf, &mut pos)?)
            .ok_or_else(|| Error::new(ErrorKind::Protocol, "wire event: unknown event tag"))?;

        let event = match tag {
            EventTag::Start => Self::Start { time: read_u64(buf, &mut pos)? },
            EventTag::Finish => Self::Finish { time: read_u64(buf, &mut pos)? },
            EventTag::RegisterThread => Self::RegisterThread { time: read_u64(buf, &mut pos)? },
            EventTag::UnregisterThread => Self::UnregisterThread { time: read_u64(buf, &mut pos)? },
            EventTag::CreateCallStack => Self::CreateCallStack {
                time: read_u64(buf, &mut pos)?,
                stack: read_u64(buf, &mut pos)?,
            },
            EventTag::DestroyCallStack => Self::DestroyCallStack {
                time: read_u64(buf, &mut pos)?,
                stack: read_u64(buf, &mut pos)?,
            },
            EventTag::UnblockCallStack => Self::UnblockCallStack {
                time: read_u64(buf, &mut pos)?,
                stack: read_u64(buf, &mut pos)?,
            },
            EventTag::SuspendCallStack => {
                let time = read_u64(buf, &mut pos)?;
                let stack = read_u64(buf, &mut pos)?;
                let blocked = read_u8(buf, &mut pos)? != 0;
                Self::SuspendCallStack { time, stack, blocked }
            }
            EventTag::ResumeCallStack => Self::ResumeCallStack {
                time: read_u64(buf, &mut pos)?,
                stack: read_u64(buf, &mut pos)?,
            },
            EventTag::EnterSpan => {
                let time = read_u64(buf, &mut pos)?;
                let stack = read_u64(buf, &mut pos)?;
                let message = read_str(buf, &mut pos)?;
                Self::EnterSpan { time, stack, message }
            }
            EventTag::ExitSpan => {
                let time = read_u64(buf, &mut pos)?;
                let stack = read_u64(buf, &mut pos)?;
                let unwinding = read_u8(buf, &mut pos)? != 0;
                Self::ExitSpan { time, stack, unwinding }
            }
            EventTag::LogMessage => {
                let time = read_u64(buf, &mut pos)?;
                let stack = read_u64(buf, &mut pos)?;
                let message = read_str(buf, &mut pos)?;
                Self::LogMessage { time, stack, message }
            }
            EventTag::DeclareEventInfo => {
                let time = read_u64(buf, &mut pos)?;
                let line = read_u32(buf, &mut pos)?;
                let level = read_u8(buf, &mut pos)?;
                let file = read_str(buf, &mut pos)?;
                let name = read_str(buf, &mut pos)?;
                Self::DeclareEventInfo { time, file, line, level, name }
            }
            EventTag::StartThread => Self::StartThread {
                time: read_u64(buf, &mut pos)?,
                os_tid: read_u64(buf, &mut pos)?,
            },
            EventTag::StopThread => Self::StopThread {
                time: read_u64(buf, &mut pos)?,
                os_tid: read_u64(buf, &mut pos)?,
            },
            EventTag::LoadImage => {
                let time = read_u64(buf, &mut pos)?;
                let base = read_u64(buf, &mut pos)?;
                let path = read_str(buf, &mut pos)?;
                Self::LoadImage { time, base, path }
            }
            EventTag::UnloadImage => Self::UnloadImage {
                time: read_u64(buf, &mut pos)?,
                base: read_u64(buf, &mut pos)?,
            },
            EventTag::ContextSwitch => Self::ContextSwitch {
                time: read_u64(buf, &mut pos)?,
                from_tid: read_u64(buf, &mut pos)?,
                to_tid: read_u64(buf, &mut pos)?,
            },
            EventTag::ThreadWakeup => Self::ThreadWakeup {
                time: read_u64(buf, &mut pos)?,
                os_tid: read_u64(buf, &mut pos)?,
            },
            EventTag::CallStackSample => {
                let time = read_u64(buf, &mut pos)?;
                let os_tid = read_u64(buf, &mut pos)?;
                let count = read_u32(buf, &mut pos)? as usize;
                let mut frames = Vec::with_capacity(count);
                for _ in 0..count {
                    frames.push(read_u64(buf, &mut pos)?);
                }
                Self::CallStackSample { time, os_tid, frames }
            }
        };
        Ok((event, pos))
    }
}

/// Splits a `RawBlock` payload into the individual events packed into it.
pub fn decode_block(mut buf: &[u8]) -> crate::error::Result<Vec<WireEvent>> {
    let mut events = Vec::new();
    while !buf.is_empty() {
        let (event, consumed) = WireEvent::decode(buf)?;
        events.push(event);
        buf = &buf[consumed..];
    }
    Ok(events)
}
