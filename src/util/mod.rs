//! Internal utilities shared across subsystems.

pub mod arena;

pub use arena::{Arena, ArenaIndex};
