//! LINX Wire Protocol - Relay frame format
//!
//! This crate implements the frames exchanged between peers and the relay:
//! - Fixed header (6 bytes: version, kind, body length)
//! - Length-prefixed body fields
//! - A `tokio_util` codec for byte streams

pub mod codec;
pub mod frame;
pub mod header;

pub use codec::*;
pub use frame::*;
pub use header::*;
