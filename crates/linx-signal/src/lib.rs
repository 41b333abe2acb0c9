//! LINX Signaling - Encrypted offer exchange over an untrusted relay
//!
//! This crate provides:
//! - The relay link seam (a pair of frame channels)
//! - Offer payloads carrying the sender's parent chain
//! - The signaling client: subscribe, announce, send offers, and an ordered
//!   stream of inbound join requests and decrypted offers

pub mod client;
pub mod link;
pub mod payload;

pub use client::*;
pub use link::*;
pub use payload::*;
