//! LINX Crypto - Identity and signaling envelope encryption
//!
//! Provides the cryptographic primitives used by the signaling protocol:
//! - Identity management (X25519 static key pairs)
//! - Shared key derivation (X25519 + HKDF-SHA256)
//! - AEAD encryption (ChaCha20-Poly1305) with random nonces
//! - Envelope sealing bound to sender and recipient

pub mod aead;
pub mod envelope;
pub mod identity;

pub use aead::*;
pub use envelope::{open, seal};
pub use identity::*;
