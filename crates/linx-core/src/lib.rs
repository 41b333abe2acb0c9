//! LINX Core - Fundamental types and primitives
//!
//! This crate defines the vocabulary shared by every LINX component:
//! - Identifiers (PublicKey, Scope, SessionId)
//! - Parent chains used for cycle avoidance
//! - The protocol-wide error type

pub mod chain;
pub mod error;
pub mod id;

pub use chain::*;
pub use error::*;
pub use id::*;
