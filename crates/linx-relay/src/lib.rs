//! LINX Relay - Delivery substrate for signaling traffic
//!
//! The relay knows nothing about topology or cryptography. It keeps two
//! indexes and routes by them:
//!
//! - scope -> sessions, for fanning join announcements out
//! - public key -> sessions (the mailbox), for point-to-point offers
//!
//! Envelopes are forwarded verbatim; the relay cannot read them.

pub mod config;
pub mod index;
pub mod relay;
pub mod server;

pub use config::*;
pub use index::*;
pub use relay::*;
pub use server::*;
