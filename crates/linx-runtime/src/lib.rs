//! LINX Runtime - Running a swarm peer
//!
//! This crate wires the pieces together:
//! - `PeerConfig`, loadable from TOML
//! - The TCP relay transport that produces a `RelayLink`
//! - `SwarmPeer`, which owns the identity, signaling client, and topology
//!   controller for one peer
//! - Logging initialisation shared by the binaries

pub mod config;
pub mod logging;
pub mod peer;
pub mod transport;

pub use config::*;
pub use logging::*;
pub use peer::*;
pub use transport::*;
