//! LINX Test Harness - Swarm simulation without sockets
//!
//! This crate provides:
//! - An in-memory relay that hands out `RelayLink`s, with optional loss and
//!   latency on delivery
//! - A loopback `PeerConnector` whose handshakes complete, stall, or fail on
//!   demand
//! - A swarm harness that starts many peers and checks topology invariants

pub mod loopback;
pub mod memory;
pub mod swarm;

pub use loopback::*;
pub use memory::*;
pub use swarm::*;
