//! LINX Topology - Swarm membership for one local peer
//!
//! The controller owns the peer's incoming, outgoing, and pending links and
//! decides which join requests and inbound offers to accept.
//!
//! # Admission
//!
//! Outgoing capacity must exceed incoming capacity so the swarm's offered
//! capacity keeps growing as members join. Cycle avoidance uses parent chains
//! in both directions: a peer never links to one of its own ancestors, and
//! never links to a peer that lists it as an ancestor.
//!
//! # Concurrency
//!
//! All slot mutations happen on the controller task, one event at a time.
//! Signaling events, peer connection events, timer ticks, and handle commands
//! are multiplexed with `tokio::select!`.

pub mod config;
pub mod connection;
pub mod controller;
pub mod policy;
pub mod slots;

pub use config::*;
pub use connection::*;
pub use controller::*;
pub use policy::*;
pub use slots::*;
