//! Relay link - the delivery substrate as seen by a peer
//!
//! A link is a pair of frame channels. The TCP transport and the in-process
//! test relay both produce one; the signaling client does not care which.

use tokio::sync::mpsc;

use linx_wire::RelayFrame;

/// Outbound half of a relay link
pub type FrameSender = mpsc::UnboundedSender<RelayFrame>;

/// Inbound half of a relay link
pub type FrameReceiver = mpsc::UnboundedReceiver<RelayFrame>;

/// Bidirectional frame channel to one relay
#[derive(Debug)]
pub struct RelayLink {
    /// Frames queued for the relay
    pub outbound: FrameSender,
    /// Frames delivered by the relay
    pub inbound: FrameReceiver,
}

impl RelayLink {
    pub fn new(outbound: FrameSender, inbound: FrameReceiver) -> Self {
        RelayLink { outbound, inbound }
    }

    /// Two cross-wired links, for tests that play the relay by hand.
    /// Returns `(peer side, relay side)`.
    pub fn pair() -> (RelayLink, RelayLink) {
        let (to_relay, from_peer) = mpsc::unbounded_channel();
        let (to_peer, from_relay) = mpsc::unbounded_channel();
        (
            RelayLink::new(to_relay, from_relay),
            RelayLink::new(to_peer, from_peer),
        )
    }
}
