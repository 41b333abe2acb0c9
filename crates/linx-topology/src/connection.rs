//! Peer connection seam
//!
//! The transport handshake that turns an offer/answer exchange into a live
//! data channel lives outside LINX. A `PeerConnector` creates connections; a
//! connection reports back through the `LinkEvents` it was given.

use std::fmt;

use tokio::sync::mpsc;

use linx_core::{LinxResult, PublicKey};
pub use linx_signal::Role;

/// Identifies one connection attempt. Events from a replaced or expired
/// attempt carry a stale id and are ignored.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({})", self.0)
    }
}

/// What a connection reports
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEventKind {
    /// A signal (offer, answer, candidate) to deliver to the remote peer
    LocalSignal(serde_json::Value),
    /// The data channel is live
    Connected,
    /// The attempt could not be established
    Failed(String),
    /// An established channel went away
    Closed,
}

/// Connection event as seen by the controller
#[derive(Clone, Debug, PartialEq)]
pub struct LinkEvent {
    pub link: LinkId,
    pub remote: PublicKey,
    pub kind: LinkEventKind,
}

/// Sender half handed to every connection
pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

/// Event sink for one connection
#[derive(Clone, Debug)]
pub struct LinkEvents {
    link: LinkId,
    remote: PublicKey,
    tx: LinkEventSender,
}

impl LinkEvents {
    pub fn new(link: LinkId, remote: PublicKey, tx: LinkEventSender) -> Self {
        LinkEvents { link, remote, tx }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn remote(&self) -> PublicKey {
        self.remote
    }

    pub fn local_signal(&self, signal: serde_json::Value) {
        self.emit(LinkEventKind::LocalSignal(signal));
    }

    pub fn connected(&self) {
        self.emit(LinkEventKind::Connected);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.emit(LinkEventKind::Failed(reason.into()));
    }

    pub fn closed(&self) {
        self.emit(LinkEventKind::Closed);
    }

    fn emit(&self, kind: LinkEventKind) {
        // The controller may already be gone during shutdown.
        let _ = self.tx.send(LinkEvent {
            link: self.link,
            remote: self.remote,
            kind,
        });
    }
}

/// One peer-to-peer connection attempt
pub trait PeerConnection: Send {
    /// Feed a signal received from the remote peer
    fn signal(&mut self, signal: serde_json::Value);

    /// Tear the connection down. Must be idempotent.
    fn close(&mut self);
}

/// Creates peer connections.
///
/// An initiator connection is expected to emit its offer through
/// `LinkEvents::local_signal` on its own. A responder emits its answer after
/// the remote offer is fed in with `PeerConnection::signal`.
pub trait PeerConnector: Send + Sync {
    fn connect(
        &self,
        role: Role,
        remote: PublicKey,
        events: LinkEvents,
    ) -> LinxResult<Box<dyn PeerConnection>>;
}
