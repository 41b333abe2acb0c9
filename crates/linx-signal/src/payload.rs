//! Offer payloads - what travels inside an encrypted envelope

use serde::{Deserialize, Serialize};

use linx_core::{LinxError, LinxResult, ParentChain};

/// Which side of a link a peer plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Admitted a join request and opened the link
    Initiator,
    /// Accepted an inbound offer
    Responder,
}

/// Signaling payload exchanged between two peers.
///
/// `signal` is opaque to LINX: it is whatever the peer connection produced
/// (offer, answer, candidates). `parents` is the sender's parent chain so the
/// receiver can run its cycle checks. `role` lets the receiver tell a fresh
/// offer from an answer when both sides opened a link at once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub role: Role,
    pub signal: serde_json::Value,
    #[serde(default)]
    pub parents: ParentChain,
}

impl SignalPayload {
    pub fn new(role: Role, signal: serde_json::Value, parents: ParentChain) -> Self {
        SignalPayload {
            role,
            signal,
            parents,
        }
    }

    /// Deterministic JSON encoding (object keys are emitted sorted)
    pub fn to_bytes(&self) -> LinxResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LinxError::Payload(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> LinxResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| LinxError::Payload(e.to_string()))
    }
}
