//! In-memory relay
//!
//! Each `link()` attaches a session to a shared `Relay` and bridges it to a
//! `RelayLink` with one task, the same way a TCP session is bridged by the
//! relay server. Loss and latency apply to relay-to-peer delivery only.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::trace;

use linx_relay::Relay;
use linx_signal::RelayLink;

/// Delivery impairments for in-memory links
#[derive(Clone, Debug, PartialEq)]
pub struct LinkChaos {
    /// Probability that a frame from the relay is dropped (0.0 - 1.0)
    pub loss_rate: f64,
    /// Delay applied to every frame from the relay
    pub latency: Duration,
    /// RNG seed; each link mixes in its session id
    pub seed: u64,
}

impl Default for LinkChaos {
    fn default() -> Self {
        LinkChaos {
            loss_rate: 0.0,
            latency: Duration::ZERO,
            seed: 0x5EED,
        }
    }
}

impl LinkChaos {
    pub fn lossy(loss_rate: f64) -> Self {
        LinkChaos {
            loss_rate: loss_rate.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Relay shared by in-process peers
#[derive(Clone, Debug, Default)]
pub struct InMemoryRelay {
    relay: Arc<Relay>,
    chaos: Option<LinkChaos>,
}

impl InMemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chaos(mut self, chaos: LinkChaos) -> Self {
        self.chaos = Some(chaos);
        self
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Attach a new session. Must be called inside a tokio runtime. The
    /// session is detached once the link's outbound half is dropped.
    pub fn link(&self) -> RelayLink {
        let (session, mut from_relay) = self.relay.attach();
        let (to_relay, mut from_peer) = mpsc::unbounded_channel();
        let (to_peer, peer_inbound) = mpsc::unbounded_channel();

        let relay = Arc::clone(&self.relay);
        let chaos = self.chaos.clone();
        let mut rng = chaos
            .as_ref()
            .map(|c| StdRng::seed_from_u64(c.seed ^ session.0));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = from_peer.recv() => match frame {
                        Some(frame) => relay.handle_frame(session, frame),
                        None => break,
                    },
                    Some(frame) = from_relay.recv() => {
                        if let (Some(chaos), Some(rng)) = (&chaos, rng.as_mut()) {
                            if rng.gen_bool(chaos.loss_rate.clamp(0.0, 1.0)) {
                                trace!(%session, kind = ?frame.kind(), "frame lost");
                                continue;
                            }
                            if !chaos.latency.is_zero() {
                                tokio::time::sleep(chaos.latency).await;
                            }
                        }
                        // The peer may be gone; keep serving until its
                        // outbound half closes.
                        let _ = to_peer.send(frame);
                    }
                }
            }
            relay.detach(session);
        });

        RelayLink::new(to_relay, peer_inbound)
    }
}
