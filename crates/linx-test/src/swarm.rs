//! Swarm harness
//!
//! Starts peers on one in-memory relay with a shared loopback connector and
//! checks topology invariants over their snapshots.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use linx_core::{LinxError, LinxResult, PublicKey};
use linx_crypto::Identity;
use linx_runtime::{PeerConfig, SwarmPeer};
use linx_topology::TopologySnapshot;

use crate::{InMemoryRelay, LinkChaos, LoopbackConnector};

/// Polling period for `wait_for` and `settle`
const POLL: Duration = Duration::from_millis(10);

/// Consecutive quiet polls `settle` requires
const QUIET_POLLS: usize = 5;

/// Many peers on one in-memory relay
pub struct SwarmHarness {
    config: PeerConfig,
    relay: InMemoryRelay,
    connector: Arc<LoopbackConnector>,
    peers: Vec<SwarmPeer>,
}

impl SwarmHarness {
    /// `config.scope` is used for every peer
    pub fn new(config: PeerConfig) -> Self {
        SwarmHarness {
            config,
            relay: InMemoryRelay::new(),
            connector: Arc::new(LoopbackConnector::new()),
            peers: Vec::new(),
        }
    }

    pub fn with_chaos(mut self, chaos: LinkChaos) -> Self {
        self.relay = self.relay.with_chaos(chaos);
        self
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn relay(&self) -> &InMemoryRelay {
        &self.relay
    }

    pub fn connector(&self) -> &Arc<LoopbackConnector> {
        &self.connector
    }

    pub fn peer(&self, index: usize) -> &SwarmPeer {
        &self.peers[index]
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Start a peer with a fresh identity and wait until the relay has its
    /// subscription, so later announcements reach it. Returns its index.
    pub async fn spawn_peer(&mut self) -> LinxResult<usize> {
        self.spawn_peer_with(Identity::generate(), self.config.clone()).await
    }

    pub async fn spawn_peer_with(&mut self, identity: Identity, config: PeerConfig) -> LinxResult<usize> {
        let scope = config.scope()?;
        let before = self.relay.relay().scope_members(&scope).len();

        let link = self.relay.link();
        let peer = SwarmPeer::start_with_link(config, identity, link, self.connector.clone())?;
        debug!(peer = %peer.public_key().short(), index = self.peers.len(), "harness peer started");
        self.peers.push(peer);

        let relay = Arc::clone(self.relay.relay());
        wait_for(Duration::from_secs(5), || {
            let relay = Arc::clone(&relay);
            let scope = scope.clone();
            async move { relay.scope_members(&scope).len() > before }
        })
        .await?;
        Ok(self.peers.len() - 1)
    }

    pub async fn snapshots(&self) -> LinxResult<Vec<TopologySnapshot>> {
        let mut snapshots = Vec::with_capacity(self.peers.len());
        for peer in &self.peers {
            snapshots.push(peer.snapshot().await?);
        }
        Ok(snapshots)
    }

    /// Wait until no peer has a pending link for several polls in a row
    pub async fn settle(&self, timeout: Duration) -> LinxResult<Vec<TopologySnapshot>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut quiet = 0;
        loop {
            let snapshots = self.snapshots().await?;
            if snapshots.iter().all(|s| s.pending.is_empty()) {
                quiet += 1;
                if quiet >= QUIET_POLLS {
                    return Ok(snapshots);
                }
            } else {
                quiet = 0;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LinxError::TransportError("swarm did not settle".into()));
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Violations of the topology invariants, empty when all hold
    pub fn check_invariants(&self, snapshots: &[TopologySnapshot]) -> Vec<String> {
        let mut violations = Vec::new();
        for s in snapshots {
            let me = s.public_key.short();
            if s.incoming.len() > self.config.max_incoming {
                violations.push(format!("{}: {} incoming > {}", me, s.incoming.len(), self.config.max_incoming));
            }
            if s.outgoing.len() > self.config.max_outgoing {
                violations.push(format!("{}: {} outgoing > {}", me, s.outgoing.len(), self.config.max_outgoing));
            }
            if s.parents.contains(&s.public_key) {
                violations.push(format!("{}: own key in parent chain", me));
            }
            for key in s.outgoing.iter().filter(|k| s.parents.contains(k)) {
                violations.push(format!("{}: ancestor {} in outgoing", me, key.short()));
            }

            let incoming: HashSet<&PublicKey> = s.incoming.iter().collect();
            for key in &s.outgoing {
                if incoming.contains(key) {
                    violations.push(format!("{}: {} is both incoming and outgoing", me, key.short()));
                }
                if *key == s.public_key {
                    violations.push(format!("{}: linked to itself", me));
                }
            }
        }
        violations
    }

    /// Stop every peer
    pub async fn shutdown(self) -> LinxResult<()> {
        for peer in self.peers {
            peer.stop().await?;
        }
        Ok(())
    }
}

/// Poll `check` until it yields true or `timeout` elapses
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> LinxResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(LinxError::TransportError("condition not reached in time".into()));
        }
        tokio::time::sleep(POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linx_core::{ParentChain, Scope};

    fn key(n: u8) -> PublicKey {
        PublicKey::from_bytes([n; 32])
    }

    fn snapshot(me: u8, parents: &[u8], incoming: &[u8], outgoing: &[u8]) -> TopologySnapshot {
        TopologySnapshot {
            public_key: key(me),
            scope: Some(Scope::new("swarm1").unwrap()),
            parents: ParentChain::from_keys(parents.iter().map(|n| key(*n))),
            incoming: incoming.iter().map(|n| key(*n)).collect(),
            outgoing: outgoing.iter().map(|n| key(*n)).collect(),
            pending: Vec::new(),
        }
    }

    #[test]
    fn test_healthy_snapshot_has_no_violations() {
        let harness = SwarmHarness::new(PeerConfig::default().with_scope("swarm1"));
        let snapshots = [snapshot(3, &[1, 2], &[2], &[4, 5])];
        assert!(harness.check_invariants(&snapshots).is_empty());
    }

    #[test]
    fn test_ancestor_in_outgoing_is_reported() {
        let harness = SwarmHarness::new(PeerConfig::default().with_scope("swarm1"));
        let snapshots = [snapshot(3, &[1, 2], &[2], &[1])];
        let violations = harness.check_invariants(&snapshots);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("ancestor"));
    }

    #[test]
    fn test_bounds_and_overlap_are_reported() {
        let harness = SwarmHarness::new(PeerConfig::default().with_scope("swarm1").with_slots(1, 2));
        let snapshots = [snapshot(3, &[], &[4, 5], &[4, 6, 7])];
        let violations = harness.check_invariants(&snapshots);
        assert_eq!(violations.len(), 3);
    }
}
