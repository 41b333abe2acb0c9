//! Swarm peer
//!
//! A `SwarmPeer` owns everything one participant needs: its identity, the
//! relay link, the signaling client, and the running topology controller.
//! There is no global instance; callers start and stop peers explicitly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use linx_core::{LinxResult, PublicKey};
use linx_crypto::Identity;
use linx_signal::{RelayLink, SignalingClient};
use linx_topology::{ControllerHandle, PeerConnector, TopologyController, TopologySnapshot};

use crate::{connect, PeerConfig, RelayConnection};

/// How long `stop` waits for queued frames to reach the relay
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// One running swarm participant
pub struct SwarmPeer {
    public_key: PublicKey,
    controller: ControllerHandle,
    connection: Option<RelayConnection>,
}

impl SwarmPeer {
    /// Connect to the first configured relay over TCP and join the swarm
    pub async fn start(
        config: PeerConfig,
        identity: Identity,
        connector: Arc<dyn PeerConnector>,
    ) -> LinxResult<Self> {
        config.validate()?;
        let (link, connection) = connect(config.relay_endpoint()?).await?;
        let mut peer = Self::start_with_link(config, identity, link, connector)?;
        peer.connection = Some(connection);
        Ok(peer)
    }

    /// Join the swarm over an existing relay link
    pub fn start_with_link(
        config: PeerConfig,
        identity: Identity,
        link: RelayLink,
        connector: Arc<dyn PeerConnector>,
    ) -> LinxResult<Self> {
        config.validate()?;
        let public_key = identity.public_key();
        let (signaling, signals) = SignalingClient::new(Arc::new(identity), link, config.event_buffer);
        let controller = TopologyController::spawn(
            config.topology(),
            signaling,
            signals,
            connector,
            config.scope.as_str(),
        )?;

        info!(peer = %public_key.short(), scope = %config.scope, "swarm peer started");
        Ok(SwarmPeer {
            public_key,
            controller,
            connection: None,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Broadcast a fresh join announcement
    pub async fn announce(&self) -> LinxResult<()> {
        self.controller.announce().await
    }

    pub async fn snapshot(&self) -> LinxResult<TopologySnapshot> {
        self.controller.snapshot().await
    }

    /// Close all links, leave the scope, and disconnect from the relay
    pub async fn stop(self) -> LinxResult<()> {
        self.controller.stop().await?;

        if let Some(connection) = self.connection {
            let endpoint = connection.endpoint().to_string();
            // Dropping the controller released the link; the socket task
            // flushes the unsubscribe and exits.
            match tokio::time::timeout(FLUSH_TIMEOUT, connection.closed()).await {
                Ok(result) => result?,
                Err(_) => warn!(peer = %self.public_key.short(), %endpoint, "relay flush timed out"),
            }
        }

        info!(peer = %self.public_key.short(), "swarm peer stopped");
        Ok(())
    }
}
