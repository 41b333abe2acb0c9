//! TCP relay transport
//!
//! Connects to a relay and bridges the socket to a `RelayLink`: frames queued
//! on the link's outbound half are written to the socket, frames read from
//! the socket are delivered on its inbound half. When every outbound sender is
//! gone the queue is flushed and the write side shut down.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use linx_core::{LinxError, LinxResult};
use linx_signal::RelayLink;
use linx_wire::{RelayCodec, RelayFrame};

/// The task driving one relay socket
#[derive(Debug)]
pub struct RelayConnection {
    endpoint: String,
    task: JoinHandle<LinxResult<()>>,
}

impl RelayConnection {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the socket task to finish
    pub async fn closed(self) -> LinxResult<()> {
        self.task
            .await
            .map_err(|e| LinxError::TransportError(format!("relay task: {}", e)))?
    }

    /// Drop the socket without flushing
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Connect to the relay at `endpoint` (`host:port`)
pub async fn connect(endpoint: &str) -> LinxResult<(RelayLink, RelayConnection)> {
    let stream = TcpStream::connect(endpoint).await.map_err(|e| {
        LinxError::TransportError(format!("connect to relay {}: {}", endpoint, e))
    })?;
    stream.set_nodelay(true)?;
    info!(endpoint, "connected to relay");

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let framed = Framed::new(stream, RelayCodec);
    let task = tokio::spawn(pump(endpoint.to_string(), framed, outbound_rx, inbound_tx));

    Ok((
        RelayLink::new(outbound_tx, inbound_rx),
        RelayConnection {
            endpoint: endpoint.to_string(),
            task,
        },
    ))
}

async fn pump(
    endpoint: String,
    mut framed: Framed<TcpStream, RelayCodec>,
    mut outbound: mpsc::UnboundedReceiver<RelayFrame>,
    inbound: mpsc::UnboundedSender<RelayFrame>,
) -> LinxResult<()> {
    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(frame)) => {
                    // Nobody listening any more; keep flushing outbound frames.
                    let _ = inbound.send(frame);
                }
                Some(Err(e)) => {
                    warn!(%endpoint, error = %e, "relay stream error");
                    return Err(e);
                }
                None => {
                    info!(%endpoint, "relay closed the connection");
                    return Ok(());
                }
            },
            frame = outbound.recv() => match frame {
                Some(frame) => framed.send(frame).await?,
                None => {
                    debug!(%endpoint, "relay link dropped, closing");
                    framed.close().await?;
                    return Ok(());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use linx_core::{ParentChain, PublicKey, Scope};
    use linx_relay::{RelayConfig, RelayServer};
    use linx_wire::Announcement;

    async fn relay() -> (SocketAddr, std::sync::Arc<linx_relay::Relay>) {
        let config = RelayConfig::default().with_listen(SocketAddr::from(([127, 0, 0, 1], 0)));
        let server = RelayServer::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let relay = server.relay();
        tokio::spawn(server.run());
        (addr, relay)
    }

    #[tokio::test]
    async fn link_carries_frames_both_ways() {
        let (addr, relay) = relay().await;
        let (mut link, connection) = connect(&addr.to_string()).await.unwrap();
        let scope = Scope::new("swarm1").unwrap();

        link.outbound.send(RelayFrame::Subscribe { scope: scope.clone() }).unwrap();
        while relay.scope_members(&scope).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let announcement = Announcement {
            scope,
            public_key: PublicKey::from_bytes([1; 32]),
            parents: ParentChain::new(),
        };
        link.outbound.send(RelayFrame::Announce(announcement.clone())).unwrap();

        // The announcer is in its own scope and receives the echo.
        let echo = tokio::time::timeout(Duration::from_secs(5), link.inbound.recv())
            .await
            .unwrap();
        assert_eq!(echo, Some(RelayFrame::JoinRequest(announcement)));

        drop(link);
        connection.closed().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_relay_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(matches!(
            connect(&addr.to_string()).await,
            Err(LinxError::TransportError(_))
        ));
    }
}
