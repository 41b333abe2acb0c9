//! TCP relay server
//!
//! One task per connection. Each connection is a relay session: inbound
//! frames are applied to the shared `Relay`, and frames the relay queues for
//! the session are written back on the same socket.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use linx_core::LinxResult;
use linx_wire::RelayCodec;

use crate::{Relay, RelayConfig};

/// Accepts peer connections and serves them from one `Relay`
pub struct RelayServer {
    relay: Arc<Relay>,
    listener: TcpListener,
}

impl RelayServer {
    pub async fn bind(config: &RelayConfig) -> LinxResult<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        info!(addr = %listener.local_addr()?, "relay listening");
        Ok(RelayServer {
            relay: Arc::new(Relay::new()),
            listener,
        })
    }

    pub fn local_addr(&self) -> LinxResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> LinxResult<()> {
        self.serve(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> LinxResult<()> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (socket, addr) = accepted?;
                    let relay = Arc::clone(&self.relay);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, addr, relay).await {
                            warn!(%addr, error = %e, "connection error");
                        }
                        debug!(%addr, "disconnected");
                    });
                }
                _ = &mut shutdown => {
                    info!(sessions = self.relay.session_count(), "relay shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(socket: TcpStream, addr: SocketAddr, relay: Arc<Relay>) -> LinxResult<()> {
    socket.set_nodelay(true)?;
    let (session, mut outbound) = relay.attach();
    debug!(%addr, %session, "new connection");

    let mut framed = Framed::new(socket, RelayCodec);
    let result = loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(frame)) => relay.handle_frame(session, frame),
                // Framing is lost after a decode error; drop the connection.
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            },
            Some(frame) = outbound.recv() => {
                if let Err(e) = framed.send(frame).await {
                    break Err(e);
                }
            }
        }
    };

    relay.detach(session);
    result
}
