//! Signaling client - one peer's view of the relay
//!
//! Outbound operations (`subscribe`, `announce`, `send_offer`) queue frames on
//! the relay link and return immediately. Inbound frames are handled by a
//! background task that decrypts offers and forwards both join requests and
//! offers, in arrival order, on a single event channel.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use linx_core::{LinxError, LinxResult, ParentChain, PublicKey, Scope};
use linx_crypto::{open, seal, Identity};
use linx_wire::{Announcement, Envelope, RelayFrame};

use crate::{FrameReceiver, FrameSender, RelayLink, SignalPayload};

/// Inbound signaling events, in the order the relay delivered them
#[derive(Clone, Debug, PartialEq)]
pub enum SignalEvent {
    /// A peer in our scope is soliciting connections
    JoinRequest {
        scope: Scope,
        public_key: PublicKey,
        parents: ParentChain,
    },
    /// A decrypted offer addressed to us
    Offer {
        payload: SignalPayload,
        from: PublicKey,
    },
}

/// Signaling client bound to a single relay link
pub struct SignalingClient {
    identity: Arc<Identity>,
    outbound: FrameSender,
    scope: Arc<RwLock<Option<Scope>>>,
    inbound_task: JoinHandle<()>,
}

impl SignalingClient {
    /// Start the client. Returns the client and its inbound event stream.
    pub fn new(
        identity: Arc<Identity>,
        link: RelayLink,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<SignalEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_buffer.max(1));
        let scope = Arc::new(RwLock::new(None));

        let inbound_task = tokio::spawn(receive_loop(
            Arc::clone(&identity),
            link.inbound,
            Arc::clone(&scope),
            event_tx,
        ));

        let client = SignalingClient {
            identity,
            outbound: link.outbound,
            scope,
            inbound_task,
        };
        (client, event_rx)
    }

    /// Local public key
    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// Currently subscribed scope
    pub fn scope(&self) -> Option<Scope> {
        self.scope.read().clone()
    }

    /// Join a scope. A peer is in one scope at a time, so a previous
    /// subscription is left first.
    pub fn subscribe(&self, scope: impl Into<String>) -> LinxResult<Scope> {
        let scope = Scope::new(scope)?;

        // Stored before the frame goes out; the inbound filter reads it.
        let previous = self.scope.write().replace(scope.clone());
        if let Err(e) = self.switch_scope(previous.as_ref(), &scope) {
            *self.scope.write() = previous;
            return Err(e);
        }
        Ok(scope)
    }

    fn switch_scope(&self, previous: Option<&Scope>, scope: &Scope) -> LinxResult<()> {
        if let Some(previous) = previous.filter(|p| *p != scope) {
            self.emit(RelayFrame::Unsubscribe {
                scope: previous.clone(),
            })?;
        }

        debug!(peer = %self.public_key().short(), %scope, "subscribing");
        self.emit(RelayFrame::Subscribe {
            scope: scope.clone(),
        })
    }

    /// Leave the current scope (no-op if not subscribed)
    pub fn unsubscribe(&self) -> LinxResult<()> {
        let previous = self.scope.write().take();
        match previous {
            Some(scope) => {
                debug!(peer = %self.public_key().short(), %scope, "unsubscribing");
                self.emit(RelayFrame::Unsubscribe { scope })
            }
            None => Ok(()),
        }
    }

    /// Broadcast a join announcement for the current scope
    pub fn announce(&self, parents: &ParentChain) -> LinxResult<()> {
        let scope = self
            .scope()
            .ok_or_else(|| LinxError::Config("announce before subscribe".into()))?;

        debug!(
            peer = %self.public_key().short(),
            %scope,
            parents = parents.len(),
            "announcing"
        );
        self.emit(RelayFrame::Announce(Announcement {
            scope,
            public_key: self.public_key(),
            parents: parents.clone(),
        }))
    }

    /// Encrypt `payload` to `to` and hand it to the relay. Fire-and-forget:
    /// delivery is never confirmed.
    pub fn send_offer(&self, payload: &SignalPayload, to: &PublicKey) -> LinxResult<()> {
        let plaintext = payload.to_bytes()?;
        let envelope = seal(&self.identity, to, &plaintext)?;

        trace!(
            peer = %self.public_key().short(),
            to = %to.short(),
            len = envelope.ciphertext.len(),
            "sending offer"
        );
        self.emit(RelayFrame::SendOffer { to: *to, envelope })
    }

    /// Stop the inbound task. Queued outbound frames are still flushed by
    /// the transport.
    pub fn close(&self) {
        self.inbound_task.abort();
    }

    fn emit(&self, frame: RelayFrame) -> LinxResult<()> {
        self.outbound
            .send(frame)
            .map_err(|_| LinxError::TransportError("relay link closed".into()))
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.inbound_task.abort();
    }
}

async fn receive_loop(
    identity: Arc<Identity>,
    mut inbound: FrameReceiver,
    scope: Arc<RwLock<Option<Scope>>>,
    events: mpsc::Sender<SignalEvent>,
) {
    let me = identity.public_key();

    while let Some(frame) = inbound.recv().await {
        let event = match frame {
            RelayFrame::JoinRequest(announcement) => {
                let subscribed = scope.read().as_ref() == Some(&announcement.scope);
                if !subscribed {
                    trace!(peer = %me.short(), scope = %announcement.scope, "join request for stale scope");
                    continue;
                }
                SignalEvent::JoinRequest {
                    scope: announcement.scope,
                    public_key: announcement.public_key,
                    parents: announcement.parents,
                }
            }
            RelayFrame::Offer(envelope) => match decrypt_offer(&identity, &envelope) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    // Malformed signaling traffic is dropped, never fatal.
                    warn!(peer = %me.short(), from = %envelope.sender.short(), error = %e, "dropping offer");
                    continue;
                }
            },
            other => {
                debug!(peer = %me.short(), kind = ?other.kind(), "ignoring unexpected frame from relay");
                continue;
            }
        };

        if events.send(event).await.is_err() {
            debug!(peer = %me.short(), "event receiver dropped");
            return;
        }
    }

    debug!(peer = %me.short(), "relay link closed");
}

fn decrypt_offer(identity: &Identity, envelope: &Envelope) -> LinxResult<Option<SignalEvent>> {
    if envelope.sender == identity.public_key() {
        return Ok(None);
    }
    let plaintext = open(identity, envelope)?;
    let payload = SignalPayload::from_bytes(&plaintext)?;
    Ok(Some(SignalEvent::Offer {
        payload,
        from: envelope.sender,
    }))
}
