//! Relay routing
//!
//! A session is one connected peer transport. Sessions join scope buckets by
//! subscribing and mailbox buckets by announcing or sending offers under a
//! public key. Routing never inspects envelope contents.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use linx_core::{LinxError, LinxResult, PublicKey, Scope, SessionId};
use linx_wire::{Announcement, Envelope, RelayFrame};

use crate::KeyedIndex;

/// Frames queued for one session
pub type SessionSender = mpsc::UnboundedSender<RelayFrame>;

/// Receiving end of a session's queue
pub type SessionReceiver = mpsc::UnboundedReceiver<RelayFrame>;

#[derive(Debug)]
struct Session {
    tx: SessionSender,
    scopes: HashSet<Scope>,
    keys: HashSet<PublicKey>,
}

/// Scope fan-out and mailbox routing
#[derive(Debug, Default)]
pub struct Relay {
    sessions: DashMap<SessionId, Session>,
    scopes: KeyedIndex<Scope>,
    mailboxes: KeyedIndex<PublicKey>,
    next_session: AtomicU64,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. Frames for it arrive on the returned receiver.
    pub fn attach(&self) -> (SessionId, SessionReceiver) {
        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.insert(
            session,
            Session {
                tx,
                scopes: HashSet::new(),
                keys: HashSet::new(),
            },
        );
        debug!(%session, "session attached");
        (session, rx)
    }

    /// Remove a session from every bucket it joined
    pub fn detach(&self, session: SessionId) {
        let Some((_, state)) = self.sessions.remove(&session) else {
            return;
        };
        for scope in &state.scopes {
            self.scopes.remove(scope, session);
        }
        for key in &state.keys {
            self.mailboxes.remove(key, session);
        }
        debug!(
            %session,
            scopes = state.scopes.len(),
            mailboxes = state.keys.len(),
            "session detached"
        );
    }

    pub fn subscribe(&self, session: SessionId, scope: Scope) {
        match self.sessions.get_mut(&session) {
            Some(mut state) => {
                state.scopes.insert(scope.clone());
            }
            None => return,
        }
        self.scopes.insert(&scope, session);
        if !self.sessions.contains_key(&session) {
            // Detached concurrently; undo.
            self.scopes.remove(&scope, session);
            return;
        }
        debug!(%session, %scope, "subscribed");
    }

    pub fn unsubscribe(&self, session: SessionId, scope: &Scope) {
        if let Some(mut state) = self.sessions.get_mut(&session) {
            state.scopes.remove(scope);
        }
        if self.scopes.remove(scope, session) {
            debug!(%session, %scope, "unsubscribed");
        }
    }

    /// Register the announcer's mailbox and fan a join request out to every
    /// session in the scope, the announcer included.
    pub fn announce(&self, session: SessionId, announcement: Announcement) -> usize {
        self.register_mailbox(session, announcement.public_key);

        let scope = announcement.scope.clone();
        let frame = RelayFrame::JoinRequest(announcement);
        let delivered = self.scopes.for_each(&scope, |member| self.deliver(member, frame.clone()));
        trace!(%session, %scope, delivered, "join request fanned out");
        delivered
    }

    /// Deliver an envelope to every session in `to`'s mailbox. The sender's
    /// session is (re)registered under the envelope's sender key so the answer
    /// can find its way back.
    pub fn route(&self, session: SessionId, to: PublicKey, envelope: Envelope) -> LinxResult<usize> {
        self.register_mailbox(session, envelope.sender);

        let frame = RelayFrame::Offer(envelope);
        let delivered = self.mailboxes.for_each(&to, |member| self.deliver(member, frame.clone()));
        if delivered == 0 {
            return Err(LinxError::RoutingMiss(to));
        }
        trace!(%session, to = %to.short(), delivered, "offer routed");
        Ok(delivered)
    }

    /// Apply one frame received from `session`
    pub fn handle_frame(&self, session: SessionId, frame: RelayFrame) {
        match frame {
            RelayFrame::Subscribe { scope } => self.subscribe(session, scope),
            RelayFrame::Unsubscribe { scope } => self.unsubscribe(session, &scope),
            RelayFrame::Announce(announcement) => {
                self.announce(session, announcement);
            }
            RelayFrame::SendOffer { to, envelope } => {
                if let Err(e) = self.route(session, to, envelope) {
                    debug!(%session, error = %e, "offer dropped");
                }
            }
            other => {
                warn!(%session, kind = ?other.kind(), "ignoring relay-to-peer frame from peer");
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sessions subscribed to `scope`
    pub fn scope_members(&self, scope: &Scope) -> Vec<SessionId> {
        self.scopes.members(scope)
    }

    /// Sessions receiving offers for `key`
    pub fn mailbox_members(&self, key: &PublicKey) -> Vec<SessionId> {
        self.mailboxes.members(key)
    }

    fn register_mailbox(&self, session: SessionId, key: PublicKey) {
        let fresh = match self.sessions.get_mut(&session) {
            Some(mut state) => state.keys.insert(key),
            None => return,
        };
        if !fresh {
            return;
        }
        self.mailboxes.insert(&key, session);
        if !self.sessions.contains_key(&session) {
            self.mailboxes.remove(&key, session);
            return;
        }
        trace!(%session, key = %key.short(), "mailbox registered");
    }

    fn deliver(&self, member: SessionId, frame: RelayFrame) {
        if let Some(state) = self.sessions.get(&member) {
            // A closed receiver means the session is being torn down.
            let _ = state.tx.send(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linx_core::ParentChain;
    use linx_wire::ENVELOPE_NONCE_SIZE;
    use std::sync::Arc;

    fn key(n: u8) -> PublicKey {
        PublicKey::from_bytes([n; 32])
    }

    fn scope(name: &str) -> Scope {
        Scope::new(name).unwrap()
    }

    fn announcement(name: &str, n: u8) -> Announcement {
        Announcement {
            scope: scope(name),
            public_key: key(n),
            parents: ParentChain::new(),
        }
    }

    fn envelope(from: u8) -> Envelope {
        Envelope {
            ciphertext: vec![0xAB; 24],
            nonce: [7; ENVELOPE_NONCE_SIZE],
            sender: key(from),
        }
    }

    #[test]
    fn test_announce_fans_out_to_scope_only() {
        let relay = Relay::new();
        let (a, mut a_rx) = relay.attach();
        let (b, mut b_rx) = relay.attach();
        let (c, mut c_rx) = relay.attach();
        relay.subscribe(a, scope("swarm1"));
        relay.subscribe(b, scope("swarm1"));
        relay.subscribe(c, scope("swarm2"));

        assert_eq!(relay.announce(b, announcement("swarm1", 2)), 2);

        assert!(matches!(a_rx.try_recv(), Ok(RelayFrame::JoinRequest(_))));
        // The announcer receives its own echo.
        assert!(matches!(b_rx.try_recv(), Ok(RelayFrame::JoinRequest(_))));
        assert!(c_rx.try_recv().is_err());
    }

    #[test]
    fn test_offer_reaches_only_addressed_mailbox() {
        let relay = Relay::new();
        let (a, mut a_rx) = relay.attach();
        let (b, mut b_rx) = relay.attach();
        let (c, mut c_rx) = relay.attach();
        for session in [a, b, c] {
            relay.subscribe(session, scope("swarm1"));
        }
        relay.announce(b, announcement("swarm1", 2));
        relay.announce(c, announcement("swarm1", 3));
        while a_rx.try_recv().is_ok() {}
        while b_rx.try_recv().is_ok() {}
        while c_rx.try_recv().is_ok() {}

        assert_eq!(relay.route(a, key(2), envelope(1)).unwrap(), 1);

        match b_rx.try_recv() {
            Ok(RelayFrame::Offer(env)) => assert_eq!(env, envelope(1)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(a_rx.try_recv().is_err());
        assert!(c_rx.try_recv().is_err());
    }

    #[test]
    fn test_sender_is_registered_for_answers() {
        let relay = Relay::new();
        let (a, mut a_rx) = relay.attach();
        let (b, _b_rx) = relay.attach();
        relay.subscribe(b, scope("s"));
        relay.announce(b, announcement("s", 2));

        // `a` never announced; sending an offer registers its mailbox.
        relay.route(a, key(2), envelope(1)).unwrap();
        assert_eq!(relay.mailbox_members(&key(1)), vec![a]);

        relay.route(b, key(1), envelope(2)).unwrap();
        assert!(matches!(a_rx.try_recv(), Ok(RelayFrame::Offer(_))));
    }

    #[test]
    fn test_routing_miss() {
        let relay = Relay::new();
        let (a, _rx) = relay.attach();
        assert!(matches!(
            relay.route(a, key(9), envelope(1)),
            Err(LinxError::RoutingMiss(k)) if k == key(9)
        ));
    }

    #[test]
    fn test_detach_cleans_every_bucket() {
        let relay = Relay::new();
        let (a, _rx) = relay.attach();
        relay.subscribe(a, scope("s1"));
        relay.subscribe(a, scope("s2"));
        relay.announce(a, announcement("s1", 1));

        relay.detach(a);
        assert_eq!(relay.session_count(), 0);
        assert!(relay.scope_members(&scope("s1")).is_empty());
        assert!(relay.scope_members(&scope("s2")).is_empty());
        assert!(relay.mailbox_members(&key(1)).is_empty());
    }

    #[test]
    fn test_unsubscribe_stops_fan_out() {
        let relay = Relay::new();
        let (a, mut a_rx) = relay.attach();
        let (b, _b_rx) = relay.attach();
        relay.subscribe(a, scope("s"));
        relay.subscribe(b, scope("s"));
        relay.unsubscribe(a, &scope("s"));

        relay.announce(b, announcement("s", 2));
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn test_peer_cannot_inject_relay_frames() {
        let relay = Relay::new();
        let (a, mut a_rx) = relay.attach();
        relay.subscribe(a, scope("s"));
        relay.handle_frame(a, RelayFrame::JoinRequest(announcement("s", 5)));
        relay.handle_frame(a, RelayFrame::Offer(envelope(5)));
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_subscribe_and_detach() {
        let relay = Arc::new(Relay::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let relay = Arc::clone(&relay);
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    let (session, _rx) = relay.attach();
                    relay.subscribe(session, scope("hot"));
                    relay.announce(session, Announcement {
                        scope: scope("hot"),
                        public_key: PublicKey::from_bytes([(session.0 % 251) as u8; 32]),
                        parents: ParentChain::new(),
                    });
                    relay.detach(session);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(relay.session_count(), 0);
        assert!(relay.scope_members(&scope("hot")).is_empty());
    }
}
