//! Topology controller
//!
//! Per candidate link:
//!
//! ```text
//! ANNOUNCED -> admission -> REJECTED
//!                        -> PENDING -> connected -> ESTABLISHED -> closed
//!                                   -> failed / timeout
//! ```
//!
//! `TopologyController` holds the state and handles one event at a time.
//! `TopologyController::spawn` runs it on its own task and returns a
//! `ControllerHandle` for operator commands.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use linx_core::{LinxError, LinxResult, ParentChain, PublicKey, Scope};
use linx_signal::{SignalEvent, SignalPayload, SignalingClient};

use crate::{
    admit_join, admit_offer, check_cycle, Admission, Link, LinkEvent, LinkEventKind, LinkEvents,
    LinkId, PeerConnection, PeerConnector, Pool, RejectReason, Role, SlotPools, TopologyConfig,
};

/// Operator command queue depth
const COMMAND_BUFFER: usize = 32;

type Connection = Box<dyn PeerConnection>;

/// Point-in-time view of a controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopologySnapshot {
    pub public_key: PublicKey,
    pub scope: Option<Scope>,
    pub parents: ParentChain,
    pub incoming: Vec<PublicKey>,
    pub outgoing: Vec<PublicKey>,
    pub pending: Vec<PublicKey>,
}

/// Owns one peer's links and applies the admission policy
pub struct TopologyController {
    config: TopologyConfig,
    signaling: SignalingClient,
    connector: Arc<dyn PeerConnector>,
    me: PublicKey,
    parents: ParentChain,
    pools: SlotPools<Connection>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    next_link: u64,
}

impl TopologyController {
    /// Create a controller. Returns it with the receiver its connections
    /// report on.
    pub fn new(
        config: TopologyConfig,
        signaling: SignalingClient,
        connector: Arc<dyn PeerConnector>,
    ) -> LinxResult<(Self, mpsc::UnboundedReceiver<LinkEvent>)> {
        config.validate()?;

        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let controller = TopologyController {
            me: signaling.public_key(),
            pools: SlotPools::new(config.max_incoming, config.max_outgoing),
            parents: ParentChain::new(),
            config,
            signaling,
            connector,
            link_tx,
            next_link: 0,
        };
        Ok((controller, link_rx))
    }

    /// Start from a known ancestry instead of an empty chain
    pub fn with_parents(mut self, parents: ParentChain) -> Self {
        self.parents = parents;
        self
    }

    /// Subscribe to `scope`, announce, and run the controller on a new task.
    /// `signals` is the event stream returned by `SignalingClient::new`.
    pub fn spawn(
        config: TopologyConfig,
        signaling: SignalingClient,
        signals: mpsc::Receiver<SignalEvent>,
        connector: Arc<dyn PeerConnector>,
        scope: impl Into<String>,
    ) -> LinxResult<ControllerHandle> {
        let (controller, links) = TopologyController::new(config, signaling, connector)?;
        controller.start(scope, signals, links)
    }

    /// Run an already-built controller on a new task
    pub fn start(
        self,
        scope: impl Into<String>,
        signals: mpsc::Receiver<SignalEvent>,
        links: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> LinxResult<ControllerHandle> {
        let scope = self.signaling.subscribe(scope)?;
        self.announce()?;
        info!(peer = %self.me.short(), %scope, "topology controller started");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(signals, links, command_rx));
        Ok(ControllerHandle {
            commands: command_tx,
            task,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.me
    }

    pub fn parents(&self) -> &ParentChain {
        &self.parents
    }

    pub fn pools(&self) -> &SlotPools<Connection> {
        &self.pools
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Emit a join announcement with the current parent chain
    pub fn announce(&self) -> LinxResult<()> {
        self.signaling.announce(&self.parents)
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            public_key: self.me,
            scope: self.signaling.scope(),
            parents: self.parents.clone(),
            incoming: self.pools.keys(Pool::Incoming),
            outgoing: self.pools.keys(Pool::Outgoing),
            pending: self.pools.keys(Pool::Pending),
        }
    }

    /// Handle one signaling event
    pub fn handle_signal(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::JoinRequest {
                scope,
                public_key,
                parents,
            } => self.handle_join(&scope, public_key, parents),
            SignalEvent::Offer { payload, from } => self.handle_offer(payload, from),
        }
    }

    fn handle_join(&mut self, scope: &Scope, announcer: PublicKey, parents: ParentChain) {
        let verdict = admit_join(&self.me, &self.parents, &self.pools, &announcer, &parents);
        if let Admission::Reject(reason) = verdict {
            debug!(
                peer = %self.me.short(),
                remote = %announcer.short(),
                %scope,
                %reason,
                "join request rejected"
            );
            return;
        }

        debug!(peer = %self.me.short(), remote = %announcer.short(), %scope, "join request admitted");
        self.open(Role::Initiator, announcer, parents, None);
    }

    fn handle_offer(&mut self, payload: SignalPayload, from: PublicKey) {
        if let Some(link) = self.pools.pending_mut(&from) {
            if link.role == Role::Initiator && payload.role == Role::Initiator {
                self.resolve_glare(payload, from);
                return;
            }
            if payload.parents.contains(&self.me) {
                let id = link.id;
                self.drop_link(&from, id, RejectReason::Downstream);
                return;
            }
            trace!(peer = %self.me.short(), remote = %from.short(), "signal for pending link");
            link.parents = payload.parents;
            link.connection.signal(payload.signal);
            return;
        }

        if let Some(link) = self.pools.established_mut(&from) {
            trace!(peer = %self.me.short(), remote = %from.short(), "signal for established link");
            link.connection.signal(payload.signal);
            return;
        }

        if payload.role == Role::Responder {
            debug!(peer = %self.me.short(), remote = %from.short(), "answer without pending attempt");
            return;
        }

        self.accept_offer(payload, from);
    }

    /// Both sides admitted each other and opened initiators. The lower key
    /// keeps its initiator; the higher key answers instead.
    fn resolve_glare(&mut self, payload: SignalPayload, from: PublicKey) {
        if self.me < from {
            debug!(peer = %self.me.short(), remote = %from.short(), "offer collision, keeping initiator");
            return;
        }

        debug!(peer = %self.me.short(), remote = %from.short(), "offer collision, yielding to remote");
        if let Some(mut link) = self.pools.take_pending(&from) {
            link.connection.close();
        }
        self.accept_offer(payload, from);
    }

    fn accept_offer(&mut self, payload: SignalPayload, from: PublicKey) {
        let verdict = admit_offer(&self.me, &self.parents, &self.pools, &from, &payload.parents);
        if let Admission::Reject(reason) = verdict {
            debug!(peer = %self.me.short(), remote = %from.short(), %reason, "offer rejected");
            return;
        }

        debug!(peer = %self.me.short(), remote = %from.short(), "offer admitted");
        self.open(Role::Responder, from, payload.parents, Some(payload.signal));
    }

    /// Create a connection and track it as pending
    fn open(
        &mut self,
        role: Role,
        remote: PublicKey,
        parents: ParentChain,
        signal: Option<serde_json::Value>,
    ) {
        if let Err(e) = self.pools.check_pending(&remote, role) {
            debug!(peer = %self.me.short(), remote = %remote.short(), error = %e, "not opening link");
            return;
        }

        self.next_link += 1;
        let id = LinkId(self.next_link);
        let events = LinkEvents::new(id, remote, self.link_tx.clone());

        let connection = match self.connector.connect(role, remote, events) {
            Ok(connection) => connection,
            Err(e) => {
                warn!(peer = %self.me.short(), remote = %remote.short(), error = %e, "peer connection setup failed");
                return;
            }
        };

        let mut link = Link::new(id, role, connection, parents);
        if let Some(signal) = signal {
            link.connection.signal(signal);
        }
        if let Err(e) = self.pools.insert_pending(remote, link) {
            warn!(peer = %self.me.short(), remote = %remote.short(), error = %e, "pending insert failed");
        }
    }

    /// Handle one connection event. Events for links that were replaced or
    /// already removed are dropped.
    pub fn handle_link(&mut self, event: LinkEvent) {
        let LinkEvent { link, remote, kind } = event;

        let role = match self.pools.get(&remote) {
            Some((_, tracked)) if tracked.id == link => tracked.role,
            _ => {
                trace!(peer = %self.me.short(), remote = %remote.short(), ?link, "stale link event");
                return;
            }
        };

        match kind {
            LinkEventKind::LocalSignal(signal) => {
                let payload = SignalPayload::new(role, signal, self.parents.clone());
                if let Err(e) = self.signaling.send_offer(&payload, &remote) {
                    warn!(peer = %self.me.short(), remote = %remote.short(), error = %e, "offer not sent");
                }
            }
            LinkEventKind::Connected => self.on_connected(remote, link),
            LinkEventKind::Failed(reason) => {
                let error = LinxError::TransportFailure(reason);
                if let Some((pool, mut tracked)) = self.pools.remove(&remote, link) {
                    tracked.connection.close();
                    warn!(
                        peer = %self.me.short(),
                        remote = %remote.short(),
                        pool = pool.name(),
                        %error,
                        "link failed"
                    );
                }
            }
            LinkEventKind::Closed => {
                if let Some((pool, mut tracked)) = self.pools.remove(&remote, link) {
                    tracked.connection.close();
                    info!(peer = %self.me.short(), remote = %remote.short(), pool = pool.name(), "link closed");
                }
            }
        }
    }

    fn on_connected(&mut self, remote: PublicKey, link: LinkId) {
        // Our chain may have been adopted while this attempt was pending
        let cycle = match self.pools.get(&remote) {
            Some((Pool::Pending, tracked)) if tracked.id == link => {
                check_cycle(&self.me, &self.parents, &remote, &tracked.parents)
            }
            _ => None,
        };
        if let Some(reason) = cycle {
            self.drop_link(&remote, link, reason);
            return;
        }

        let Some(pool) = self.pools.promote(&remote, link) else {
            trace!(peer = %self.me.short(), remote = %remote.short(), "connected event for established link");
            return;
        };

        info!(
            peer = %self.me.short(),
            remote = %remote.short(),
            pool = pool.name(),
            incoming = self.pools.incoming_len(),
            outgoing = self.pools.outgoing_len(),
            "link established"
        );

        if pool == Pool::Incoming && self.parents.is_empty() {
            if let Some((_, tracked)) = self.pools.get(&remote) {
                self.parents = tracked.parents.extended(remote);
                info!(peer = %self.me.short(), via = %remote.short(), depth = self.parents.len(), "joined swarm");
                self.drop_ancestor_links();
            }
        }
    }

    /// Close outgoing and pending links to keys that are now our ancestors
    fn drop_ancestor_links(&mut self) {
        let mut doomed = self.pools.keys(Pool::Outgoing);
        doomed.extend(self.pools.keys(Pool::Pending));
        doomed.retain(|key| self.parents.contains(key));

        for remote in doomed {
            if let Some((_, tracked)) = self.pools.get(&remote) {
                let id = tracked.id;
                self.drop_link(&remote, id, RejectReason::Ancestor);
            }
        }
    }

    /// Remove a link that broke the cycle rules and close its connection
    fn drop_link(&mut self, remote: &PublicKey, id: LinkId, reason: RejectReason) {
        if let Some((pool, mut tracked)) = self.pools.remove(remote, id) {
            tracked.connection.close();
            info!(
                peer = %self.me.short(),
                remote = %remote.short(),
                pool = pool.name(),
                %reason,
                "link dropped"
            );
        }
    }

    /// Drop pending attempts older than the configured timeout.
    /// Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let expired = self.pools.expired(now, self.config.pending_timeout);
        let mut removed = 0;
        for (remote, link) in expired {
            if let Some((_, mut tracked)) = self.pools.remove(&remote, link) {
                tracked.connection.close();
                removed += 1;
                let error = LinxError::PendingTimeout(remote);
                warn!(peer = %self.me.short(), remote = %remote.short(), %error, "pending link expired");
            }
        }
        removed
    }

    /// Re-announce while incoming slots are free
    pub fn reannounce(&self) {
        if self.pools.incoming_len() >= self.config.max_incoming {
            return;
        }
        if let Err(e) = self.announce() {
            warn!(peer = %self.me.short(), error = %e, "re-announce failed");
        }
    }

    /// Close every link and leave the scope
    pub fn shutdown(&mut self) {
        let links = self.pools.drain();
        let count = links.len();
        for (_, mut link) in links {
            link.connection.close();
        }
        if let Err(e) = self.signaling.unsubscribe() {
            debug!(peer = %self.me.short(), error = %e, "unsubscribe on shutdown failed");
        }
        self.signaling.close();
        info!(peer = %self.me.short(), closed = count, "topology controller stopped");
    }

    async fn run(
        mut self,
        mut signals: mpsc::Receiver<SignalEvent>,
        mut links: mpsc::UnboundedReceiver<LinkEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut sweep_timer = tokio::time::interval(self.config.sweep_interval);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut reannounce = self.config.reannounce_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                Some(event) = signals.recv() => self.handle_signal(event),
                Some(event) = links.recv() => self.handle_link(event),
                now = sweep_timer.tick() => {
                    self.sweep(now);
                }
                _ = next_tick(&mut reannounce) => self.reannounce(),
                command = commands.recv() => match command {
                    Some(Command::Announce(reply)) => {
                        let _ = reply.send(self.announce());
                    }
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::Stop(ack)) => {
                        self.shutdown();
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.shutdown();
                        return;
                    }
                },
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

enum Command {
    Announce(oneshot::Sender<LinxResult<()>>),
    Snapshot(oneshot::Sender<TopologySnapshot>),
    Stop(oneshot::Sender<()>),
}

/// Handle to a running controller. Dropping it stops the controller.
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Re-announce with the current parent chain
    pub async fn announce(&self) -> LinxResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Announce(tx)).await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn snapshot(&self) -> LinxResult<TopologySnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| stopped())
    }

    /// Close all links, unsubscribe, and wait for the task to end
    pub async fn stop(self) -> LinxResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stop(tx)).await?;
        rx.await.map_err(|_| stopped())?;
        self.task
            .await
            .map_err(|e| LinxError::TransportError(format!("controller task: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    async fn send(&self, command: Command) -> LinxResult<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> LinxError {
    LinxError::TransportError("topology controller stopped".into())
}
