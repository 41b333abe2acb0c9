//! Slot pools - incoming, outgoing, and pending links
//!
//! Pending initiators are charged against the outgoing budget and pending
//! responders against the incoming budget, so promotion on "connected" can
//! never overflow a pool.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use linx_core::{LinxError, LinxResult, ParentChain, PublicKey};

use crate::{LinkId, Role};

/// Which pool a link lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    Incoming,
    Outgoing,
    Pending,
}

impl Pool {
    pub fn name(self) -> &'static str {
        match self {
            Pool::Incoming => "incoming",
            Pool::Outgoing => "outgoing",
            Pool::Pending => "pending",
        }
    }

    /// Pool an established link of `role` lands in
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Initiator => Pool::Outgoing,
            Role::Responder => Pool::Incoming,
        }
    }
}

/// A tracked link: the connection plus what we know about the remote
#[derive(Debug)]
pub struct Link<C> {
    pub id: LinkId,
    pub role: Role,
    pub connection: C,
    /// Remote's parent chain as last advertised
    pub parents: ParentChain,
    /// Admission time for pending links, establishment time otherwise
    pub since: Instant,
}

impl<C> Link<C> {
    pub fn new(id: LinkId, role: Role, connection: C, parents: ParentChain) -> Self {
        Link {
            id,
            role,
            connection,
            parents,
            since: Instant::now(),
        }
    }
}

/// Bounded link pools for one peer
#[derive(Debug)]
pub struct SlotPools<C> {
    max_incoming: usize,
    max_outgoing: usize,
    incoming: HashMap<PublicKey, Link<C>>,
    outgoing: HashMap<PublicKey, Link<C>>,
    pending: HashMap<PublicKey, Link<C>>,
    pending_initiators: usize,
    pending_responders: usize,
}

impl<C> SlotPools<C> {
    pub fn new(max_incoming: usize, max_outgoing: usize) -> Self {
        SlotPools {
            max_incoming,
            max_outgoing,
            incoming: HashMap::new(),
            outgoing: HashMap::new(),
            pending: HashMap::new(),
            pending_initiators: 0,
            pending_responders: 0,
        }
    }

    pub fn max_incoming(&self) -> usize {
        self.max_incoming
    }

    pub fn max_outgoing(&self) -> usize {
        self.max_outgoing
    }

    pub fn incoming_len(&self) -> usize {
        self.incoming.len()
    }

    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Outgoing slots in use, counting attempts still in flight
    pub fn outgoing_committed(&self) -> usize {
        self.outgoing.len() + self.pending_initiators
    }

    /// Incoming slots in use, counting attempts still in flight
    pub fn incoming_committed(&self) -> usize {
        self.incoming.len() + self.pending_responders
    }

    pub fn has_room(&self, role: Role) -> bool {
        match role {
            Role::Initiator => self.outgoing_committed() < self.max_outgoing,
            Role::Responder => self.incoming_committed() < self.max_incoming,
        }
    }

    /// Pool holding `key`, if any
    pub fn pool_of(&self, key: &PublicKey) -> Option<Pool> {
        if self.pending.contains_key(key) {
            Some(Pool::Pending)
        } else if self.outgoing.contains_key(key) {
            Some(Pool::Outgoing)
        } else if self.incoming.contains_key(key) {
            Some(Pool::Incoming)
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.pool_of(key).is_some()
    }

    /// Whether a new `role` attempt to `remote` may be tracked: at most one
    /// attempt per remote, and only while the role's budget has room.
    pub fn check_pending(&self, remote: &PublicKey, role: Role) -> LinxResult<()> {
        if self.contains(remote) {
            return Err(LinxError::Capacity {
                pool: Pool::Pending.name(),
                limit: 1,
            });
        }
        if !self.has_room(role) {
            let pool = Pool::for_role(role);
            return Err(LinxError::Capacity {
                pool: pool.name(),
                limit: self.limit(pool),
            });
        }
        Ok(())
    }

    /// Track a new attempt, subject to `check_pending`
    pub fn insert_pending(&mut self, remote: PublicKey, link: Link<C>) -> LinxResult<()> {
        self.check_pending(&remote, link.role)?;

        match link.role {
            Role::Initiator => self.pending_initiators += 1,
            Role::Responder => self.pending_responders += 1,
        }
        self.pending.insert(remote, link);
        Ok(())
    }

    pub fn pending(&self, remote: &PublicKey) -> Option<&Link<C>> {
        self.pending.get(remote)
    }

    pub fn pending_mut(&mut self, remote: &PublicKey) -> Option<&mut Link<C>> {
        self.pending.get_mut(remote)
    }

    pub fn take_pending(&mut self, remote: &PublicKey) -> Option<Link<C>> {
        let link = self.pending.remove(remote)?;
        match link.role {
            Role::Initiator => self.pending_initiators -= 1,
            Role::Responder => self.pending_responders -= 1,
        }
        Some(link)
    }

    /// Move a pending link into its slot pool. Returns the pool, or `None`
    /// when no pending attempt `id` exists for `remote`.
    pub fn promote(&mut self, remote: &PublicKey, id: LinkId) -> Option<Pool> {
        if self.pending.get(remote).map(|l| l.id) != Some(id) {
            return None;
        }
        let mut link = self.take_pending(remote)?;
        link.since = Instant::now();

        let pool = Pool::for_role(link.role);
        self.pool_mut(pool).insert(*remote, link);
        Some(pool)
    }

    /// Link to `remote` in any pool
    pub fn get(&self, remote: &PublicKey) -> Option<(Pool, &Link<C>)> {
        let pool = self.pool_of(remote)?;
        let link = match pool {
            Pool::Pending => self.pending.get(remote),
            Pool::Outgoing => self.outgoing.get(remote),
            Pool::Incoming => self.incoming.get(remote),
        }?;
        Some((pool, link))
    }

    /// Established link to `remote`, in whichever slot pool holds it
    pub fn established_mut(&mut self, remote: &PublicKey) -> Option<&mut Link<C>> {
        if self.outgoing.contains_key(remote) {
            self.outgoing.get_mut(remote)
        } else {
            self.incoming.get_mut(remote)
        }
    }

    /// Remove link `id` to `remote` from any pool. Stale ids are ignored.
    pub fn remove(&mut self, remote: &PublicKey, id: LinkId) -> Option<(Pool, Link<C>)> {
        let (pool, current) = self.get(remote)?;
        if current.id != id {
            return None;
        }

        let link = match pool {
            Pool::Pending => self.take_pending(remote),
            other => self.pool_mut(other).remove(remote),
        }?;
        Some((pool, link))
    }

    /// Pending attempts admitted more than `timeout` before `now`
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<(PublicKey, LinkId)> {
        self.pending
            .iter()
            .filter(|(_, link)| now.saturating_duration_since(link.since) >= timeout)
            .map(|(key, link)| (*key, link.id))
            .collect()
    }

    pub fn keys(&self, pool: Pool) -> Vec<PublicKey> {
        let mut keys: Vec<PublicKey> = match pool {
            Pool::Incoming => self.incoming.keys().copied().collect(),
            Pool::Outgoing => self.outgoing.keys().copied().collect(),
            Pool::Pending => self.pending.keys().copied().collect(),
        };
        keys.sort();
        keys
    }

    /// Empty every pool, yielding the links
    pub fn drain(&mut self) -> Vec<(PublicKey, Link<C>)> {
        self.pending_initiators = 0;
        self.pending_responders = 0;
        self.pending
            .drain()
            .chain(self.outgoing.drain())
            .chain(self.incoming.drain())
            .collect()
    }

    fn limit(&self, pool: Pool) -> usize {
        match pool {
            Pool::Incoming => self.max_incoming,
            Pool::Outgoing => self.max_outgoing,
            Pool::Pending => 1,
        }
    }

    fn pool_mut(&mut self, pool: Pool) -> &mut HashMap<PublicKey, Link<C>> {
        match pool {
            Pool::Incoming => &mut self.incoming,
            Pool::Outgoing => &mut self.outgoing,
            Pool::Pending => &mut self.pending,
        }
    }
}
