//! Admission policy
//!
//! Pure functions over the local key, the local parent chain, and the slot
//! pools. The controller acts on the verdict; nothing here mutates state.

use std::fmt;

use linx_core::{ParentChain, PublicKey};

use crate::{Role, SlotPools};

/// Why a candidate was turned away
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Our own announcement echoed back by the relay
    OwnAnnouncement,
    /// The candidate lists us as an ancestor
    Downstream,
    /// The candidate is one of our ancestors
    Ancestor,
    /// Already pending or linked
    AlreadyLinked,
    /// No slot left in the pool for this role
    Capacity { pool: &'static str, limit: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::OwnAnnouncement => write!(f, "own announcement"),
            RejectReason::Downstream => write!(f, "candidate descends from us"),
            RejectReason::Ancestor => write!(f, "candidate is an ancestor"),
            RejectReason::AlreadyLinked => write!(f, "already linked"),
            RejectReason::Capacity { pool, limit } => write!(f, "{} pool full ({})", pool, limit),
        }
    }
}

/// Admission verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject(RejectReason),
}

impl Admission {
    pub fn is_accept(&self) -> bool {
        matches!(self, Admission::Accept)
    }
}

/// Decide whether to open an outgoing link to a peer that announced itself.
///
/// The cycle check runs before the capacity check, so a descendant is
/// rejected as such even when the outgoing pool is full.
pub fn admit_join<C>(
    me: &PublicKey,
    own_parents: &ParentChain,
    pools: &SlotPools<C>,
    announcer: &PublicKey,
    announcer_parents: &ParentChain,
) -> Admission {
    if announcer == me {
        return Admission::Reject(RejectReason::OwnAnnouncement);
    }
    if announcer_parents.contains(me) {
        return Admission::Reject(RejectReason::Downstream);
    }
    if !pools.has_room(Role::Initiator) {
        return Admission::Reject(RejectReason::Capacity {
            pool: "outgoing",
            limit: pools.max_outgoing(),
        });
    }
    if own_parents.contains(announcer) {
        return Admission::Reject(RejectReason::Ancestor);
    }
    if pools.contains(announcer) {
        return Admission::Reject(RejectReason::AlreadyLinked);
    }
    Admission::Accept
}

/// The two cycle rules on their own. Used again when a link completes,
/// since either chain may have changed after admission.
pub fn check_cycle(
    me: &PublicKey,
    own_parents: &ParentChain,
    remote: &PublicKey,
    remote_parents: &ParentChain,
) -> Option<RejectReason> {
    if remote_parents.contains(me) {
        return Some(RejectReason::Downstream);
    }
    if own_parents.contains(remote) {
        return Some(RejectReason::Ancestor);
    }
    None
}

/// Decide whether to answer an offer that matches no pending attempt.
pub fn admit_offer<C>(
    me: &PublicKey,
    own_parents: &ParentChain,
    pools: &SlotPools<C>,
    sender: &PublicKey,
    sender_parents: &ParentChain,
) -> Admission {
    if sender == me {
        return Admission::Reject(RejectReason::OwnAnnouncement);
    }
    if let Some(reason) = check_cycle(me, own_parents, sender, sender_parents) {
        return Admission::Reject(reason);
    }
    if pools.contains(sender) {
        return Admission::Reject(RejectReason::AlreadyLinked);
    }
    if !pools.has_room(Role::Responder) {
        return Admission::Reject(RejectReason::Capacity {
            pool: "incoming",
            limit: pools.max_incoming(),
        });
    }
    Admission::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Link, LinkId};

    fn key(n: u8) -> PublicKey {
        PublicKey::from_bytes([n; 32])
    }

    fn full_outgoing() -> SlotPools<()> {
        let mut pools = SlotPools::new(3, 6);
        for n in 10..16 {
            pools
                .insert_pending(key(n), Link::new(LinkId(n as u64), Role::Initiator, (), ParentChain::new()))
                .unwrap();
            pools.promote(&key(n), LinkId(n as u64));
        }
        pools
    }

    #[test]
    fn test_own_echo_rejected() {
        let pools = SlotPools::<()>::new(3, 6);
        let verdict = admit_join(&key(1), &ParentChain::new(), &pools, &key(1), &ParentChain::new());
        assert_eq!(verdict, Admission::Reject(RejectReason::OwnAnnouncement));
    }

    #[test]
    fn test_fresh_announcer_accepted() {
        let pools = SlotPools::<()>::new(3, 6);
        let verdict = admit_join(&key(1), &ParentChain::new(), &pools, &key(2), &ParentChain::new());
        assert!(verdict.is_accept());
    }

    #[test]
    fn test_full_outgoing_rejects_without_error() {
        let pools = full_outgoing();
        assert_eq!(pools.outgoing_len(), 6);
        let verdict = admit_join(&key(1), &ParentChain::new(), &pools, &key(2), &ParentChain::new());
        assert_eq!(
            verdict,
            Admission::Reject(RejectReason::Capacity { pool: "outgoing", limit: 6 })
        );
    }

    #[test]
    fn test_descendant_rejected_regardless_of_capacity() {
        let chain = ParentChain::from_keys([key(9), key(1)]);
        let empty = SlotPools::<()>::new(3, 6);
        let full = full_outgoing();

        for pools in [&empty, &full] {
            let verdict = admit_join(&key(1), &ParentChain::new(), pools, &key(2), &chain);
            assert_eq!(verdict, Admission::Reject(RejectReason::Downstream));
        }
    }

    #[test]
    fn test_ancestor_rejected() {
        let own = ParentChain::from_keys([key(2)]);
        let pools = SlotPools::<()>::new(3, 6);
        let verdict = admit_join(&key(1), &own, &pools, &key(2), &ParentChain::new());
        assert_eq!(verdict, Admission::Reject(RejectReason::Ancestor));
    }

    #[test]
    fn test_already_pending_rejected() {
        let mut pools = SlotPools::new(3, 6);
        pools
            .insert_pending(key(2), Link::new(LinkId(1), Role::Initiator, (), ParentChain::new()))
            .unwrap();
        let verdict = admit_join(&key(1), &ParentChain::new(), &pools, &key(2), &ParentChain::new());
        assert_eq!(verdict, Admission::Reject(RejectReason::AlreadyLinked));
    }

    #[test]
    fn test_offer_respects_incoming_budget() {
        let mut pools = SlotPools::new(1, 2);
        pools
            .insert_pending(key(5), Link::new(LinkId(1), Role::Responder, (), ParentChain::new()))
            .unwrap();
        let verdict = admit_offer(&key(1), &ParentChain::new(), &pools, &key(2), &ParentChain::new());
        assert_eq!(
            verdict,
            Admission::Reject(RejectReason::Capacity { pool: "incoming", limit: 1 })
        );
    }

    #[test]
    fn test_offer_from_descendant_rejected() {
        let pools = SlotPools::<()>::new(3, 6);
        let chain = ParentChain::from_keys([key(1)]);
        let verdict = admit_offer(&key(1), &ParentChain::new(), &pools, &key(2), &chain);
        assert_eq!(verdict, Admission::Reject(RejectReason::Downstream));
    }

    #[test]
    fn test_cycle_check_both_directions() {
        let me = key(1);
        let none = ParentChain::new();
        assert_eq!(check_cycle(&me, &none, &key(2), &none), None);
        assert_eq!(
            check_cycle(&me, &none, &key(2), &ParentChain::from_keys([key(3), me])),
            Some(RejectReason::Downstream)
        );
        assert_eq!(
            check_cycle(&me, &ParentChain::from_keys([key(2), key(3)]), &key(2), &none),
            Some(RejectReason::Ancestor)
        );
    }
}
