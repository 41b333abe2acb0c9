//! Parent chain - ordered ancestry used for cycle avoidance
//!
//! The chain records the path by which a peer joined the swarm, oldest
//! ancestor first. It is never used for routing. Membership checks go through
//! a hash index so admission stays O(1) as swarms grow.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::PublicKey;

/// Maximum number of ancestors carried in a chain
pub const MAX_PARENT_CHAIN: usize = 64;

/// Ordered ancestry of public keys
#[derive(Clone, Debug, Default)]
pub struct ParentChain {
    keys: Vec<PublicKey>,
    index: HashSet<PublicKey>,
}

impl ParentChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an ordered list. Duplicates are dropped and only the
    /// newest `MAX_PARENT_CHAIN` ancestors are kept.
    pub fn from_keys(keys: impl IntoIterator<Item = PublicKey>) -> Self {
        let mut chain = ParentChain::new();
        for key in keys {
            chain.push(key);
        }
        chain
    }

    /// Append an ancestor, evicting the oldest when full
    pub fn push(&mut self, key: PublicKey) {
        if !self.index.insert(key) {
            return;
        }
        self.keys.push(key);
        if self.keys.len() > MAX_PARENT_CHAIN {
            let evicted = self.keys.remove(0);
            self.index.remove(&evicted);
        }
    }

    /// Chain seen by a peer that joins through `via`
    pub fn extended(&self, via: PublicKey) -> ParentChain {
        let mut chain = self.clone();
        chain.push(via);
        chain
    }

    #[inline]
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.index.contains(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.keys.iter()
    }

    pub fn as_slice(&self) -> &[PublicKey] {
        &self.keys
    }

    /// Most recent ancestor (the peer we joined through)
    pub fn immediate(&self) -> Option<&PublicKey> {
        self.keys.last()
    }
}

impl PartialEq for ParentChain {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for ParentChain {}

impl Serialize for ParentChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.keys.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ParentChain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let keys = Vec::<PublicKey>::deserialize(deserializer)?;
        Ok(ParentChain::from_keys(keys))
    }
}
