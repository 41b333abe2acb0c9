//! Keyed membership index
//!
//! Each key owns its own bucket behind a mutex. The map's shard lock is held
//! only long enough to fetch or create the bucket handle; membership changes
//! and deliveries lock just that bucket.
//!
//! A bucket that becomes empty is marked retired under its own lock and then
//! unlinked from the map. An inserter that lands on a retired bucket retries
//! against the map, so a delivery never observes a half-removed bucket and an
//! insert is never lost to a concurrent removal.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use linx_core::SessionId;

#[derive(Debug, Default)]
struct Bucket {
    members: HashSet<SessionId>,
    retired: bool,
}

type BucketRef = Arc<Mutex<Bucket>>;

/// Key -> set of sessions
#[derive(Debug)]
pub struct KeyedIndex<K: Eq + Hash> {
    buckets: DashMap<K, BucketRef>,
}

impl<K: Eq + Hash> Default for KeyedIndex<K> {
    fn default() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `session` under `key`. Returns false if it was already there.
    pub fn insert(&self, key: &K, session: SessionId) -> bool {
        loop {
            let bucket = Arc::clone(self.buckets.entry(key.clone()).or_default().value());
            let mut guard = bucket.lock();
            if guard.retired {
                continue;
            }
            return guard.members.insert(session);
        }
    }

    /// Remove `session` from `key`. Returns false if it was not there.
    pub fn remove(&self, key: &K, session: SessionId) -> bool {
        let Some(bucket) = self.bucket(key) else {
            return false;
        };

        let mut guard = bucket.lock();
        let removed = guard.members.remove(&session);
        if guard.members.is_empty() && !guard.retired {
            guard.retired = true;
            self.buckets
                .remove_if(key, |_, current| Arc::ptr_eq(current, &bucket));
        }
        removed
    }

    /// Run `f` for every member of `key` while holding the bucket lock.
    /// Returns how many members were visited.
    pub fn for_each(&self, key: &K, mut f: impl FnMut(SessionId)) -> usize {
        let Some(bucket) = self.bucket(key) else {
            return 0;
        };

        let guard = bucket.lock();
        if guard.retired {
            return 0;
        }
        for session in &guard.members {
            f(*session);
        }
        guard.members.len()
    }

    pub fn contains(&self, key: &K, session: SessionId) -> bool {
        self.bucket(key)
            .map(|bucket| bucket.lock().members.contains(&session))
            .unwrap_or(false)
    }

    /// Members of `key` (unordered snapshot)
    pub fn members(&self, key: &K) -> Vec<SessionId> {
        let mut members = Vec::new();
        self.for_each(key, |session| members.push(session));
        members
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn bucket(&self, key: &K) -> Option<BucketRef> {
        self.buckets.get(key).map(|entry| Arc::clone(entry.value()))
    }
}
