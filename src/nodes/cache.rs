// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Canonical frozen nodes.
//!
//! Every node frozen through a [`NodeCache`] is replaced by the cached node
//! with the same content, if there is one. Two versions that contain an
//! equal subtree then hold the very same allocation for it, and comparing
//! them can stop at the first shared pointer.

use std::collections::HashMap;
use std::hash::Hash;

use archery::{SharedPointer, SharedPointerKind};
use tracing::debug;

use crate::config::CACHE_SWEEP_MIN;
use crate::sync::Lock;

use super::immutable::ImmutableNode;

type Bucket<K, V, P> = Vec<SharedPointer<ImmutableNode<K, V, P>, P>>;

struct CacheState<K, V, P: SharedPointerKind> {
    buckets: HashMap<u64, Bucket<K, V, P>>,
    len: usize,
    freeing: bool,
    sweep_at: usize,
}

impl<K, V, P: SharedPointerKind> CacheState<K, V, P> {
    /// Drop every node nothing outside the cache refers to. Dropping a node
    /// can release its children, so this repeats until nothing changes.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        loop {
            let before = freed;
            self.buckets.retain(|_, bucket| {
                bucket.retain(|node| {
                    let alive = SharedPointer::strong_count(node) > 1;
                    if !alive {
                        freed += 1;
                    }
                    alive
                });
                !bucket.is_empty()
            });
            if freed == before {
                break;
            }
        }
        self.len -= freed;
        self.sweep_at = CACHE_SWEEP_MIN.max(self.len * 2);
        freed
    }
}

/// A deduplicating store of frozen nodes, keyed by structural hash.
///
/// Clones share the same cache, which is how stores of one group share
/// their nodes. The cache is guarded by a lock, so stores in different
/// threads may freeze into it at once.
pub(crate) struct NodeCache<K, V, P: SharedPointerKind> {
    state: Lock<CacheState<K, V, P>>,
}

impl<K, V, P: SharedPointerKind> Clone for NodeCache<K, V, P> {
    fn clone(&self) -> Self {
        NodeCache {
            state: self.state.clone(),
        }
    }
}

impl<K, V, P: SharedPointerKind> NodeCache<K, V, P> {
    /// Construct an empty cache. With `freeing` set, nodes only the cache
    /// still holds are evicted every time the cache doubles in size.
    pub(crate) fn new(freeing: bool) -> Self {
        NodeCache {
            state: Lock::new(CacheState {
                buckets: HashMap::new(),
                len: 0,
                freeing,
                sweep_at: CACHE_SWEEP_MIN,
            }),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().len
    }

    /// Evict every node that no version or map refers to any more, and
    /// return how many were evicted. Does nothing for a cache that keeps
    /// its nodes forever.
    pub(crate) fn sweep(&self) -> usize {
        let mut state = self.state.lock();
        if !state.freeing {
            return 0;
        }
        let freed = state.sweep();
        debug!(freed, remaining = state.len, "swept node cache");
        freed
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        self.state.ptr_eq(&other.state)
    }
}

impl<K, V, P> NodeCache<K, V, P>
where
    K: PartialEq,
    V: PartialEq,
    P: SharedPointerKind,
{
    /// Return the cached node equal to `candidate`, caching `candidate`
    /// first if there is none.
    pub(crate) fn intern(
        &self,
        candidate: ImmutableNode<K, V, P>,
    ) -> SharedPointer<ImmutableNode<K, V, P>, P> {
        let hash = candidate.structural_hash();
        let mut state = self.state.lock();
        if let Some(found) = state
            .buckets
            .get(&hash)
            .and_then(|bucket| bucket.iter().find(|node| ***node == candidate))
        {
            return found.clone();
        }
        let node = SharedPointer::new(candidate);
        state.buckets.entry(hash).or_default().push(node.clone());
        state.len += 1;
        if state.freeing && state.len >= state.sweep_at {
            let freed = state.sweep();
            debug!(freed, remaining = state.len, "swept node cache");
        }
        node
    }
}

/// Share `candidate` through `cache`, or on its own if there is no cache.
pub(crate) fn canonicalize<K, V, P>(
    candidate: ImmutableNode<K, V, P>,
    cache: Option<&NodeCache<K, V, P>>,
) -> SharedPointer<ImmutableNode<K, V, P>, P>
where
    K: Hash + Eq,
    V: Hash + Eq,
    P: SharedPointerKind,
{
    match cache {
        Some(cache) => cache.intern(candidate),
        None => SharedPointer::new(candidate),
    }
}
