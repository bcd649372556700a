// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;

use archery::SharedPointerKind;
use tracing::trace;

use crate::config::VersionedMapConfig;
use crate::cursor::{InOrderMapCursor, MapDiffCursor};
use crate::hash_provider::{ContinuousHashProvider, DefaultHashProvider};
use crate::nodes::cache::NodeCache;
use crate::nodes::Node;
use crate::shared_ptr::DefaultSharedPtr;

use super::{GenericVersionedMap, Version};

/// Type alias for [`GenericVersionedMapStore`] that uses [`DefaultSharedPtr`]
/// as the pointer type.
///
/// [GenericVersionedMapStore]: ./struct.GenericVersionedMapStore.html
/// [DefaultSharedPtr]: ../shared_ptr/type.DefaultSharedPtr.html
pub type VersionedMapStore<K, V, H = DefaultHashProvider> =
    GenericVersionedMapStore<K, V, H, DefaultSharedPtr>;

/// A factory of versioned maps sharing one hash provider, one default value
/// and, depending on the configuration, one node cache.
///
/// Versions committed by maps of the same store are made of nodes frozen
/// through the same cache, so equal content is stored once no matter which
/// map it came from, and any two of them can be diffed.
pub struct GenericVersionedMapStore<K, V, H, P: SharedPointerKind> {
    hash_provider: H,
    default_value: V,
    config: VersionedMapConfig,
    cache: Option<NodeCache<K, V, P>>,
}

impl<K, V, H, P> GenericVersionedMapStore<K, V, H, P>
where
    K: Hash + Eq + Clone,
    V: Hash + Eq + Clone,
    H: ContinuousHashProvider<K> + Clone,
    P: SharedPointerKind,
{
    /// Construct a store with the default configuration.
    #[must_use]
    pub fn new(hash_provider: H, default_value: V) -> Self {
        Self::with_config(hash_provider, default_value, VersionedMapConfig::default())
    }

    /// Construct a store with the given configuration.
    #[must_use]
    pub fn with_config(hash_provider: H, default_value: V, config: VersionedMapConfig) -> Self {
        let cache = config
            .shared_node_cache_in_store
            .then(|| NodeCache::new(config.version_freeing_enabled));
        GenericVersionedMapStore {
            hash_provider,
            default_value,
            config,
            cache,
        }
    }

    /// Construct `amount` stores at once.
    ///
    /// With [`shared_node_cache_in_store_groups`][VersionedMapConfig::shared_node_cache_in_store_groups]
    /// set, the stores share a single node cache: every lookup goes through
    /// one lock, but subtrees common to maps of different stores are kept
    /// only once. Otherwise each store is built as
    /// [`with_config`][Self::with_config] would build it. Without
    /// [`shared_node_cache_in_store`][VersionedMapConfig::shared_node_cache_in_store]
    /// no store gets a cache at all, whatever the group option says.
    #[must_use]
    pub fn create_group(
        hash_provider: H,
        default_value: V,
        amount: usize,
        config: VersionedMapConfig,
    ) -> Vec<Self> {
        let shared = config.shared_node_cache_in_store && config.shared_node_cache_in_store_groups;
        trace!(amount, shared, "creating store group");
        if !shared {
            return (0..amount)
                .map(|_| Self::with_config(hash_provider.clone(), default_value.clone(), config))
                .collect();
        }
        let cache = NodeCache::new(config.version_freeing_enabled);
        (0..amount)
            .map(|_| GenericVersionedMapStore {
                hash_provider: hash_provider.clone(),
                default_value: default_value.clone(),
                config,
                cache: Some(cache.clone()),
            })
            .collect()
    }

    /// Create an empty map.
    #[must_use]
    pub fn create_map(&self) -> GenericVersionedMap<K, V, H, P> {
        GenericVersionedMap::new(self.clone(), None)
    }

    /// Create a map holding the content of `version`.
    #[must_use]
    pub fn create_map_at(&self, version: &Version<K, V, P>) -> GenericVersionedMap<K, V, H, P> {
        GenericVersionedMap::new(self.clone(), version.root().cloned().map(Node::Immutable))
    }

    /// A cursor over the keys whose values differ between `from` and `to`.
    ///
    /// Both versions must come from stores using this store's hash provider
    /// and default value. The cursor reads immutable snapshots only, so it
    /// can never become dirty.
    #[must_use]
    pub fn diff_cursor(&self, from: &Version<K, V, P>, to: &Version<K, V, P>) -> MapDiffCursor<K, V, P> {
        MapDiffCursor::new(
            self.default_value.clone(),
            InOrderMapCursor::new(from.root().cloned(), None),
            InOrderMapCursor::new(to.root().cloned(), None),
        )
    }

    /// Freeze `root` into a version. With
    /// [`immutable_when_committing`][VersionedMapConfig::immutable_when_committing]
    /// set, `root` is replaced by its frozen form.
    pub(crate) fn commit(&self, root: &mut Option<Node<K, V, P>>) -> Version<K, V, P> {
        let cache = self.cache.as_ref();
        let frozen = if self.config.immutable_when_committing {
            let frozen = root.take().map(|node| node.into_immutable(cache));
            *root = frozen.clone().map(Node::Immutable);
            frozen
        } else {
            root.as_ref().map(|node| node.to_immutable(cache))
        };
        Version::new(frozen)
    }
}

impl<K, V, H, P: SharedPointerKind> GenericVersionedMapStore<K, V, H, P> {
    /// Get the store's configuration.
    #[must_use]
    pub fn config(&self) -> &VersionedMapConfig {
        &self.config
    }

    /// Get the value absent keys read as.
    #[must_use]
    pub fn default_value(&self) -> &V {
        &self.default_value
    }

    /// Get the store's hash provider.
    #[must_use]
    pub fn hash_provider(&self) -> &H {
        &self.hash_provider
    }

    /// Count the nodes held in this store's cache. Always 0 for a store
    /// without a cache.
    #[must_use]
    pub fn cached_node_count(&self) -> usize {
        self.cache.as_ref().map_or(0, NodeCache::len)
    }

    /// Drop the cached nodes that no version or map refers to any more, and
    /// return how many were dropped.
    ///
    /// The cache does this by itself every time it doubles in size; call
    /// this to reclaim memory right after letting go of many versions. Does
    /// nothing unless
    /// [`version_freeing_enabled`][VersionedMapConfig::version_freeing_enabled]
    /// is set.
    pub fn free_unused_versions(&self) -> usize {
        self.cache.as_ref().map_or(0, NodeCache::sweep)
    }

    /// Test whether two stores freeze their nodes into the same cache.
    #[must_use]
    pub fn shares_cache_with(&self, other: &Self) -> bool {
        match (&self.cache, &other.cache) {
            (Some(left), Some(right)) => left.ptr_eq(right),
            _ => false,
        }
    }
}

impl<K, V, H, P> Clone for GenericVersionedMapStore<K, V, H, P>
where
    V: Clone,
    H: Clone,
    P: SharedPointerKind,
{
    /// Clones share the node cache of the original.
    fn clone(&self) -> Self {
        GenericVersionedMapStore {
            hash_provider: self.hash_provider.clone(),
            default_value: self.default_value.clone(),
            config: self.config,
            cache: self.cache.clone(),
        }
    }
}

impl<K, V, H, P> Default for GenericVersionedMapStore<K, V, H, P>
where
    K: Hash + Eq + Clone,
    V: Hash + Eq + Clone + Default,
    H: ContinuousHashProvider<K> + Clone + Default,
    P: SharedPointerKind,
{
    fn default() -> Self {
        Self::new(H::default(), V::default())
    }
}

impl<K, V, H, P> Debug for GenericVersionedMapStore<K, V, H, P>
where
    V: Debug,
    H: Debug,
    P: SharedPointerKind,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedMapStore")
            .field("hash_provider", &self.hash_provider)
            .field("default_value", &self.default_value)
            .field("config", &self.config)
            .field("cached_nodes", &self.cached_node_count())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cursor::Cursor;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    assert_impl_all!(VersionedMapStore<i32, i32>: Send, Sync, Clone, Debug);
    assert_not_impl_any!(GenericVersionedMapStore<i32, i32, DefaultHashProvider, archery::RcK>: Send, Sync);

    #[test]
    fn groups_share_one_cache() {
        let stores =
            VersionedMapStore::<u32, u32>::create_group(DefaultHashProvider::new(), 0, 3, VersionedMapConfig::new());
        assert_eq!(3, stores.len());
        assert!(stores[0].shares_cache_with(&stores[1]));
        assert!(stores[1].shares_cache_with(&stores[2]));

        let mut first = stores[0].create_map();
        let mut second = stores[2].create_map();
        first.extend((1..50).map(|i| (i, i)));
        second.extend((1..50).map(|i| (i, i)));
        let (first, second) = (first.commit(), second.commit());
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn groups_without_sharing() {
        let config = VersionedMapConfig {
            shared_node_cache_in_store_groups: false,
            ..VersionedMapConfig::new()
        };
        let stores = VersionedMapStore::<u32, u32>::create_group(DefaultHashProvider::new(), 0, 2, config);
        assert!(!stores[0].shares_cache_with(&stores[1]));
        assert!(stores[0].shares_cache_with(&stores[0].clone()));

        let uncached = VersionedMapStore::<u32, u32>::create_group(
            DefaultHashProvider::new(),
            0,
            2,
            VersionedMapConfig::uncached(),
        );
        assert!(!uncached[0].shares_cache_with(&uncached[1]));
        assert_eq!(0, uncached[0].cached_node_count());
    }

    #[test]
    fn groups_need_a_cache_to_share_one() {
        let config = VersionedMapConfig {
            shared_node_cache_in_store: false,
            ..VersionedMapConfig::new()
        };
        let stores = VersionedMapStore::<u32, u32>::create_group(DefaultHashProvider::new(), 0, 2, config);
        assert!(!stores[0].shares_cache_with(&stores[1]));

        let mut first = stores[0].create_map();
        let mut second = stores[1].create_map();
        first.extend((1..50).map(|i| (i, i)));
        second.extend((1..50).map(|i| (i, i)));
        let (first, second) = (first.commit(), second.commit());
        assert_eq!(first, second);
        assert!(!first.ptr_eq(&second));
        assert_eq!(0, stores[0].cached_node_count());
        assert_eq!(0, stores[1].cached_node_count());
    }

    #[test]
    fn unreferenced_versions_are_freed() {
        let store = VersionedMapStore::new(DefaultHashProvider::new(), 0u64);
        let mut map = store.create_map();
        let kept = {
            map.extend((1..200u64).map(|i| (i, i)));
            map.commit()
        };
        for round in 1..20u64 {
            map.put(round, round * 1000);
            map.commit();
        }
        map.restore(&kept);
        let before = store.cached_node_count();
        let freed = store.free_unused_versions();
        assert!(freed > 0);
        assert_eq!(before - freed, store.cached_node_count());
        assert_eq!(199, store.create_map_at(&kept).size());
        assert_eq!(Ok(()), kept.check_integrity(store.hash_provider(), store.default_value()));
    }

    #[test]
    fn strong_caches_keep_everything() {
        let config = VersionedMapConfig {
            version_freeing_enabled: false,
            ..VersionedMapConfig::new()
        };
        let store = VersionedMapStore::with_config(DefaultHashProvider::new(), 0, config);
        let mut map = store.create_map();
        for i in 1..20 {
            map.put(i, i);
            map.commit();
        }
        map.clear();
        let before = store.cached_node_count();
        assert_eq!(0, store.free_unused_versions());
        assert_eq!(before, store.cached_node_count());
    }

    #[test]
    fn diffs_between_stored_versions() {
        let store = VersionedMapStore::new(DefaultHashProvider::new(), 0);
        let mut map = store.create_map();
        map.put(1, 1);
        let from = map.commit();
        map.put(1, 0);
        map.put(2, 2);
        let to = map.commit();
        let mut diff = store.diff_cursor(&from, &to);
        let mut seen = Vec::new();
        while diff.move_next().unwrap() {
            seen.push(*diff.key().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(vec![1, 2], seen);
        assert!(!diff.is_dirty());
    }
}
