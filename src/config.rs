// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// The level size of the trie, in bits.
/// Branching factor is 2 ^ HashLevelSize.
pub(crate) const HASH_LEVEL_SIZE: usize = 5;

/// The branching factor of the trie.
pub(crate) const BRANCHING_FACTOR: usize = 1 << HASH_LEVEL_SIZE;

/// How many fragments a single 32 bit hash word is cut into. The last
/// fragment of a round only has the two leftover bits to work with.
pub(crate) const FRAGMENTS_PER_ROUND: u32 =
    (u32::BITS + HASH_LEVEL_SIZE as u32 - 1) / HASH_LEVEL_SIZE as u32;

/// The number of hash rounds a key may ask its hash provider for before
/// the trie gives up on separating it from a colliding key.
pub const MAX_PRACTICAL_DEPTH: u32 = 500;

/// Node caches below this size are never swept.
pub(crate) const CACHE_SWEEP_MIN: usize = 1024;

/// Options shared by every map created from one
/// [`VersionedMapStore`][crate::VersionedMapStore].
///
/// All options default to `true`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VersionedMapConfig {
    /// Replace the working root of a map with its frozen form on commit,
    /// so that later reads go through the canonical nodes and later
    /// writes copy only the paths they touch.
    pub immutable_when_committing: bool,
    /// Deduplicate structurally equal nodes through a per-store cache.
    pub shared_node_cache_in_store: bool,
    /// Let the stores of one [`create_group`][crate::VersionedMapStore::create_group]
    /// call share a single cache. Has no effect unless
    /// [`shared_node_cache_in_store`][Self::shared_node_cache_in_store] is set.
    pub shared_node_cache_in_store_groups: bool,
    /// Evict cached nodes that nothing but the cache refers to any more.
    ///
    /// Without this, every node ever committed stays alive for as long
    /// as the store does, which keeps cache hits stable at the price of
    /// memory.
    pub version_freeing_enabled: bool,
}

impl Default for VersionedMapConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionedMapConfig {
    /// The default configuration, with every option switched on.
    #[must_use]
    pub const fn new() -> Self {
        VersionedMapConfig {
            immutable_when_committing: true,
            shared_node_cache_in_store: true,
            shared_node_cache_in_store_groups: true,
            version_freeing_enabled: true,
        }
    }

    /// A configuration without any node cache. Commits still share
    /// untouched subtrees with earlier versions, but equal subtrees built
    /// independently are not merged.
    #[must_use]
    pub const fn uncached() -> Self {
        VersionedMapConfig {
            shared_node_cache_in_store: false,
            shared_node_cache_in_store_groups: false,
            ..Self::new()
        }
    }
}
