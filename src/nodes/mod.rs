// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Trie nodes.
//!
//! A trie is made of two kinds of node. A [`MutableNode`] is owned by
//! exactly one map and edited in place while that map is being written.
//! An [`ImmutableNode`] is frozen, bitmap-compressed and shared through a
//! [`SharedPointer`] between any number of versions, maps and threads.
//! Committing freezes a mutable trie; writing to a frozen trie thaws the
//! path from the root to the written slot and nothing else.

pub(crate) mod cache;
pub(crate) mod immutable;
pub(crate) mod iter;
pub(crate) mod mutable;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use archery::{SharedPointer, SharedPointerKind};

use crate::config::{BRANCHING_FACTOR, FRAGMENTS_PER_ROUND, HASH_LEVEL_SIZE, MAX_PRACTICAL_DEPTH};
use crate::error::{Error, Result};
use crate::hash_provider::ContinuousHashProvider;

use self::cache::NodeCache;
use self::immutable::ImmutableNode;
use self::mutable::MutableNode;

pub(crate) type Bitmap = bitmaps::Bitmap<BRANCHING_FACTOR>;

const FRAGMENT_MASK: u32 = (BRANCHING_FACTOR - 1) as u32;

// Enough bits to count the fragments of one round.
const SHIFT_BITS: u32 = u32::BITS - (FRAGMENTS_PER_ROUND - 1).leading_zeros();
const SHIFT_MASK: u32 = (1 << SHIFT_BITS) - 1;

/// The depth of a trie level, packed as the hash round in the high bits and
/// the fragment within that round in the low bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Depth(u32);

impl Depth {
    pub(crate) const ROOT: Depth = Depth(0);

    /// Which fragment of the current hash word this level reads.
    #[inline]
    pub(crate) fn shift_depth(self) -> u32 {
        self.0 & SHIFT_MASK
    }

    /// Which hash word (round) this level reads.
    #[inline]
    pub(crate) fn hash_depth(self) -> u32 {
        self.0 >> SHIFT_BITS
    }

    /// The depth of the level below, rolling over into the next round once
    /// every fragment of the current word has been used.
    #[inline]
    pub(crate) fn increment(self) -> Depth {
        if self.shift_depth() + 1 == FRAGMENTS_PER_ROUND {
            Depth((self.hash_depth() + 1) << SHIFT_BITS)
        } else {
            Depth(self.0 + 1)
        }
    }
}

/// Select the slot a hash falls into at a given fragment of its round.
#[inline]
pub(crate) fn hash_fragment(hash: u32, shift_depth: u32) -> usize {
    ((hash >> (shift_depth * HASH_LEVEL_SIZE as u32)) & FRAGMENT_MASK) as usize
}

/// The hash word of `key` for the round `depth` belongs to.
///
/// Panics once the round reaches [`MAX_PRACTICAL_DEPTH`]: the keys being
/// separated have identical hashes in every round, and no trie can hold them.
pub(crate) fn round_hash<K, H>(provider: &H, key: &K, depth: Depth) -> u32
where
    H: ContinuousHashProvider<K> + ?Sized,
{
    let round = depth.hash_depth();
    if round >= MAX_PRACTICAL_DEPTH {
        panic!("{}", Error::UnrepresentableCollision { rounds: round });
    }
    provider.hash(key, round)
}

/// The hash to use at `depth`, given the hash used one level up. Only
/// changes when `depth` starts a new round.
#[inline]
pub(crate) fn new_hash<K, H>(provider: &H, key: &K, hash: u32, depth: Depth) -> u32
where
    H: ContinuousHashProvider<K> + ?Sized,
{
    if depth.shift_depth() == 0 {
        round_hash(provider, key, depth)
    } else {
        hash
    }
}

/// The `index`th bit's position among the set bits of `map`.
#[inline]
pub(crate) fn rank(map: Bitmap, index: usize) -> usize {
    (map.into_value() & ((1u32 << index) - 1)).count_ones() as usize
}

/// Iterate over the set bits of `map`, lowest first.
pub(crate) fn indices(map: Bitmap) -> impl Iterator<Item = usize> {
    let mut bits = map.into_value();
    std::iter::from_fn(move || {
        if bits == 0 {
            None
        } else {
            let index = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(index)
        }
    })
}

/// The content hash of a node with the given layout. Both node kinds hash
/// through here so that a mutable node and its frozen form agree.
pub(crate) fn structural_hash<'a, K, V, E, C>(
    data_map: Bitmap,
    node_map: Bitmap,
    entries: E,
    children: C,
) -> u64
where
    K: Hash + 'a,
    V: Hash + 'a,
    E: IntoIterator<Item = (&'a K, &'a V)>,
    C: IntoIterator<Item = u64>,
{
    let mut hasher = DefaultHasher::new();
    hasher.write_u32(data_map.into_value());
    hasher.write_u32(node_map.into_value());
    for (key, value) in entries {
        key.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    for child in children {
        hasher.write_u64(child);
    }
    hasher.finish()
}

/// Check that `key` belongs at `path`: its fragment at every level matches
/// the slot it was found under.
pub(crate) fn check_placement<K, H>(provider: &H, key: &K, path: &[usize]) -> Result<()>
where
    H: ContinuousHashProvider<K> + ?Sized,
{
    let mut depth = Depth::ROOT;
    for (level, &slot) in path.iter().enumerate() {
        let fragment = hash_fragment(provider.hash(key, depth.hash_depth()), depth.shift_depth());
        if fragment != slot {
            return Err(Error::integrity(format!(
                "key at level {} hashes to slot {} but is stored in slot {}",
                level, fragment, slot
            )));
        }
        depth = depth.increment();
    }
    Ok(())
}

/// A trie node of either kind.
pub(crate) enum Node<K, V, P: SharedPointerKind> {
    Mutable(Box<MutableNode<K, V, P>>),
    Immutable(SharedPointer<ImmutableNode<K, V, P>, P>),
}

impl<K, V, P> Node<K, V, P>
where
    K: Hash + Eq + Clone,
    V: Hash + Eq + Clone,
    P: SharedPointerKind,
{
    pub(crate) fn get<H>(&self, key: &K, provider: &H, hash: u32, depth: Depth) -> Option<&V>
    where
        H: ContinuousHashProvider<K> + ?Sized,
    {
        match self {
            Node::Mutable(node) => node.get(key, provider, hash, depth),
            Node::Immutable(node) => node.get(key, provider, hash, depth),
        }
    }

    /// Write `value` under `key`, storing `default` meaning removal.
    ///
    /// Returns the node to keep in place of this one (`None` once it has
    /// been emptied) and the value the key held before, if any.
    pub(crate) fn put<H>(
        self,
        key: K,
        value: V,
        provider: &H,
        default: &V,
        hash: u32,
        depth: Depth,
    ) -> (Option<Self>, Option<V>)
    where
        H: ContinuousHashProvider<K> + ?Sized,
    {
        let node = match self {
            Node::Mutable(node) => node,
            Node::Immutable(node) => ImmutableNode::into_mutable(node),
        };
        node.put(key, value, provider, default, hash, depth)
    }

    /// Count the entries below this node.
    ///
    /// Time: O(n)
    pub(crate) fn size(&self) -> usize {
        match self {
            Node::Mutable(node) => node.size(),
            Node::Immutable(node) => node.size(),
        }
    }

    /// Freeze a copy of this node, leaving it untouched.
    pub(crate) fn to_immutable(
        &self,
        cache: Option<&NodeCache<K, V, P>>,
    ) -> SharedPointer<ImmutableNode<K, V, P>, P> {
        match self {
            Node::Mutable(node) => node.to_immutable(cache),
            Node::Immutable(node) => node.clone(),
        }
    }

    /// Freeze this node, moving its entries into the frozen form.
    pub(crate) fn into_immutable(
        self,
        cache: Option<&NodeCache<K, V, P>>,
    ) -> SharedPointer<ImmutableNode<K, V, P>, P> {
        match self {
            Node::Mutable(node) => node.into_immutable(cache),
            Node::Immutable(node) => node,
        }
    }

    pub(crate) fn structural_hash(&self) -> u64 {
        match self {
            Node::Mutable(node) => node.structural_hash(),
            Node::Immutable(node) => node.structural_hash(),
        }
    }

    /// If this node holds a single entry and nothing else, take that entry
    /// so the parent can store it directly.
    pub(crate) fn take_orphan(self) -> std::result::Result<(K, V), Self> {
        match self {
            Node::Mutable(node) if node.is_orphan() => Ok(node.into_single_entry()),
            other => Err(other),
        }
    }

    /// Verify the trie below this node. `path` holds the slots leading here
    /// from the root, and is empty for the root itself.
    pub(crate) fn check_integrity<H>(
        &self,
        provider: &H,
        default: &V,
        path: &mut Vec<usize>,
    ) -> Result<()>
    where
        H: ContinuousHashProvider<K> + ?Sized,
    {
        match self {
            Node::Mutable(node) => node.check_integrity(provider, default, path),
            Node::Immutable(node) => node.check_integrity(provider, default, path),
        }
    }
}

impl<K, V, P> Node<K, V, P>
where
    K: PartialEq,
    V: PartialEq,
    P: SharedPointerKind,
{
    pub(crate) fn eq_immutable(&self, other: &SharedPointer<ImmutableNode<K, V, P>, P>) -> bool {
        match self {
            Node::Mutable(node) => **node == **other,
            Node::Immutable(node) => SharedPointer::ptr_eq(node, other) || **node == **other,
        }
    }
}

impl<K, V, P> Clone for Node<K, V, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    fn clone(&self) -> Self {
        match self {
            Node::Mutable(node) => Node::Mutable(node.clone()),
            Node::Immutable(node) => Node::Immutable(node.clone()),
        }
    }
}

impl<K, V, P> PartialEq for Node<K, V, P>
where
    K: PartialEq,
    V: PartialEq,
    P: SharedPointerKind,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Immutable(node), other) | (other, Node::Immutable(node)) => {
                other.eq_immutable(node)
            }
            (Node::Mutable(left), Node::Mutable(right)) => **left == **right,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, P: SharedPointerKind> fmt::Debug for Node<K, V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Mutable(node) => node.fmt(f),
            Node::Immutable(node) => node.fmt(f),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn depth_rolls_over_every_round() {
        let mut depth = Depth::ROOT;
        let mut seen = Vec::new();
        for _ in 0..15 {
            seen.push((depth.hash_depth(), depth.shift_depth()));
            depth = depth.increment();
        }
        let expected: Vec<(u32, u32)> = (0..15).map(|level| (level / 7, level % 7)).collect();
        assert_eq!(expected, seen);
    }

    #[test]
    fn fragments_cover_the_word() {
        let hash = 0b11_00001_00010_00011_00100_00101_00110u32;
        let fragments: Vec<usize> = (0..7).map(|shift| hash_fragment(hash, shift)).collect();
        assert_eq!(vec![6, 5, 4, 3, 2, 1, 3], fragments);
        assert_eq!(31, hash_fragment(u32::MAX, 5));
        assert_eq!(3, hash_fragment(u32::MAX, 6));
    }

    #[test]
    fn new_hash_only_asks_at_round_boundaries() {
        let provider = |key: &u32, round: u32| key + round * 1000;
        let mut depth = Depth::ROOT;
        let mut hash = provider(&1, 0);
        for _ in 0..7 {
            depth = depth.increment();
            hash = new_hash(&provider, &1, hash, depth);
            if depth.shift_depth() != 0 {
                assert_eq!(1, hash);
            }
        }
        assert_eq!(1, depth.hash_depth());
        assert_eq!(1001, hash);
    }

    #[test]
    #[should_panic(expected = "hash rounds")]
    fn exhausted_rounds_are_fatal() {
        let provider = |_: &u32, _: u32| 0u32;
        let depth = Depth(MAX_PRACTICAL_DEPTH << SHIFT_BITS);
        round_hash(&provider, &1, depth);
    }

    #[test]
    fn bitmap_helpers() {
        let mut map = Bitmap::new();
        map.set(1, true);
        map.set(4, true);
        map.set(31, true);
        assert_eq!(vec![1, 4, 31], indices(map).collect::<Vec<_>>());
        assert_eq!(0, rank(map, 1));
        assert_eq!(1, rank(map, 4));
        assert_eq!(2, rank(map, 31));
        assert_eq!(2, rank(map, 5));
    }

    #[test]
    fn placement_checks_every_level() {
        let provider = |key: &u32, _: u32| *key;
        assert!(check_placement(&provider, &0b00010_00001, &[1, 2]).is_ok());
        assert!(check_placement(&provider, &0b00010_00001, &[1, 3]).is_err());
    }
}
