// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::hash::Hash;

use archery::{SharedPointer, SharedPointerKind};
use imbl_sized_chunks::sparse_chunk::SparseChunk;

use crate::config::BRANCHING_FACTOR;
use crate::error::{Error, Result};
use crate::hash_provider::ContinuousHashProvider;

use super::cache::{canonicalize, NodeCache};
use super::immutable::{ImmutableNode, SlotRef};
use super::{check_placement, hash_fragment, new_hash, round_hash, structural_hash, Bitmap, Depth, Node};

/// What a slot of a mutable node holds.
pub(crate) enum Slot<K, V, P: SharedPointerKind> {
    Entry(K, V),
    Child(Node<K, V, P>),
}

impl<K: Clone, V: Clone, P: SharedPointerKind> Clone for Slot<K, V, P> {
    fn clone(&self) -> Self {
        match self {
            Slot::Entry(key, value) => Slot::Entry(key.clone(), value.clone()),
            Slot::Child(node) => Slot::Child(node.clone()),
        }
    }
}

/// A node owned by a single map, edited in place.
///
/// Slots are kept in a [`SparseChunk`], which is itself a bitmap over a
/// fixed array, so a slot is found or filled without shifting its
/// neighbours.
pub(crate) struct MutableNode<K, V, P: SharedPointerKind> {
    slots: SparseChunk<Slot<K, V, P>, BRANCHING_FACTOR>,
}

impl<K: Clone, V: Clone, P: SharedPointerKind> Clone for MutableNode<K, V, P> {
    fn clone(&self) -> Self {
        MutableNode {
            slots: self.slots.clone(),
        }
    }
}

impl<K, V, P: SharedPointerKind> Default for MutableNode<K, V, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, P: SharedPointerKind> MutableNode<K, V, P> {
    #[inline]
    pub(crate) fn new() -> Self {
        MutableNode {
            slots: SparseChunk::new(),
        }
    }

    #[inline]
    pub(crate) fn slots(&self) -> &SparseChunk<Slot<K, V, P>, BRANCHING_FACTOR> {
        &self.slots
    }

    #[inline]
    pub(crate) fn insert_entry(&mut self, index: usize, key: K, value: V) {
        self.slots.insert(index, Slot::Entry(key, value));
    }

    #[inline]
    pub(crate) fn insert_child(&mut self, index: usize, child: Node<K, V, P>) {
        self.slots.insert(index, Slot::Child(child));
    }

    /// A non-root node with a single entry and no children.
    pub(crate) fn is_orphan(&self) -> bool {
        self.slots.len() == 1 && matches!(self.slots.iter().next(), Some(Slot::Entry(..)))
    }

    pub(crate) fn into_single_entry(mut self: Box<Self>) -> (K, V) {
        match self.slots.pop() {
            Some(Slot::Entry(key, value)) => (key, value),
            _ => unreachable!("orphan node without an entry"),
        }
    }

    fn bitmaps(&self) -> (Bitmap, Bitmap) {
        let mut data_map = Bitmap::new();
        let mut node_map = Bitmap::new();
        for index in self.slots.indices() {
            match self.slots[index] {
                Slot::Entry(..) => data_map.set(index, true),
                Slot::Child(_) => node_map.set(index, true),
            };
        }
        (data_map, node_map)
    }

    fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Entry(key, value) => Some((key, value)),
            Slot::Child(_) => None,
        })
    }
}

impl<K, V, P> MutableNode<K, V, P>
where
    K: Hash + Eq + Clone,
    V: Hash + Eq + Clone,
    P: SharedPointerKind,
{
    /// Build the subtree holding two distinct keys, starting at `depth`.
    ///
    /// The depth at which the keys part is found first, so running out of
    /// hash rounds panics before any node is allocated.
    #[allow(clippy::too_many_arguments)]
    fn pair<H>(
        key1: K,
        value1: V,
        mut hash1: u32,
        key2: K,
        value2: V,
        mut hash2: u32,
        provider: &H,
        mut depth: Depth,
    ) -> Box<Self>
    where
        H: ContinuousHashProvider<K> + ?Sized,
    {
        let mut shared = Vec::new();
        let (index1, index2) = loop {
            let index1 = hash_fragment(hash1, depth.shift_depth());
            let index2 = hash_fragment(hash2, depth.shift_depth());
            if index1 != index2 {
                break (index1, index2);
            }
            shared.push(index1);
            depth = depth.increment();
            hash1 = new_hash(provider, &key1, hash1, depth);
            hash2 = new_hash(provider, &key2, hash2, depth);
        };
        let mut node = Box::new(Self::new());
        node.insert_entry(index1, key1, value1);
        node.insert_entry(index2, key2, value2);
        shared.into_iter().rev().fold(node, |child, index| {
            let mut parent = Box::new(Self::new());
            parent.insert_child(index, Node::Mutable(child));
            parent
        })
    }

    pub(crate) fn get<H>(&self, key: &K, provider: &H, hash: u32, depth: Depth) -> Option<&V>
    where
        H: ContinuousHashProvider<K> + ?Sized,
    {
        let index = hash_fragment(hash, depth.shift_depth());
        match self.slots.get(index)? {
            Slot::Entry(current, value) => (current == key).then_some(value),
            Slot::Child(child) => {
                let depth = depth.increment();
                child.get(key, provider, new_hash(provider, key, hash, depth), depth)
            }
        }
    }

    pub(crate) fn put<H>(
        mut self: Box<Self>,
        key: K,
        value: V,
        provider: &H,
        default: &V,
        hash: u32,
        depth: Depth,
    ) -> (Option<Node<K, V, P>>, Option<V>)
    where
        H: ContinuousHashProvider<K> + ?Sized,
    {
        let index = hash_fragment(hash, depth.shift_depth());
        let removing = value == *default;
        let previous = match self.slots.remove(index) {
            None => {
                if !removing {
                    self.insert_entry(index, key, value);
                }
                None
            }
            Some(Slot::Entry(current, previous)) if current == key => {
                if !removing {
                    self.insert_entry(index, key, value);
                }
                Some(previous)
            }
            Some(Slot::Entry(current, current_value)) => {
                if removing {
                    self.insert_entry(index, current, current_value);
                } else {
                    let depth = depth.increment();
                    let current_hash = round_hash(provider, &current, depth);
                    let hash = new_hash(provider, &key, hash, depth);
                    let child = Self::pair(
                        current,
                        current_value,
                        current_hash,
                        key,
                        value,
                        hash,
                        provider,
                        depth,
                    );
                    self.insert_child(index, Node::Mutable(child));
                }
                None
            }
            Some(Slot::Child(child)) => {
                let depth = depth.increment();
                let hash = new_hash(provider, &key, hash, depth);
                let (child, previous) = child.put(key, value, provider, default, hash, depth);
                match child.map(Node::take_orphan) {
                    Some(Ok((key, value))) => self.insert_entry(index, key, value),
                    Some(Err(child)) => self.insert_child(index, child),
                    None => {}
                }
                previous
            }
        };
        if self.slots.is_empty() {
            (None, previous)
        } else {
            (Some(Node::Mutable(self)), previous)
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Entry(..) => 1,
                Slot::Child(child) => child.size(),
            })
            .sum()
    }

    pub(crate) fn structural_hash(&self) -> u64 {
        let (data_map, node_map) = self.bitmaps();
        let children = self.slots.iter().filter_map(|slot| match slot {
            Slot::Child(child) => Some(child.structural_hash()),
            Slot::Entry(..) => None,
        });
        structural_hash(data_map, node_map, self.entries(), children)
    }

    pub(crate) fn to_immutable(
        &self,
        cache: Option<&NodeCache<K, V, P>>,
    ) -> SharedPointer<ImmutableNode<K, V, P>, P> {
        let mut data_map = Bitmap::new();
        let mut node_map = Bitmap::new();
        let mut entries = Vec::new();
        let mut children = Vec::new();
        for index in self.slots.indices() {
            match &self.slots[index] {
                Slot::Entry(key, value) => {
                    data_map.set(index, true);
                    entries.push((key.clone(), value.clone()));
                }
                Slot::Child(child) => {
                    node_map.set(index, true);
                    children.push(child.to_immutable(cache));
                }
            }
        }
        canonicalize(ImmutableNode::new(data_map, node_map, entries, children), cache)
    }

    pub(crate) fn into_immutable(
        mut self: Box<Self>,
        cache: Option<&NodeCache<K, V, P>>,
    ) -> SharedPointer<ImmutableNode<K, V, P>, P> {
        let mut data_map = Bitmap::new();
        let mut node_map = Bitmap::new();
        let mut entries = Vec::new();
        let mut children = Vec::new();
        while let Some(index) = self.slots.first_index() {
            match self.slots.remove(index) {
                Some(Slot::Entry(key, value)) => {
                    data_map.set(index, true);
                    entries.push((key, value));
                }
                Some(Slot::Child(child)) => {
                    node_map.set(index, true);
                    children.push(child.into_immutable(cache));
                }
                None => break,
            }
        }
        canonicalize(ImmutableNode::new(data_map, node_map, entries, children), cache)
    }

    pub(crate) fn check_integrity<H>(
        &self,
        provider: &H,
        default: &V,
        path: &mut Vec<usize>,
    ) -> Result<()>
    where
        H: ContinuousHashProvider<K> + ?Sized,
    {
        if !path.is_empty() {
            if self.slots.is_empty() {
                return Err(Error::integrity("empty node below the root"));
            }
            if self.is_orphan() {
                return Err(Error::integrity("single entry node below the root"));
            }
        }
        for index in self.slots.indices() {
            path.push(index);
            match &self.slots[index] {
                Slot::Entry(key, value) => {
                    if value == default {
                        return Err(Error::integrity("default value stored as an entry"));
                    }
                    check_placement(provider, key, path)?;
                }
                Slot::Child(child) => child.check_integrity(provider, default, path)?,
            }
            path.pop();
        }
        Ok(())
    }
}

impl<K: PartialEq, V: PartialEq, P: SharedPointerKind> PartialEq for MutableNode<K, V, P> {
    fn eq(&self, other: &Self) -> bool {
        self.slots.len() == other.slots.len()
            && self.slots.indices().all(|index| {
                match (&self.slots[index], other.slots.get(index)) {
                    (Slot::Entry(k1, v1), Some(Slot::Entry(k2, v2))) => k1 == k2 && v1 == v2,
                    (Slot::Child(left), Some(Slot::Child(right))) => left == right,
                    _ => false,
                }
            })
    }
}

impl<K: PartialEq, V: PartialEq, P: SharedPointerKind> PartialEq<ImmutableNode<K, V, P>>
    for MutableNode<K, V, P>
{
    fn eq(&self, other: &ImmutableNode<K, V, P>) -> bool {
        self.slots.len() == other.slot_count()
            && self.slots.indices().all(|index| {
                match (&self.slots[index], other.slot(index)) {
                    (Slot::Entry(k1, v1), Some(SlotRef::Entry(k2, v2))) => k1 == k2 && v1 == v2,
                    (Slot::Child(left), Some(SlotRef::Child(right))) => left.eq_immutable(right),
                    _ => false,
                }
            })
    }
}

impl<K: fmt::Debug, V: fmt::Debug, P: SharedPointerKind> fmt::Debug for MutableNode<K, V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mutable[ ")?;
        for i in self.slots.indices() {
            write!(f, "{}: ", i)?;
            match &self.slots[i] {
                Slot::Entry(k, v) => write!(f, "{:?} => {:?}, ", k, v)?,
                Slot::Child(n) => write!(f, "{:?}, ", n)?,
            }
        }
        write!(f, " ]")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::FRAGMENTS_PER_ROUND;
    use archery::ArcK;

    type Root = Node<u32, i32, ArcK>;

    // Key bits are the slots, fragment by fragment.
    fn identity(key: &u32, round: u32) -> u32 {
        key.rotate_left(round)
    }

    fn put(root: Option<Root>, key: u32, value: i32) -> (Option<Root>, Option<i32>) {
        let root = root.unwrap_or_else(|| Node::Mutable(Box::new(MutableNode::new())));
        root.put(key, value, &identity, &0, identity(&key, 0), Depth::ROOT)
    }

    fn get(root: &Option<Root>, key: u32) -> Option<i32> {
        root.as_ref()
            .and_then(|root| root.get(&key, &identity, identity(&key, 0), Depth::ROOT))
            .copied()
    }

    fn check(root: &Option<Root>) {
        if let Some(root) = root {
            root.check_integrity(&identity, &0, &mut Vec::new()).unwrap();
        }
    }

    #[test]
    fn insert_and_overwrite() {
        let (root, old) = put(None, 3, 30);
        assert_eq!(None, old);
        let (root, old) = put(root, 3, 31);
        assert_eq!(Some(30), old);
        assert_eq!(Some(31), get(&root, 3));
        assert_eq!(None, get(&root, 4));
        check(&root);
    }

    #[test]
    fn split_then_collapse() {
        // Same first fragment, different second fragment.
        let a = 0b00001_00011;
        let b = 0b00010_00011;
        let (root, _) = put(None, a, 1);
        let (root, _) = put(root, b, 2);
        match &root {
            Some(Node::Mutable(node)) => {
                assert_eq!(1, node.slots().len());
                assert!(matches!(node.slots().get(3), Some(Slot::Child(_))));
            }
            other => panic!("unexpected root {:?}", other),
        }
        assert_eq!(2, root.as_ref().map_or(0, Node::size));
        check(&root);

        // Removing one key pulls the other back into the root.
        let (root, old) = put(root, b, 0);
        assert_eq!(Some(2), old);
        match &root {
            Some(Node::Mutable(node)) => {
                assert!(matches!(node.slots().get(3), Some(Slot::Entry(k, 1)) if *k == a));
            }
            other => panic!("unexpected root {:?}", other),
        }
        check(&root);

        let (root, old) = put(root, a, 0);
        assert_eq!(Some(1), old);
        assert!(root.is_none());
    }

    #[test]
    fn deep_chain_is_built_and_removed() {
        // Agree on four fragments before diverging.
        let a = 0b00001_00111_00111_00111_00111;
        let b = 0b00010_00111_00111_00111_00111;
        let c = 0b00111;
        let mut root = None;
        for (key, value) in [(a, 1), (b, 2), (c, 3)] {
            root = put(root, key, value).0;
        }
        check(&root);
        assert_eq!(Some(1), get(&root, a));
        assert_eq!(Some(2), get(&root, b));
        assert_eq!(Some(3), get(&root, c));
        root = put(root, a, 0).0;
        root = put(root, b, 0).0;
        check(&root);
        assert_eq!(1, root.as_ref().map_or(0, Node::size));
        assert_eq!(Some(3), get(&root, c));
    }

    #[test]
    fn collisions_spanning_rounds_build_a_chain() {
        // Identical for two whole rounds, told apart by the third.
        let provider = |key: &u32, round: u32| if round < 2 { 0 } else { *key };
        let mut root: Option<Root> = None;
        for (key, value) in [(1, 10), (2, 20)] {
            let node = root.unwrap_or_else(|| Node::Mutable(Box::new(MutableNode::new())));
            root = node.put(key, value, &provider, &0, provider(&key, 0), Depth::ROOT).0;
        }
        let root = root.unwrap();
        root.check_integrity(&provider, &0, &mut Vec::new()).unwrap();
        assert_eq!(Some(&10), root.get(&1, &provider, provider(&1, 0), Depth::ROOT));
        assert_eq!(Some(&20), root.get(&2, &provider, provider(&2, 0), Depth::ROOT));

        let mut levels = 0;
        let mut node = &root;
        while let Node::Mutable(inner) = node {
            match inner.slots().get(0) {
                Some(Slot::Child(child)) if inner.slots().len() == 1 => {
                    levels += 1;
                    node = child;
                }
                _ => break,
            }
        }
        assert_eq!(2 * FRAGMENTS_PER_ROUND as usize, levels);
        assert_eq!(2, node.size());
    }

    #[test]
    fn default_for_absent_key_changes_nothing() {
        let (root, _) = put(None, 1, 10);
        let before = root.clone();
        let (root, old) = put(root, 2, 0);
        assert_eq!(None, old);
        assert_eq!(before, root);
    }

    #[test]
    fn freezing_twice_gives_the_same_node() {
        let cache = NodeCache::new(true);
        let mut root = None;
        for key in 0..100u32 {
            root = put(root, key.wrapping_mul(2_654_435_761), key as i32 + 1).0;
        }
        let root = root.unwrap();
        let frozen = root.to_immutable(Some(&cache));
        let refrozen = Node::Immutable(frozen.clone()).into_immutable(Some(&cache));
        assert!(SharedPointer::ptr_eq(&frozen, &refrozen));

        // Equal content frozen again through the cache lands on the same node.
        let thawed = ImmutableNode::into_mutable(frozen.clone());
        assert!(SharedPointer::ptr_eq(&frozen, &thawed.into_immutable(Some(&cache))));
        assert!(SharedPointer::ptr_eq(&frozen, &root.into_immutable(Some(&cache))));
    }

    #[test]
    fn hash_agrees_with_frozen_form() {
        let mut root = None;
        for key in 0..200u32 {
            root = put(root, key.wrapping_mul(2_654_435_761), key as i32 + 1).0;
        }
        let root = root.unwrap();
        let frozen = root.to_immutable(None);
        assert_eq!(root.structural_hash(), frozen.structural_hash());
        assert!(root.eq_immutable(&frozen));
        assert_eq!(root, Node::Immutable(frozen));
    }
}
