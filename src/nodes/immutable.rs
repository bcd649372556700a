// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::hash::Hash;

use archery::{SharedPointer, SharedPointerKind};

use crate::config::BRANCHING_FACTOR;
use crate::error::{Error, Result};
use crate::hash_provider::ContinuousHashProvider;
use crate::util::take_or_else;

use super::mutable::MutableNode;
use super::{check_placement, hash_fragment, indices, new_hash, rank, structural_hash, Bitmap, Depth, Node};

/// A borrowed view of one occupied slot of an [`ImmutableNode`].
pub(crate) enum SlotRef<'a, K, V, P: SharedPointerKind> {
    Entry(&'a K, &'a V),
    Child(&'a SharedPointer<ImmutableNode<K, V, P>, P>),
}

/// A frozen node.
///
/// `data_map` marks the slots holding an entry and `node_map` the slots
/// holding a child. Entries and children are stored densely, each in
/// ascending slot order, so a slot's position is the rank of its bit in
/// the matching bitmap.
///
/// The structural hash is computed once, on construction.
pub(crate) struct ImmutableNode<K, V, P: SharedPointerKind> {
    data_map: Bitmap,
    node_map: Bitmap,
    entries: Box<[(K, V)]>,
    children: Box<[SharedPointer<ImmutableNode<K, V, P>, P>]>,
    hash: u64,
}

impl<K, V, P: SharedPointerKind> ImmutableNode<K, V, P> {
    #[inline]
    pub(crate) fn structural_hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    pub(crate) fn entries(&self) -> &[(K, V)] {
        &self.entries
    }

    #[inline]
    pub(crate) fn children(&self) -> &[SharedPointer<ImmutableNode<K, V, P>, P>] {
        &self.children
    }

    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        self.entries.len() + self.children.len()
    }

    /// Look at the slot `index`, if it's occupied.
    pub(crate) fn slot(&self, index: usize) -> Option<SlotRef<'_, K, V, P>> {
        if self.data_map.get(index) {
            let (key, value) = &self.entries[rank(self.data_map, index)];
            Some(SlotRef::Entry(key, value))
        } else if self.node_map.get(index) {
            Some(SlotRef::Child(&self.children[rank(self.node_map, index)]))
        } else {
            None
        }
    }

    /// Find the first occupied slot at or after `from`.
    pub(crate) fn next_slot(&self, from: usize) -> Option<(usize, SlotRef<'_, K, V, P>)> {
        if from >= BRANCHING_FACTOR {
            return None;
        }
        let occupied = (self.data_map.into_value() | self.node_map.into_value()) & (u32::MAX << from);
        if occupied == 0 {
            return None;
        }
        let index = occupied.trailing_zeros() as usize;
        self.slot(index).map(|slot| (index, slot))
    }
}

impl<K, V, P> ImmutableNode<K, V, P>
where
    K: Hash + Eq + Clone,
    V: Hash + Eq + Clone,
    P: SharedPointerKind,
{
    pub(crate) fn new(
        data_map: Bitmap,
        node_map: Bitmap,
        entries: Vec<(K, V)>,
        children: Vec<SharedPointer<ImmutableNode<K, V, P>, P>>,
    ) -> Self {
        debug_assert_eq!(data_map.len(), entries.len());
        debug_assert_eq!(node_map.len(), children.len());
        let hash = structural_hash(
            data_map,
            node_map,
            entries.iter().map(|(key, value)| (key, value)),
            children.iter().map(|child| child.hash),
        );
        ImmutableNode {
            data_map,
            node_map,
            entries: entries.into_boxed_slice(),
            children: children.into_boxed_slice(),
            hash,
        }
    }

    /// Thaw a frozen node for writing. The node's entries are moved out when
    /// nothing else holds it, and cloned otherwise. Children stay frozen.
    pub(crate) fn into_mutable(this: SharedPointer<Self, P>) -> Box<MutableNode<K, V, P>> {
        take_or_else(
            this,
            |node| {
                let mut result = Box::new(MutableNode::new());
                for (index, (key, value)) in indices(node.data_map).zip(node.entries.into_vec()) {
                    result.insert_entry(index, key, value);
                }
                for (index, child) in indices(node.node_map).zip(node.children.into_vec()) {
                    result.insert_child(index, Node::Immutable(child));
                }
                result
            },
            |node| {
                let mut result = Box::new(MutableNode::new());
                for (index, (key, value)) in indices(node.data_map).zip(node.entries.iter()) {
                    result.insert_entry(index, key.clone(), value.clone());
                }
                for (index, child) in indices(node.node_map).zip(node.children.iter()) {
                    result.insert_child(index, Node::Immutable(child.clone()));
                }
                result
            },
        )
    }

    pub(crate) fn get<H>(&self, key: &K, provider: &H, hash: u32, depth: Depth) -> Option<&V>
    where
        H: ContinuousHashProvider<K> + ?Sized,
    {
        match self.slot(hash_fragment(hash, depth.shift_depth()))? {
            SlotRef::Entry(current, value) => (current == key).then_some(value),
            SlotRef::Child(child) => {
                let depth = depth.increment();
                child.get(key, provider, new_hash(provider, key, hash, depth), depth)
            }
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.entries.len() + self.children.iter().map(|child| child.size()).sum::<usize>()
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
        if self.data_map.into_value() & self.node_map.into_value() != 0 {
            return Err(Error::integrity("slot marked as both entry and child"));
        }
        if self.data_map.len() != self.entries.len() || self.node_map.len() != self.children.len() {
            return Err(Error::integrity("bitmaps disagree with the stored slots"));
        }
        if !path.is_empty() {
            if self.slot_count() == 0 {
                return Err(Error::integrity("empty node below the root"));
            }
            if self.entries.len() == 1 && self.children.is_empty() {
                return Err(Error::integrity("single entry node below the root"));
            }
        }
        let expected = structural_hash(
            self.data_map,
            self.node_map,
            self.entries.iter().map(|(key, value)| (key, value)),
            self.children.iter().map(|child| child.hash),
        );
        if expected != self.hash {
            return Err(Error::integrity("cached structural hash is stale"));
        }
        for (index, (key, value)) in indices(self.data_map).zip(self.entries.iter()) {
            if value == default {
                return Err(Error::integrity("default value stored as an entry"));
            }
            path.push(index);
            check_placement(provider, key, path)?;
            path.pop();
        }
        for (index, child) in indices(self.node_map).zip(self.children.iter()) {
            path.push(index);
            child.check_integrity(provider, default, path)?;
            path.pop();
        }
        Ok(())
    }
}

impl<K: PartialEq, V: PartialEq, P: SharedPointerKind> PartialEq for ImmutableNode<K, V, P> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.data_map == other.data_map
            && self.node_map == other.node_map
            && self.entries == other.entries
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(left, right)| SharedPointer::ptr_eq(left, right) || **left == **right)
    }
}

impl<K: PartialEq, V: PartialEq, P: SharedPointerKind> PartialEq<MutableNode<K, V, P>>
    for ImmutableNode<K, V, P>
{
    fn eq(&self, other: &MutableNode<K, V, P>) -> bool {
        other == self
    }
}

impl<K: Eq, V: Eq, P: SharedPointerKind> Eq for ImmutableNode<K, V, P> {}

impl<K: fmt::Debug, V: fmt::Debug, P: SharedPointerKind> fmt::Debug for ImmutableNode<K, V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Immutable#{:016x}[ ", self.hash)?;
        for i in indices(Bitmap::from_value(
            self.data_map.into_value() | self.node_map.into_value(),
        )) {
            write!(f, "{}: ", i)?;
            match self.slot(i) {
                Some(SlotRef::Entry(k, v)) => write!(f, "{:?} => {:?}, ", k, v)?,
                Some(SlotRef::Child(n)) => write!(f, "{:?}, ", &**n)?,
                None => {}
            }
        }
        write!(f, " ]")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use archery::ArcK;

    type Frozen = ImmutableNode<u32, i32, ArcK>;

    fn leaf(entries: &[(usize, u32, i32)]) -> Frozen {
        let mut data_map = Bitmap::new();
        let mut list = Vec::new();
        for &(index, key, value) in entries {
            data_map.set(index, true);
            list.push((key, value));
        }
        ImmutableNode::new(data_map, Bitmap::new(), list, Vec::new())
    }

    #[test]
    fn slots_by_rank() {
        let node = leaf(&[(2, 2, 20), (9, 9, 90), (30, 30, 300)]);
        assert!(matches!(node.slot(9), Some(SlotRef::Entry(9, 90))));
        assert!(node.slot(3).is_none());
        assert_eq!(Some(9), node.next_slot(3).map(|(index, _)| index));
        assert_eq!(Some(30), node.next_slot(30).map(|(index, _)| index));
        assert!(node.next_slot(31).is_none());
        assert!(node.next_slot(BRANCHING_FACTOR).is_none());
    }

    #[test]
    fn children_follow_entries_by_slot() {
        let child = SharedPointer::<_, ArcK>::new(leaf(&[(0, 32, 1), (1, 64, 2)]));
        let mut data_map = Bitmap::new();
        data_map.set(5, true);
        let mut node_map = Bitmap::new();
        node_map.set(0, true);
        let node = ImmutableNode::new(data_map, node_map, vec![(5, 50)], vec![child.clone()]);
        assert_eq!(3, node.size());
        match node.slot(0) {
            Some(SlotRef::Child(found)) => assert!(SharedPointer::ptr_eq(found, &child)),
            _ => panic!("expected a child in slot 0"),
        }
    }

    #[test]
    fn equal_content_equal_hash() {
        let a = leaf(&[(1, 1, 10), (2, 2, 20)]);
        let b = leaf(&[(1, 1, 10), (2, 2, 20)]);
        let c = leaf(&[(1, 1, 10), (2, 2, 21)]);
        assert_eq!(a.structural_hash(), b.structural_hash());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn thaw_moves_or_clones() {
        let shared = SharedPointer::<_, ArcK>::new(leaf(&[(1, 1, 10), (2, 2, 20)]));
        let keep = shared.clone();
        let thawed = ImmutableNode::into_mutable(shared);
        assert_eq!(*thawed, *keep);
        let thawed = ImmutableNode::into_mutable(keep);
        assert_eq!(2, thawed.size());
    }

    #[test]
    fn integrity_catches_misplaced_keys() {
        let provider = |key: &u32, _: u32| *key;
        let good = leaf(&[(1, 1, 10), (2, 2, 20)]);
        assert!(good.check_integrity(&provider, &0, &mut Vec::new()).is_ok());
        let misplaced = leaf(&[(1, 7, 10), (2, 2, 20)]);
        assert!(misplaced.check_integrity(&provider, &0, &mut Vec::new()).is_err());
        let defaulted = leaf(&[(1, 1, 0), (2, 2, 20)]);
        assert!(defaulted.check_integrity(&provider, &0, &mut Vec::new()).is_err());
    }
}
