// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::iter::FusedIterator;
use std::slice::Iter as SliceIter;

use archery::{SharedPointer, SharedPointerKind};
use imbl_sized_chunks::sparse_chunk::Iter as ChunkIter;

use crate::config::BRANCHING_FACTOR;

use super::immutable::ImmutableNode;
use super::mutable::Slot;
use super::Node;

enum Level<'a, K, V, P: SharedPointerKind> {
    Mutable(ChunkIter<'a, Slot<K, V, P>, BRANCHING_FACTOR>),
    Immutable(
        SliceIter<'a, (K, V)>,
        SliceIter<'a, SharedPointer<ImmutableNode<K, V, P>, P>>,
    ),
}

impl<'a, K, V, P: SharedPointerKind> Level<'a, K, V, P> {
    fn of(node: &'a Node<K, V, P>) -> Self {
        match node {
            Node::Mutable(node) => Level::Mutable(node.slots().iter()),
            Node::Immutable(node) => Self::frozen(node),
        }
    }

    fn frozen(node: &'a ImmutableNode<K, V, P>) -> Self {
        Level::Immutable(node.entries().iter(), node.children().iter())
    }
}

impl<'a, K, V, P: SharedPointerKind> Clone for Level<'a, K, V, P> {
    fn clone(&self) -> Self {
        match self {
            Level::Mutable(slots) => Level::Mutable(slots.clone()),
            Level::Immutable(entries, children) => {
                Level::Immutable(entries.clone(), children.clone())
            }
        }
    }
}

/// A borrowing iterator over the entries of a trie of either node kind.
///
/// Entries come out in trie order, which is stable for a given content
/// and hash provider but otherwise arbitrary.
pub(crate) struct Iter<'a, K, V, P: SharedPointerKind> {
    stack: Vec<Level<'a, K, V, P>>,
}

// We impl Clone instead of deriving it, because we want Clone even if K and V aren't.
impl<'a, K, V, P: SharedPointerKind> Clone for Iter<'a, K, V, P> {
    fn clone(&self) -> Self {
        Iter {
            stack: self.stack.clone(),
        }
    }
}

impl<'a, K, V, P: SharedPointerKind> Iter<'a, K, V, P> {
    pub(crate) fn new(root: Option<&'a Node<K, V, P>>) -> Self {
        Iter {
            stack: root.map(Level::of).into_iter().collect(),
        }
    }

    pub(crate) fn frozen(root: Option<&'a ImmutableNode<K, V, P>>) -> Self {
        Iter {
            stack: root.map(Level::frozen).into_iter().collect(),
        }
    }
}

impl<'a, K, V, P: SharedPointerKind> Iterator for Iter<'a, K, V, P> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.last_mut() {
            match current {
                Level::Mutable(slots) => match slots.next() {
                    Some(Slot::Entry(key, value)) => return Some((key, value)),
                    Some(Slot::Child(child)) => self.stack.push(Level::of(child)),
                    None => {
                        self.stack.pop();
                    }
                },
                Level::Immutable(entries, children) => {
                    if let Some((key, value)) = entries.next() {
                        return Some((key, value));
                    }
                    match children.next() {
                        Some(child) => self.stack.push(Level::frozen(child)),
                        None => {
                            self.stack.pop();
                        }
                    }
                }
            }
        }
        None
    }
}

impl<'a, K, V, P: SharedPointerKind> FusedIterator for Iter<'a, K, V, P> {}
