// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;
use std::fmt::{Debug, Error, Formatter};

use archery::{SharedPointer, SharedPointerKind};

use crate::error::{self, Result};
use crate::nodes::immutable::{ImmutableNode, SlotRef};
use crate::shared_ptr::DefaultSharedPtr;

use super::{depends_on, is_dirty, Cursor, ModificationTracker, Observation, Progress};

struct Frame<K, V, P: SharedPointerKind> {
    node: SharedPointer<ImmutableNode<K, V, P>, P>,
    // The slot last visited in this node.
    position: Option<usize>,
}

impl<K, V, P: SharedPointerKind> Clone for Frame<K, V, P> {
    fn clone(&self) -> Self {
        Frame {
            node: self.node.clone(),
            position: self.position,
        }
    }
}

/// A cursor over a frozen trie in slot order.
///
/// Entries and children of a node are visited interleaved, by ascending
/// slot index, so the cursor's position is a path of slot indices from the
/// root. Two such cursors over tries built with the same hash provider can
/// be compared by position, which is what makes
/// [`MapDiffCursor`][super::MapDiffCursor] possible, and can skip a shared
/// subtree in one step.
pub struct InOrderMapCursor<K, V, P: SharedPointerKind = DefaultSharedPtr> {
    stack: Vec<Frame<K, V, P>>,
    progress: Progress,
    observation: Option<Observation>,
    // Entries landed on so far.
    visited: usize,
}

impl<K, V, P: SharedPointerKind> Clone for InOrderMapCursor<K, V, P> {
    fn clone(&self) -> Self {
        InOrderMapCursor {
            stack: self.stack.clone(),
            progress: self.progress,
            observation: self.observation.clone(),
            visited: self.visited,
        }
    }
}

impl<K, V, P: SharedPointerKind> InOrderMapCursor<K, V, P> {
    pub(crate) fn new(
        root: Option<SharedPointer<ImmutableNode<K, V, P>, P>>,
        observation: Option<Observation>,
    ) -> Self {
        InOrderMapCursor {
            stack: root
                .map(|node| Frame {
                    node,
                    position: None,
                })
                .into_iter()
                .collect(),
            progress: Progress::Fresh,
            observation,
            visited: 0,
        }
    }

    /// The current key and value, if the cursor is on an entry.
    pub fn entry(&self) -> Option<(&K, &V)> {
        if self.progress != Progress::Moving {
            return None;
        }
        let frame = self.stack.last()?;
        match frame.node.slot(frame.position?)? {
            SlotRef::Entry(key, value) => Some((key, value)),
            SlotRef::Child(_) => None,
        }
    }

    /// Leave the node holding the current entry without visiting the rest
    /// of it, and move on to the entry after that node.
    ///
    /// Returns `Ok(false)` if that was the last node, as
    /// [`move_next`][Cursor::move_next] would.
    pub fn skip_current_node(&mut self) -> Result<bool> {
        self.check_movable()?;
        if self.progress == Progress::Fresh {
            return Err(error::Error::IllegalCursorState {
                reason: "skipped a node before the first entry",
            });
        }
        self.stack.pop();
        Ok(self.settle())
    }

    /// Test whether two moving cursors are inside the very same shared
    /// node at the same path.
    pub fn same_sub_node(cursor1: &Self, cursor2: &Self) -> bool {
        match (cursor1.stack.last(), cursor2.stack.last()) {
            (Some(top1), Some(top2)) => {
                SharedPointer::ptr_eq(&top1.node, &top2.node)
                    && cursor1.stack.len() == cursor2.stack.len()
                    && cursor1
                        .stack
                        .iter()
                        .zip(cursor2.stack.iter())
                        .rev()
                        .skip(1)
                        .all(|(frame1, frame2)| frame1.position == frame2.position)
            }
            _ => false,
        }
    }

    /// How many entries the cursor has stopped on. Entries passed over by
    /// [`skip_current_node`][Self::skip_current_node] aren't counted.
    #[cfg(test)]
    pub(crate) fn visited(&self) -> usize {
        self.visited
    }

    /// Compare the paths of two cursors over their common length.
    ///
    /// `Greater` means `cursor1` is ahead of `cursor2` in slot order.
    /// `Equal` means one path is a prefix of the other, which for cursors
    /// on entries happens when both sit in the same slot at the same level
    /// or one sits above the other's subtree.
    pub fn compare_position(cursor1: &Self, cursor2: &Self) -> Ordering {
        cursor1
            .stack
            .iter()
            .zip(cursor2.stack.iter())
            .map(|(frame1, frame2)| frame1.position.cmp(&frame2.position))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Compare how deep in their tries two cursors are. `Greater` means
    /// `cursor1` is deeper.
    pub fn compare_depth(cursor1: &Self, cursor2: &Self) -> Ordering {
        cursor1.stack.len().cmp(&cursor2.stack.len())
    }

    fn check_movable(&self) -> Result<()> {
        if self.is_dirty() {
            return Err(error::Error::ConcurrentModification);
        }
        if self.progress == Progress::Terminated {
            return Err(error::Error::IllegalCursorState {
                reason: "moved a terminated cursor",
            });
        }
        Ok(())
    }

    // Advance to the next entry, descending into children on the way.
    fn advance(&mut self) -> bool {
        while let Some(frame) = self.stack.last_mut() {
            let from = frame.position.map_or(0, |index| index + 1);
            let next = frame.node.next_slot(from).map(|(index, slot)| match slot {
                SlotRef::Entry(..) => (index, None),
                SlotRef::Child(child) => (index, Some(child.clone())),
            });
            match next {
                Some((index, None)) => {
                    frame.position = Some(index);
                    self.visited += 1;
                    return true;
                }
                Some((index, Some(child))) => {
                    frame.position = Some(index);
                    self.stack.push(Frame {
                        node: child,
                        position: None,
                    });
                }
                None => {
                    self.stack.pop();
                }
            }
        }
        false
    }

    fn settle(&mut self) -> bool {
        let moved = self.advance();
        self.progress = if moved {
            Progress::Moving
        } else {
            Progress::Terminated
        };
        moved
    }
}

impl<K, V, P: SharedPointerKind> Cursor<K, V> for InOrderMapCursor<K, V, P> {
    fn move_next(&mut self) -> Result<bool> {
        self.check_movable()?;
        Ok(self.settle())
    }

    fn key(&self) -> Option<&K> {
        self.entry().map(|(key, _)| key)
    }

    fn value(&self) -> Option<&V> {
        self.entry().map(|(_, value)| value)
    }

    fn is_terminated(&self) -> bool {
        self.progress == Progress::Terminated
    }

    fn is_dirty(&self) -> bool {
        is_dirty(&self.observation)
    }

    fn depends_on(&self, tracker: &ModificationTracker) -> bool {
        depends_on(&self.observation, tracker)
    }
}

impl<K, V, P: SharedPointerKind> Debug for InOrderMapCursor<K, V, P>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        let path: Vec<Option<usize>> = self.stack.iter().map(|frame| frame.position).collect();
        f.debug_struct("InOrderMapCursor")
            .field("path", &path)
            .field("progress", &self.progress)
            .field("entry", &self.entry())
            .field("visited", &self.visited)
            .finish()
    }
}
