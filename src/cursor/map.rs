// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt::{Debug, Error, Formatter};

use archery::{SharedPointer, SharedPointerKind};

use crate::error::{self, Result};
use crate::nodes::immutable::ImmutableNode;
use crate::shared_ptr::DefaultSharedPtr;

use super::{depends_on, is_dirty, Cursor, ModificationTracker, Observation, Progress};

struct Frame<K, V, P: SharedPointerKind> {
    node: SharedPointer<ImmutableNode<K, V, P>, P>,
    // Entries and children already handed out.
    entries: usize,
    children: usize,
}

impl<K, V, P: SharedPointerKind> Clone for Frame<K, V, P> {
    fn clone(&self) -> Self {
        Frame {
            node: self.node.clone(),
            entries: self.entries,
            children: self.children,
        }
    }
}

/// A pre-order cursor over a frozen trie.
///
/// Each node yields its own entries first, then descends into its children
/// in slot order. This is the cheapest walk of a whole version; use an
/// [`InOrderMapCursor`][super::InOrderMapCursor] when two tries need to be
/// walked side by side.
pub struct MapCursor<K, V, P: SharedPointerKind = DefaultSharedPtr> {
    stack: Vec<Frame<K, V, P>>,
    progress: Progress,
    observation: Option<Observation>,
}

impl<K, V, P: SharedPointerKind> Clone for MapCursor<K, V, P> {
    fn clone(&self) -> Self {
        MapCursor {
            stack: self.stack.clone(),
            progress: self.progress,
            observation: self.observation.clone(),
        }
    }
}

impl<K, V, P: SharedPointerKind> MapCursor<K, V, P> {
    pub(crate) fn new(
        root: Option<SharedPointer<ImmutableNode<K, V, P>, P>>,
        observation: Option<Observation>,
    ) -> Self {
        MapCursor {
            stack: root
                .map(|node| Frame {
                    node,
                    entries: 0,
                    children: 0,
                })
                .into_iter()
                .collect(),
            progress: Progress::Fresh,
            observation,
        }
    }

    /// The current key and value, if the cursor is on an entry.
    pub fn entry(&self) -> Option<(&K, &V)> {
        if self.progress != Progress::Moving {
            return None;
        }
        let frame = self.stack.last()?;
        let (key, value) = frame.node.entries().get(frame.entries.checked_sub(1)?)?;
        Some((key, value))
    }

    fn advance(&mut self) -> bool {
        while let Some(frame) = self.stack.last_mut() {
            if frame.entries < frame.node.entries().len() {
                frame.entries += 1;
                return true;
            }
            match frame.node.children().get(frame.children).cloned() {
                Some(child) => {
                    frame.children += 1;
                    self.stack.push(Frame {
                        node: child,
                        entries: 0,
                        children: 0,
                    });
                }
                None => {
                    self.stack.pop();
                }
            }
        }
        false
    }
}

impl<K, V, P: SharedPointerKind> Cursor<K, V> for MapCursor<K, V, P> {
    fn move_next(&mut self) -> Result<bool> {
        if self.is_dirty() {
            return Err(error::Error::ConcurrentModification);
        }
        if self.progress == Progress::Terminated {
            return Err(error::Error::IllegalCursorState {
                reason: "moved a terminated cursor",
            });
        }
        if self.advance() {
            self.progress = Progress::Moving;
            Ok(true)
        } else {
            self.progress = Progress::Terminated;
            Ok(false)
        }
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

impl<K, V, P: SharedPointerKind> Debug for MapCursor<K, V, P>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        f.debug_struct("MapCursor")
            .field("depth", &self.stack.len())
            .field("progress", &self.progress)
            .field("entry", &self.entry())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nodes::mutable::MutableNode;
    use crate::nodes::{Depth, Node};
    use archery::ArcK;
    use std::collections::HashSet;

    fn frozen(keys: &[u32]) -> SharedPointer<ImmutableNode<u32, u32, ArcK>, ArcK> {
        // Only the first round is used, so keys may share long prefixes.
        let provider = |key: &u32, round: u32| key.rotate_right(round);
        let mut root = Node::Mutable(Box::new(MutableNode::new()));
        for &key in keys {
            root = root
                .put(key, key + 1, &provider, &0, key, Depth::ROOT)
                .0
                .unwrap();
        }
        root.into_immutable(None)
    }

    fn drain(cursor: &mut MapCursor<u32, u32, ArcK>) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        while cursor.move_next().unwrap() {
            let (k, v) = cursor.entry().unwrap();
            out.push((*k, *v));
        }
        out
    }

    #[test]
    fn node_entries_come_before_children() {
        // 1 and 33 share the first slot and go one level down; 2 stays up.
        let mut cursor = MapCursor::new(Some(frozen(&[1, 33, 2])), None);
        assert_eq!(None, cursor.key());
        assert_eq!(vec![(2, 3), (1, 2), (33, 34)], drain(&mut cursor));
        assert!(cursor.is_terminated());
        assert_eq!(None, cursor.value());
    }

    #[test]
    fn visits_everything() {
        let keys: Vec<u32> = (0..2000).map(|i| i * 7919).collect();
        let mut cursor = MapCursor::new(Some(frozen(&keys)), None);
        let seen: HashSet<u32> = drain(&mut cursor).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys.into_iter().collect::<HashSet<_>>(), seen);
    }

    #[test]
    fn empty_terminates_at_once() {
        let mut cursor = MapCursor::<u32, u32, ArcK>::new(None, None);
        assert!(!cursor.is_terminated());
        assert_eq!(Ok(false), cursor.move_next());
        assert!(cursor.is_terminated());
        assert!(matches!(
            cursor.move_next(),
            Err(error::Error::IllegalCursorState { .. })
        ));
    }

    #[test]
    fn writes_make_it_dirty() {
        let tracker = ModificationTracker::new();
        let mut cursor = MapCursor::new(Some(frozen(&[1, 2, 3])), Some(tracker.observe()));
        assert!(cursor.depends_on(&tracker));
        assert_eq!(Ok(true), cursor.move_next());
        tracker.record();
        assert!(cursor.is_dirty());
        assert_eq!(Err(error::Error::ConcurrentModification), cursor.move_next());
    }
}
