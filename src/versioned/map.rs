// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt::{self, Debug, Formatter, Write};
use std::hash::Hash;

use archery::SharedPointerKind;
use tracing::trace;

use crate::cursor::{Cursor, InOrderMapCursor, MapCursor, MapDiffCursor, ModificationTracker};
use crate::error::Result;
use crate::hash_provider::{ContinuousHashProvider, DefaultHashProvider};
use crate::nodes::iter::Iter as NodeIter;
use crate::nodes::mutable::MutableNode;
use crate::nodes::{Depth, Node};
use crate::shared_ptr::DefaultSharedPtr;

use super::{GenericVersionedMapStore, Iter, Version};

/// Type alias for [`GenericVersionedMap`] that uses [`DefaultSharedPtr`] as
/// the pointer type.
///
/// [GenericVersionedMap]: ./struct.GenericVersionedMap.html
/// [DefaultSharedPtr]: ../shared_ptr/type.DefaultSharedPtr.html
pub type VersionedMap<K, V, H = DefaultHashProvider> = GenericVersionedMap<K, V, H, DefaultSharedPtr>;

/// A writable map whose content can be committed as a [`Version`].
///
/// The map keeps a working trie. Paths written since the last commit are
/// plain mutable nodes edited in place; everything else is frozen and
/// shared with earlier versions, and is only copied, one node at a time,
/// along the path of a write.
///
/// Maps are created by a [`GenericVersionedMapStore`], and keys that are not
/// present read as that store's default value.
pub struct GenericVersionedMap<K, V, H, P: SharedPointerKind> {
    store: GenericVersionedMapStore<K, V, H, P>,
    root: Option<Node<K, V, P>>,
    tracker: ModificationTracker,
}

impl<K, V, H, P: SharedPointerKind> GenericVersionedMap<K, V, H, P> {
    pub(crate) fn new(store: GenericVersionedMapStore<K, V, H, P>, root: Option<Node<K, V, P>>) -> Self {
        GenericVersionedMap {
            store,
            root,
            tracker: ModificationTracker::new(),
        }
    }

    /// Test whether the map holds no entries.
    ///
    /// Time: O(1)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Get the store this map was created by.
    #[must_use]
    pub fn store(&self) -> &GenericVersionedMapStore<K, V, H, P> {
        &self.store
    }

    /// Get the tracker counting writes to this map. Cursors created from the
    /// map [depend on][Cursor::depends_on] it.
    #[must_use]
    pub fn tracker(&self) -> &ModificationTracker {
        &self.tracker
    }

    /// Iterate over the entries of the map.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V, P> {
        Iter {
            it: NodeIter::new(self.root.as_ref()),
        }
    }
}

impl<K, V, H, P> GenericVersionedMap<K, V, H, P>
where
    K: Hash + Eq + Clone,
    V: Hash + Eq + Clone,
    H: ContinuousHashProvider<K> + Clone,
    P: SharedPointerKind,
{
    /// Get the value for a key, or the store's default value if the key is
    /// absent.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn get(&self, key: &K) -> &V {
        let provider = self.store.hash_provider();
        self.root
            .as_ref()
            .and_then(|root| root.get(key, provider, provider.hash(key, 0), Depth::ROOT))
            .unwrap_or_else(|| self.store.default_value())
    }

    /// Test whether a key holds a value other than the default.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key) != self.store.default_value()
    }

    /// Set the value for a key, returning the value it held before. Writing
    /// the store's default value removes the key.
    ///
    /// Writing the default value to an absent key changes nothing, and
    /// doesn't disturb cursors.
    ///
    /// Time: O(log n)
    pub fn put(&mut self, key: K, value: V) -> V {
        let provider = self.store.hash_provider();
        let default = self.store.default_value();
        let removing = value == *default;
        let hash = provider.hash(&key, 0);
        let root = match self.root.take() {
            Some(root) => Some(root),
            None if removing => None,
            None => Some(Node::Mutable(Box::new(MutableNode::new()))),
        };
        let previous = match root {
            Some(root) => {
                let (root, previous) = root.put(key, value, provider, default, hash, Depth::ROOT);
                self.root = root;
                previous
            }
            None => None,
        };
        if previous.is_some() || !removing {
            self.tracker.record();
        }
        previous.unwrap_or_else(|| default.clone())
    }

    /// Remove a key, returning the value it held. Same as writing the
    /// default value.
    pub fn remove(&mut self, key: &K) -> V {
        let default = self.store.default_value().clone();
        self.put(key.clone(), default)
    }

    /// Write every remaining entry of `cursor` into this map.
    ///
    /// A cursor over this very map is drained before the first write, so
    /// it doesn't trip over its own writes.
    pub fn put_all<C>(&mut self, cursor: &mut C) -> Result<()>
    where
        C: Cursor<K, V> + ?Sized,
    {
        if cursor.depends_on(&self.tracker) {
            let mut entries = Vec::new();
            while cursor.move_next()? {
                if let (Some(key), Some(value)) = (cursor.key(), cursor.value()) {
                    entries.push((key.clone(), value.clone()));
                }
            }
            self.extend(entries);
        } else {
            while cursor.move_next()? {
                if let (Some(key), Some(value)) = (cursor.key(), cursor.value()) {
                    let (key, value) = (key.clone(), value.clone());
                    self.put(key, value);
                }
            }
        }
        Ok(())
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        if self.root.take().is_some() {
            self.tracker.record();
        }
    }

    /// Count the entries in the map.
    ///
    /// Time: O(n)
    #[must_use]
    pub fn size(&self) -> usize {
        self.root.as_ref().map_or(0, Node::size)
    }

    /// Freeze the current content into a [`Version`].
    ///
    /// Nodes are frozen through the store's cache, so the version shares
    /// every subtree equal to one already in the cache.
    pub fn commit(&mut self) -> Version<K, V, P> {
        let version = self.store.commit(&mut self.root);
        trace!(empty = version.is_empty(), "committed version");
        self.debug_check();
        version
    }

    /// Replace the content of the map with that of `version`, dropping any
    /// uncommitted writes.
    pub fn restore(&mut self, version: &Version<K, V, P>) {
        self.root = version.root().cloned().map(Node::Immutable);
        self.tracker.record();
        trace!(empty = version.is_empty(), "restored version");
    }

    /// A pre-order cursor over the current content.
    ///
    /// The content is frozen as by [`commit`][Self::commit] first, so the
    /// cursor holds its own snapshot. Writing to the map afterwards makes
    /// the cursor [dirty][Cursor::is_dirty].
    pub fn cursor(&mut self) -> MapCursor<K, V, P> {
        let version = self.commit();
        MapCursor::new(version.root().cloned(), Some(self.tracker.observe()))
    }

    /// An in-order cursor over the current content. See
    /// [`cursor`][Self::cursor].
    pub fn in_order_cursor(&mut self) -> InOrderMapCursor<K, V, P> {
        let version = self.commit();
        InOrderMapCursor::new(version.root().cloned(), Some(self.tracker.observe()))
    }

    /// A cursor over the keys whose values differ between the current
    /// content and `to`.
    ///
    /// The current content is frozen first, as by [`cursor`][Self::cursor].
    pub fn diff_cursor(&mut self, to: &Version<K, V, P>) -> MapDiffCursor<K, V, P> {
        let from = self.commit();
        MapDiffCursor::new(
            self.store.default_value().clone(),
            InOrderMapCursor::new(from.root().cloned(), Some(self.tracker.observe())),
            InOrderMapCursor::new(to.root().cloned(), None),
        )
    }

    /// A hash of the map's content. Equal content under the same hash
    /// provider gives an equal hash, whatever the order of writes.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        self.root.as_ref().map_or(0, Node::structural_hash)
    }

    /// Verify the structure of the working trie.
    pub fn check_integrity(&self) -> Result<()> {
        match &self.root {
            Some(root) => root.check_integrity(
                self.store.hash_provider(),
                self.store.default_value(),
                &mut Vec::new(),
            ),
            None => Ok(()),
        }
    }

    #[cfg(any(test, feature = "debug"))]
    fn debug_check(&self) {
        if let Err(error) = self.check_integrity() {
            panic!("commit left a broken trie: {}", error);
        }
    }

    #[cfg(not(any(test, feature = "debug")))]
    #[inline]
    fn debug_check(&self) {}
}

impl<K, V, H, P> GenericVersionedMap<K, V, H, P>
where
    K: Debug,
    V: Debug,
    P: SharedPointerKind,
{
    /// Render the working trie, one node per line, mutable and frozen
    /// nodes marked as such.
    #[must_use]
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        match &self.root {
            Some(root) => {
                let _ = write!(out, "{:#?}", root);
            }
            None => out.push_str("(empty)"),
        }
        out
    }
}

impl<K, V, H, P> Clone for GenericVersionedMap<K, V, H, P>
where
    K: Clone,
    V: Clone,
    H: Clone,
    P: SharedPointerKind,
{
    /// The clone is a separate map: writes to it don't make cursors of the
    /// original dirty.
    fn clone(&self) -> Self {
        GenericVersionedMap::new(self.store.clone(), self.root.clone())
    }
}

impl<K, V, H, P> PartialEq for GenericVersionedMap<K, V, H, P>
where
    K: PartialEq,
    V: PartialEq,
    P: SharedPointerKind,
{
    /// Content equality, whichever of the two maps' nodes are frozen.
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl<K: Eq, V: Eq, H, P: SharedPointerKind> Eq for GenericVersionedMap<K, V, H, P> {}

impl<K, V, H, P> Extend<(K, V)> for GenericVersionedMap<K, V, H, P>
where
    K: Hash + Eq + Clone,
    V: Hash + Eq + Clone,
    H: ContinuousHashProvider<K> + Clone,
    P: SharedPointerKind,
{
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in iter {
            self.put(key, value);
        }
    }
}

impl<'a, K, V, H, P: SharedPointerKind> IntoIterator for &'a GenericVersionedMap<K, V, H, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, H, P> Debug for GenericVersionedMap<K, V, H, P>
where
    K: Debug,
    V: Debug,
    P: SharedPointerKind,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
