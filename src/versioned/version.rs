// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};

use archery::{SharedPointer, SharedPointerKind};

use crate::cursor::{InOrderMapCursor, MapCursor};
use crate::error::Result;
use crate::hash_provider::ContinuousHashProvider;
use crate::nodes::immutable::ImmutableNode;
use crate::nodes::iter::Iter as NodeIter;
use crate::shared_ptr::DefaultSharedPtr;

use super::Iter;

/// A committed snapshot of a map.
///
/// A version is a pointer to a frozen trie, or nothing for the empty map.
/// Cloning one is a reference count increment. Versions never change, so
/// with a thread safe pointer kind they can be handed to other threads
/// and read there while the map they came from moves on.
///
/// Equal versions compare equal even when they were committed from
/// different maps, as long as those maps share a hash provider.
pub struct Version<K, V, P: SharedPointerKind = DefaultSharedPtr> {
    root: Option<SharedPointer<ImmutableNode<K, V, P>, P>>,
}

impl<K, V, P: SharedPointerKind> Version<K, V, P> {
    pub(crate) fn new(root: Option<SharedPointer<ImmutableNode<K, V, P>, P>>) -> Self {
        Version { root }
    }

    pub(crate) fn root(&self) -> Option<&SharedPointer<ImmutableNode<K, V, P>, P>> {
        self.root.as_ref()
    }

    /// The version of an empty map.
    #[must_use]
    pub fn empty() -> Self {
        Version { root: None }
    }

    /// Test whether this is the version of an empty map.
    ///
    /// Time: O(1)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Test whether two versions are the very same snapshot.
    ///
    /// Versions committed through a node cache are also pointer equal when
    /// their contents are equal, so this is a cheap equality test for the
    /// versions of one store.
    ///
    /// Time: O(1)
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(left), Some(right)) => SharedPointer::ptr_eq(left, right),
            (None, None) => true,
            _ => false,
        }
    }

    /// Count the entries in this version.
    ///
    /// Time: O(n)
    #[must_use]
    pub fn size(&self) -> usize
    where
        K: Hash + Eq + Clone,
        V: Hash + Eq + Clone,
    {
        self.root.as_ref().map_or(0, |root| root.size())
    }

    /// Iterate over the entries of this version.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V, P> {
        Iter {
            it: NodeIter::frozen(self.root.as_deref()),
        }
    }

    /// A pre-order cursor over this version. Versions never change, so the
    /// cursor is never dirty.
    #[must_use]
    pub fn cursor(&self) -> MapCursor<K, V, P> {
        MapCursor::new(self.root.clone(), None)
    }

    /// An in-order cursor over this version.
    #[must_use]
    pub fn in_order_cursor(&self) -> InOrderMapCursor<K, V, P> {
        InOrderMapCursor::new(self.root.clone(), None)
    }

    /// Verify the structure of this version's trie, given the hash provider
    /// and default value of the store that committed it.
    pub fn check_integrity<H>(&self, provider: &H, default: &V) -> Result<()>
    where
        K: Hash + Eq + Clone,
        V: Hash + Eq + Clone,
        H: ContinuousHashProvider<K> + ?Sized,
    {
        match &self.root {
            Some(root) => root.check_integrity(provider, default, &mut Vec::new()),
            None => Ok(()),
        }
    }
}

impl<K, V, P: SharedPointerKind> Clone for Version<K, V, P> {
    fn clone(&self) -> Self {
        Version {
            root: self.root.clone(),
        }
    }
}

impl<K, V, P: SharedPointerKind> Default for Version<K, V, P> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K, V, P> PartialEq for Version<K, V, P>
where
    K: PartialEq,
    V: PartialEq,
    P: SharedPointerKind,
{
    fn eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(left), Some(right)) => SharedPointer::ptr_eq(left, right) || **left == **right,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<K: Eq, V: Eq, P: SharedPointerKind> Eq for Version<K, V, P> {}

impl<K, V, P: SharedPointerKind> Hash for Version<K, V, P> {
    fn hash<HR: Hasher>(&self, state: &mut HR) {
        state.write_u64(self.root.as_ref().map_or(0, |root| root.structural_hash()));
    }
}

impl<K: Debug, V: Debug, P: SharedPointerKind> Debug for Version<K, V, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, P: SharedPointerKind> IntoIterator for &'a Version<K, V, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cursor::Cursor;
    use crate::proptest::version;
    use crate::{DefaultHashProvider, VersionedMapStore};
    use ::proptest::proptest;
    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use std::collections::hash_map::DefaultHasher;

    assert_impl_all!(Version<i32, i32>: Send, Sync, Clone);
    assert_not_impl_any!(Version<i32, i32, archery::RcK>: Send, Sync);
    assert_covariant!(Version<T, i32> in T);
    assert_covariant!(Version<i32, T> in T);

    #[test]
    fn empty_version() {
        let version: Version<u32, u32> = Version::default();
        assert!(version.is_empty());
        assert_eq!(0, version.size());
        assert!(version.ptr_eq(&Version::empty()));
        assert_eq!(version, Version::empty());
        assert_eq!(0, version.iter().count());
        assert_eq!(Ok(false), version.cursor().move_next());
    }

    #[test]
    fn versions_from_different_maps_compare_by_content() {
        let store = VersionedMapStore::new(DefaultHashProvider::new(), 0);
        let mut left = store.create_map();
        let mut right = store.create_map();
        for i in 1..100 {
            left.put(i, i * 2);
            right.put(100 - i, (100 - i) * 2);
        }
        let left = left.commit();
        let right = right.commit();
        assert_eq!(left, right);
        // The store shares equal nodes, so these are the same snapshot.
        assert!(left.ptr_eq(&right));
        assert_eq!(99, left.size());
        let sum: i32 = left.iter().map(|(_, v)| *v).sum();
        assert_eq!(9900, sum);
    }

    #[test]
    fn debug_lists_entries() {
        let store = VersionedMapStore::new(DefaultHashProvider::new(), 0);
        let mut map = store.create_map();
        map.put(7, 8);
        assert_eq!("{7: 8}", format!("{:?}", map.commit()));
    }

    fn hash_of(version: &Version<u32, i32>) -> u64 {
        let mut hasher = DefaultHasher::new();
        version.hash(&mut hasher);
        hasher.finish()
    }

    proptest! {
        #[test]
        fn rebuilt_versions_are_equal(
            original in version(VersionedMapStore::new(DefaultHashProvider::new(), 0), 0u32..500, -2i32..3, 0..200)
        ) {
            let other = VersionedMapStore::with_config(
                DefaultHashProvider::new(),
                0,
                crate::VersionedMapConfig::uncached(),
            );
            let mut map = other.create_map();
            map.extend(original.iter().map(|(key, value)| (*key, *value)));
            let rebuilt = map.commit();
            assert_eq!(original, rebuilt);
            assert_eq!(hash_of(&original), hash_of(&rebuilt));
            assert_eq!(original.size(), rebuilt.size());
        }
    }
}
