// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Versioned maps.
//!
//! A [`VersionedMapStore`] hands out [`VersionedMap`]s. A map is written
//! in place like any other map, and [`commit`][GenericVersionedMap::commit]
//! freezes its current content into a [`Version`]: a cheap, immutable,
//! thread safe snapshot. Any number of maps can later be started from, or
//! reset to, any version, and two versions can be compared with a
//! [`MapDiffCursor`][crate::MapDiffCursor] in time proportional to the
//! number of keys that differ.
//!
//! Keys that are not in a map read as the store's default value, and
//! writing the default value removes a key.
//!
//! ```
//! # use versioned_map::{VersionedMapStore, DefaultHashProvider};
//! let store = VersionedMapStore::new(DefaultHashProvider::new(), 0);
//! let mut map = store.create_map();
//! map.put("apples", 3);
//! let first = map.commit();
//! map.put("apples", 5);
//! assert_eq!(5, *map.get(&"apples"));
//! map.restore(&first);
//! assert_eq!(3, *map.get(&"apples"));
//! assert_eq!(0, *map.get(&"pears"));
//! ```

mod map;
mod store;
mod version;

pub use self::map::{GenericVersionedMap, VersionedMap};
pub use self::store::{GenericVersionedMapStore, VersionedMapStore};
pub use self::version::Version;

use std::iter::FusedIterator;

use archery::SharedPointerKind;

use crate::nodes::iter::Iter as NodeIter;

/// An iterator over the entries of a map or version.
///
/// Entries come out in trie order: stable for a given content and hash
/// provider, but otherwise arbitrary.
pub struct Iter<'a, K, V, P: SharedPointerKind> {
    it: NodeIter<'a, K, V, P>,
}

// We impl Clone instead of deriving it, because we want Clone even if K and V aren't.
impl<'a, K, V, P: SharedPointerKind> Clone for Iter<'a, K, V, P> {
    fn clone(&self) -> Self {
        Iter {
            it: self.it.clone(),
        }
    }
}

impl<'a, K, V, P: SharedPointerKind> Iterator for Iter<'a, K, V, P> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.it.next()
    }
}

impl<'a, K, V, P: SharedPointerKind> FusedIterator for Iter<'a, K, V, P> {}
