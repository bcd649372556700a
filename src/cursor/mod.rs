// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cursors over frozen tries.
//!
//! A cursor walks a committed snapshot of a map, so it never observes a
//! half-written trie. It still remembers which map it was taken from, and
//! refuses to move once that map has been written to: reading on would
//! silently report a state the map is no longer in.
//!
//! Cursors start *before* their first entry. Call
//! [`move_next`][Cursor::move_next] until it returns `Ok(false)`:
//!
//! ```
//! # use versioned_map::{Cursor, VersionedMapStore, DefaultHashProvider};
//! let store = VersionedMapStore::new(DefaultHashProvider::new(), 0);
//! let mut map = store.create_map();
//! map.put("lions", 3);
//! map.put("tigers", 2);
//! let mut cursor = map.cursor();
//! let mut total = 0;
//! while cursor.move_next()? {
//!     total += cursor.value().copied().unwrap_or_default();
//! }
//! assert_eq!(5, total);
//! # Ok::<(), versioned_map::Error>(())
//! ```

mod diff;
mod in_order;
mod map;

pub use self::diff::MapDiffCursor;
pub use self::in_order::InOrderMapCursor;
pub use self::map::MapCursor;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

/// A forward-only view over the entries of a map.
pub trait Cursor<K, V> {
    /// Advance to the next entry.
    ///
    /// Returns `Ok(false)` once the cursor has run out of entries. Moving
    /// again after that is an [`IllegalCursorState`][crate::Error::IllegalCursorState],
    /// and moving a cursor whose map has been written to since is a
    /// [`ConcurrentModification`][crate::Error::ConcurrentModification].
    fn move_next(&mut self) -> Result<bool>;

    /// The key of the current entry, if the cursor is on one.
    fn key(&self) -> Option<&K>;

    /// The value of the current entry, if the cursor is on one.
    fn value(&self) -> Option<&V>;

    /// Test whether the cursor has run out of entries.
    fn is_terminated(&self) -> bool;

    /// Test whether the map this cursor reads has been written to since the
    /// cursor was created.
    fn is_dirty(&self) -> bool;

    /// Test whether writes recorded by `tracker` make this cursor dirty.
    fn depends_on(&self, tracker: &ModificationTracker) -> bool;
}

/// A cursor over the differences between two versions.
///
/// [`key`][Cursor::key] is the changed key and [`value`][Cursor::value] is
/// its value in the newer version.
pub trait DiffCursor<K, V>: Cursor<K, V> {
    /// The value of the current key in the older version.
    fn from_value(&self) -> Option<&V>;

    /// The value of the current key in the newer version.
    fn to_value(&self) -> Option<&V>;
}

/// Counts the writes made to one map.
///
/// Every cursor created from the map holds an observation of the count at
/// the time it was created, and is dirty once the count has moved on.
/// Clones share the count.
#[derive(Clone, Debug, Default)]
pub struct ModificationTracker {
    writes: Arc<AtomicU64>,
}

impl ModificationTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Note a write to the tracked map.
    #[inline]
    pub(crate) fn record(&self) {
        self.writes.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn observe(&self) -> Observation {
        Observation {
            tracker: self.clone(),
            seen: self.writes.load(Ordering::Acquire),
        }
    }

    /// Test whether two trackers count writes to the same map.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.writes, &other.writes)
    }
}

/// The write count of a map at the time a cursor was created.
#[derive(Clone, Debug)]
pub(crate) struct Observation {
    tracker: ModificationTracker,
    seen: u64,
}

impl Observation {
    pub(crate) fn is_dirty(&self) -> bool {
        self.tracker.writes.load(Ordering::Acquire) != self.seen
    }

    pub(crate) fn tracks(&self, tracker: &ModificationTracker) -> bool {
        self.tracker.ptr_eq(tracker)
    }
}

/// Where a cursor is in its walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Progress {
    Fresh,
    Moving,
    Terminated,
}

fn is_dirty(observation: &Option<Observation>) -> bool {
    observation.as_ref().map_or(false, Observation::is_dirty)
}

fn depends_on(observation: &Option<Observation>, tracker: &ModificationTracker) -> bool {
    observation
        .as_ref()
        .map_or(false, |observation| observation.tracks(tracker))
}
