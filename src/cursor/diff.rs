// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;
use std::fmt::{Debug, Error, Formatter};

use archery::SharedPointerKind;

use crate::error::{self, Result};
use crate::shared_ptr::DefaultSharedPtr;

use super::{Cursor, DiffCursor, InOrderMapCursor, ModificationTracker};

/// Where the two underlying cursors stand relative to each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Neither cursor has moved.
    Init,
    /// Both on the same key with equal values. Nothing to report.
    MovingMovingSameKeySameValue,
    /// Both inside the same shared node. Nothing to report in it.
    MovingMovingSameNode,
    /// The first cursor is behind; its key was removed.
    MovingMovingBehind1,
    /// The second cursor is behind; its key was added.
    MovingMovingBehind2,
    /// Both on the same key with different values.
    MovingMovingSameKeyDifferentValue,
    /// Both at the same slot and depth with different keys. The first
    /// cursor's key has been reported as removed.
    MovingMovingHash1,
    /// As above, with the second cursor's key reported as added.
    MovingMovingHash2,
    /// Only the first cursor is left; everything it finds was removed.
    MovingTerminated,
    /// Only the second cursor is left; everything it finds was added.
    TerminatedMoving,
    TerminatedTerminated,
}

impl State {
    /// Stable states have something to report, or are the end.
    fn is_stable(self) -> bool {
        !matches!(
            self,
            State::Init | State::MovingMovingSameKeySameValue | State::MovingMovingSameNode
        )
    }
}

/// A cursor over the keys whose values differ between two versions.
///
/// Both versions are walked side by side with [`InOrderMapCursor`]s, and
/// subtrees the two versions share are skipped whole, so the cost follows
/// the size of the difference rather than the size of the maps. Keys absent
/// from one version report the store's default value for it.
///
/// ```
/// # use versioned_map::{Cursor, DiffCursor, VersionedMapStore, DefaultHashProvider};
/// let store = VersionedMapStore::new(DefaultHashProvider::new(), 0);
/// let mut map = store.create_map();
/// map.put(1, 10);
/// map.put(2, 20);
/// let before = map.commit();
/// map.put(2, 21);
/// map.put(3, 30);
/// let after = map.commit();
/// let mut diff = store.diff_cursor(&before, &after);
/// let mut changes = Vec::new();
/// while diff.move_next()? {
///     changes.push((*diff.key().unwrap(), *diff.from_value().unwrap(), *diff.to_value().unwrap()));
/// }
/// changes.sort();
/// assert_eq!(vec![(2, 20, 21), (3, 0, 30)], changes);
/// # Ok::<(), versioned_map::Error>(())
/// ```
pub struct MapDiffCursor<K, V, P: SharedPointerKind = DefaultSharedPtr> {
    default: V,
    cursor1: InOrderMapCursor<K, V, P>,
    cursor2: InOrderMapCursor<K, V, P>,
    state: State,
    current: Option<(K, V, V)>,
}

impl<K, V, P> MapDiffCursor<K, V, P>
where
    K: PartialEq + Clone,
    V: PartialEq + Clone,
    P: SharedPointerKind,
{
    pub(crate) fn new(
        default: V,
        cursor1: InOrderMapCursor<K, V, P>,
        cursor2: InOrderMapCursor<K, V, P>,
    ) -> Self {
        MapDiffCursor {
            default,
            cursor1,
            cursor2,
            state: State::Init,
            current: None,
        }
    }

    /// The current change as `(key, from_value, to_value)`.
    pub fn change(&self) -> Option<(&K, &V, &V)> {
        self.current.as_ref().map(|(key, from, to)| (key, from, to))
    }

    /// Walk the rest of the difference, collecting every change.
    pub fn into_changes(mut self) -> Result<Vec<(K, V, V)>> {
        let mut changes = Vec::new();
        while self.move_next()? {
            if let Some(change) = self.current.take() {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    fn report_removed(&mut self) -> Result<()> {
        let (key, value) = self.cursor1.entry().ok_or(error::Error::IllegalCursorState {
            reason: "moving cursor has no entry",
        })?;
        self.current = Some((key.clone(), value.clone(), self.default.clone()));
        Ok(())
    }

    fn report_added(&mut self) -> Result<()> {
        let (key, value) = self.cursor2.entry().ok_or(error::Error::IllegalCursorState {
            reason: "moving cursor has no entry",
        })?;
        self.current = Some((key.clone(), self.default.clone(), value.clone()));
        Ok(())
    }

    fn step(&mut self) -> Result<State> {
        match self.state {
            State::Init
            | State::MovingMovingSameKeySameValue
            | State::MovingMovingSameKeyDifferentValue
            | State::MovingMovingHash2 => {
                let moved1 = self.cursor1.move_next()?;
                let moved2 = self.cursor2.move_next()?;
                self.update_state(moved1, moved2)
            }
            State::MovingMovingSameNode => {
                let moved1 = self.cursor1.skip_current_node()?;
                let moved2 = self.cursor2.skip_current_node()?;
                self.update_state(moved1, moved2)
            }
            State::MovingMovingBehind1 => {
                let moved1 = self.cursor1.move_next()?;
                self.update_state(moved1, true)
            }
            State::MovingMovingBehind2 => {
                let moved2 = self.cursor2.move_next()?;
                self.update_state(true, moved2)
            }
            State::MovingMovingHash1 => {
                self.report_added()?;
                Ok(State::MovingMovingHash2)
            }
            State::MovingTerminated => {
                let moved1 = self.cursor1.move_next()?;
                self.update_state(moved1, false)
            }
            State::TerminatedMoving => {
                let moved2 = self.cursor2.move_next()?;
                self.update_state(false, moved2)
            }
            State::TerminatedTerminated => Err(error::Error::IllegalCursorState {
                reason: "moved a terminated diff cursor",
            }),
        }
    }

    fn update_state(&mut self, moving1: bool, moving2: bool) -> Result<State> {
        match (moving1, moving2) {
            (false, false) => {
                self.current = None;
                Ok(State::TerminatedTerminated)
            }
            (true, false) => {
                self.report_removed()?;
                Ok(State::MovingTerminated)
            }
            (false, true) => {
                self.report_added()?;
                Ok(State::TerminatedMoving)
            }
            (true, true) => {
                if InOrderMapCursor::same_sub_node(&self.cursor1, &self.cursor2) {
                    return Ok(State::MovingMovingSameNode);
                }
                match InOrderMapCursor::compare_position(&self.cursor1, &self.cursor2) {
                    Ordering::Greater => {
                        self.report_added()?;
                        Ok(State::MovingMovingBehind2)
                    }
                    Ordering::Less => {
                        self.report_removed()?;
                        Ok(State::MovingMovingBehind1)
                    }
                    Ordering::Equal => self.update_same_position(),
                }
            }
        }
    }

    fn update_same_position(&mut self) -> Result<State> {
        let missing = || error::Error::IllegalCursorState {
            reason: "moving cursor has no entry",
        };
        let (key1, value1) = self.cursor1.entry().ok_or_else(missing)?;
        let (key2, value2) = self.cursor2.entry().ok_or_else(missing)?;
        if key1 == key2 {
            if value1 == value2 {
                return Ok(State::MovingMovingSameKeySameValue);
            }
            self.current = Some((key1.clone(), value1.clone(), value2.clone()));
            return Ok(State::MovingMovingSameKeyDifferentValue);
        }
        // Different keys on one path: the shallower one sorts first. At
        // equal depth, report both, the first cursor's key first.
        match InOrderMapCursor::compare_depth(&self.cursor1, &self.cursor2) {
            Ordering::Greater => {
                self.report_removed()?;
                Ok(State::MovingMovingBehind1)
            }
            Ordering::Less => {
                self.report_added()?;
                Ok(State::MovingMovingBehind2)
            }
            Ordering::Equal => {
                self.report_removed()?;
                Ok(State::MovingMovingHash1)
            }
        }
    }
}

impl<K, V, P> Cursor<K, V> for MapDiffCursor<K, V, P>
where
    K: PartialEq + Clone,
    V: PartialEq + Clone,
    P: SharedPointerKind,
{
    fn move_next(&mut self) -> Result<bool> {
        if self.is_dirty() {
            return Err(error::Error::ConcurrentModification);
        }
        loop {
            self.state = self.step()?;
            if self.state.is_stable() {
                break;
            }
        }
        Ok(self.state != State::TerminatedTerminated)
    }

    fn key(&self) -> Option<&K> {
        self.current.as_ref().map(|(key, _, _)| key)
    }

    fn value(&self) -> Option<&V> {
        self.to_value()
    }

    fn is_terminated(&self) -> bool {
        self.state == State::TerminatedTerminated
    }

    fn is_dirty(&self) -> bool {
        self.cursor1.is_dirty() || self.cursor2.is_dirty()
    }

    fn depends_on(&self, tracker: &ModificationTracker) -> bool {
        self.cursor1.depends_on(tracker) || self.cursor2.depends_on(tracker)
    }
}

impl<K, V, P> DiffCursor<K, V> for MapDiffCursor<K, V, P>
where
    K: PartialEq + Clone,
    V: PartialEq + Clone,
    P: SharedPointerKind,
{
    fn from_value(&self) -> Option<&V> {
        self.current.as_ref().map(|(_, from, _)| from)
    }

    fn to_value(&self) -> Option<&V> {
        self.current.as_ref().map(|(_, _, to)| to)
    }
}

impl<K, V, P: SharedPointerKind> Debug for MapDiffCursor<K, V, P>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        f.debug_struct("MapDiffCursor")
            .field("state", &self.state)
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nodes::cache::NodeCache;
    use crate::nodes::immutable::ImmutableNode;
    use crate::nodes::mutable::MutableNode;
    use crate::nodes::{Depth, Node};
    use archery::{ArcK, SharedPointer};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    type Frozen = SharedPointer<ImmutableNode<u32, i32, ArcK>, ArcK>;

    fn provider(key: &u32, round: u32) -> u32 {
        key.rotate_right(round * 3)
    }

    fn frozen(entries: &BTreeMap<u32, i32>, cache: Option<&NodeCache<u32, i32, ArcK>>) -> Option<Frozen> {
        let mut root = Some(Node::Mutable(Box::new(MutableNode::new())));
        for (&key, &value) in entries {
            root = root.and_then(|node| node.put(key, value, &provider, &0, provider(&key, 0), Depth::ROOT).0);
        }
        root.map(|node| node.into_immutable(cache))
    }

    fn diff(from: &BTreeMap<u32, i32>, to: &BTreeMap<u32, i32>, cached: bool) -> Vec<(u32, i32, i32)> {
        let cache = cached.then(|| NodeCache::new(true));
        let cursor = MapDiffCursor::new(
            0,
            InOrderMapCursor::new(frozen(from, cache.as_ref()), None),
            InOrderMapCursor::new(frozen(to, cache.as_ref()), None),
        );
        let mut changes = cursor.into_changes().unwrap();
        changes.sort_unstable();
        changes
    }

    fn brute_force(from: &BTreeMap<u32, i32>, to: &BTreeMap<u32, i32>) -> Vec<(u32, i32, i32)> {
        let mut changes = Vec::new();
        for key in from.keys().chain(to.keys()) {
            let before = from.get(key).copied().unwrap_or(0);
            let after = to.get(key).copied().unwrap_or(0);
            if before != after && !changes.iter().any(|(k, _, _)| k == key) {
                changes.push((*key, before, after));
            }
        }
        changes.sort_unstable();
        changes
    }

    fn map(entries: &[(u32, i32)]) -> BTreeMap<u32, i32> {
        entries.iter().copied().collect()
    }

    #[test]
    fn shared_subtrees_are_skipped() {
        let cache = NodeCache::new(true);
        let before: BTreeMap<u32, i32> = (1..=1000).map(|key| (key, key as i32 * 10)).collect();
        let mut after = before.clone();
        after.insert(500, -1);
        let mut cursor = MapDiffCursor::new(
            0,
            InOrderMapCursor::new(frozen(&before, Some(&cache)), None),
            InOrderMapCursor::new(frozen(&after, Some(&cache)), None),
        );
        let mut changes = Vec::new();
        while cursor.move_next().unwrap() {
            changes.extend(cursor.change().map(|(key, from, to)| (*key, *from, *to)));
        }
        assert_eq!(vec![(500, 5000, -1)], changes);

        // The root splits the keys 32 ways. Only the child holding 500 is
        // walked in full; every other child is left after its first entry.
        let visited = cursor.cursor1.visited() + cursor.cursor2.visited();
        assert!(visited < 200, "visited {} entries", visited);
    }

    #[test]
    fn identical_versions_have_no_diff() {
        let entries = map(&[(1, 1), (2, 2), (33, 3), (65, 4)]);
        assert_eq!(Vec::<(u32, i32, i32)>::new(), diff(&entries, &entries, true));
        assert_eq!(Vec::<(u32, i32, i32)>::new(), diff(&entries, &entries, false));
    }

    #[test]
    fn empty_sides() {
        let entries = map(&[(1, 1), (2, 2)]);
        let empty = BTreeMap::new();
        assert_eq!(vec![(1, 0, 1), (2, 0, 2)], diff(&empty, &entries, true));
        assert_eq!(vec![(1, 1, 0), (2, 2, 0)], diff(&entries, &empty, true));
        assert_eq!(Vec::<(u32, i32, i32)>::new(), diff(&empty, &empty, true));
    }

    #[test]
    fn changed_added_and_removed() {
        let from = map(&[(1, 1), (2, 2), (3, 3)]);
        let to = map(&[(1, 1), (2, 5), (4, 4)]);
        assert_eq!(vec![(2, 2, 5), (3, 3, 0), (4, 0, 4)], diff(&from, &to, true));
    }

    #[test]
    fn same_slot_different_keys() {
        // 1 and 33 both land in slot 1 at the root.
        let from = map(&[(1, 10)]);
        let to = map(&[(33, 30)]);
        assert_eq!(vec![(1, 10, 0), (33, 0, 30)], diff(&from, &to, true));
    }

    #[test]
    fn entry_against_subtree() {
        // On one side slot 1 holds an entry, on the other a child.
        let from = map(&[(1, 10)]);
        let to = map(&[(1, 10), (33, 30), (65, 60)]);
        assert_eq!(vec![(33, 0, 30), (65, 0, 60)], diff(&from, &to, true));
        assert_eq!(vec![(33, 30, 0), (65, 60, 0)], diff(&to, &from, true));
        let replaced = map(&[(33, 30), (65, 60)]);
        assert_eq!(
            vec![(1, 10, 0), (33, 0, 30), (65, 0, 60)],
            diff(&from, &replaced, false)
        );
    }

    #[test]
    fn agrees_with_brute_force() {
        let mut from = BTreeMap::new();
        let mut to = BTreeMap::new();
        for i in 0..3000u32 {
            let key = i.wrapping_mul(2_654_435_761) >> 7;
            from.insert(key, (i % 13) as i32);
            to.insert(key, (i % 11) as i32);
        }
        from.retain(|_, value| *value != 0);
        to.retain(|_, value| *value != 0);
        for cached in [true, false] {
            assert_eq!(brute_force(&from, &to), diff(&from, &to, cached));
            assert_eq!(brute_force(&to, &from), diff(&to, &from, cached));
        }
    }

    #[test]
    fn terminated_diff_refuses_to_move() {
        let entries = map(&[(1, 1)]);
        let mut cursor: MapDiffCursor<u32, i32, ArcK> = MapDiffCursor::new(
            0,
            InOrderMapCursor::new(frozen(&entries, None), None),
            InOrderMapCursor::new(frozen(&BTreeMap::new(), None), None),
        );
        assert_eq!(Ok(true), cursor.move_next());
        assert_eq!(Some((&1, &1, &0)), cursor.change());
        assert_eq!(Some(&0), cursor.value());
        assert_eq!(Ok(false), cursor.move_next());
        assert!(cursor.is_terminated());
        assert_eq!(None, cursor.key());
        assert!(matches!(
            cursor.move_next(),
            Err(error::Error::IllegalCursorState { .. })
        ));
    }
}
