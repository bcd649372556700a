// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Proptest strategies.
//!
//! These are only available when using the `proptest` feature flag.

use std::hash::Hash;

use ::proptest::collection::{vec, SizeRange};
use ::proptest::strategy::{BoxedStrategy, Strategy};
use archery::SharedPointerKind;

use crate::hash_provider::ContinuousHashProvider;
use crate::versioned::{GenericVersionedMap, GenericVersionedMapStore, Version};

/// A strategy for a map created by `store`, filled by writing a sequence of
/// at most `size` generated entries.
///
/// Writes of the store's default value are kept in the sequence, so the
/// generated maps have been through removals as well as insertions.
///
/// # Examples
///
/// ```rust,ignore
/// proptest! {
///     #[test]
///     fn proptest_works(ref m in versioned_map(store, 0..9999, ".*", 10..100)) {
///         assert!(m.size() < 100);
///     }
/// }
/// ```
pub fn versioned_map<K, V, H, P>(
    store: GenericVersionedMapStore<K, V, H, P>,
    key: impl Strategy<Value = K> + 'static,
    value: impl Strategy<Value = V> + 'static,
    size: impl Into<SizeRange>,
) -> BoxedStrategy<GenericVersionedMap<K, V, H, P>>
where
    K: Hash + Eq + Clone + std::fmt::Debug + 'static,
    V: Hash + Eq + Clone + std::fmt::Debug + 'static,
    H: ContinuousHashProvider<K> + Clone + 'static,
    P: SharedPointerKind + 'static,
{
    vec((key, value), size)
        .prop_map(move |writes| {
            let mut map = store.create_map();
            map.extend(writes);
            map
        })
        .boxed()
}

/// A strategy for a committed [`Version`] of a map generated as by
/// [`versioned_map`].
pub fn version<K, V, H, P>(
    store: GenericVersionedMapStore<K, V, H, P>,
    key: impl Strategy<Value = K> + 'static,
    value: impl Strategy<Value = V> + 'static,
    size: impl Into<SizeRange>,
) -> BoxedStrategy<Version<K, V, P>>
where
    K: Hash + Eq + Clone + std::fmt::Debug + 'static,
    V: Hash + Eq + Clone + std::fmt::Debug + 'static,
    H: ContinuousHashProvider<K> + Clone + 'static,
    P: SharedPointerKind + 'static,
{
    versioned_map(store, key, value, size)
        .prop_map(|mut map| map.commit())
        .boxed()
}
