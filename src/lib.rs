// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Versioned Maps
//!
//! This crate provides hash maps with cheap snapshots. A map is written to
//! in place, like a [`std::collections::HashMap`], and can at any time be
//! committed into a [`Version`]: an immutable snapshot of its content that
//! costs about as much as the writes made since the previous commit. Maps
//! can be created from, or reset to, any earlier version, and any two
//! versions can be compared key by key in time proportional to the number
//! of keys they disagree on.
//!
//! ## Tries
//!
//! Maps are stored as [compressed hash array mapped prefix
//! tries][champ]. Every key is hashed into a 32 bit word, which is consumed
//! five bits per trie level. A node records in two bitmaps which of its 32
//! slots hold an entry directly and which hold a child node, and stores
//! only the occupied slots. The layout of a trie depends only on the keys
//! it holds, never on the order they were written in, so two maps with the
//! same content have the same shape, and equal subtrees can be shared.
//!
//! Keys whose hashes agree on all 32 bits ask the
//! [`ContinuousHashProvider`] for another word, and keep descending with
//! that. Only keys which agree on [`MAX_PRACTICAL_DEPTH`] consecutive words
//! can't be stored; writing them panics.
//!
//! ## Versions
//!
//! The nodes of a map that were written since the last commit are mutable
//! and private to the map. Committing freezes them into shared immutable
//! nodes, passing each through the node cache of the map's
//! [`VersionedMapStore`] so that equal nodes are only ever stored once.
//! Writing to a frozen path copies the nodes along that path and nothing
//! else.
//!
//! Because equal content is shared, comparing two versions can skip over
//! every subtree the versions have in common. A [`MapDiffCursor`] does
//! just that.
//!
//! ```
//! # use versioned_map::{VersionedMapStore, DefaultHashProvider};
//! let store = VersionedMapStore::new(DefaultHashProvider::new(), 0);
//! let mut map = store.create_map();
//! map.extend((1..=1000).map(|i| (i, i * 10)));
//! let before = map.commit();
//! map.put(500, -1);
//! let after = map.commit();
//!
//! let changes = store.diff_cursor(&before, &after).into_changes()?;
//! assert_eq!(vec![(500, 5000, -1)], changes);
//! # Ok::<(), versioned_map::Error>(())
//! ```
//!
//! ## Default values
//!
//! A map has no notion of a missing key: every key holds a value, and the
//! keys that were never written hold the store's default value. Writing the
//! default value removes a key from the trie.
//!
//! ## Threads
//!
//! With the default [`SharedPointerKind`][shared_ptr::SharedPointerKind],
//! versions are [`Send`] and [`Sync`] and can be read from any number of
//! threads while the map they came from carries on. A map itself is
//! written from one thread at a time.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! | ------- | ----------- |
//! | [`proptest`](https://crates.io/crates/proptest) | Strategies for all these data structures, for testing your code with [proptest](https://proptest-rs.github.io/proptest/intro.html) |
//! | `debug` | Verify the trie after every commit, panicking if it is malformed |
//! | `triomphe` | Use [`triomphe::Arc`](https://docs.rs/triomphe) as the default shared pointer |
//!
//! [champ]: https://michael.steindorfer.name/publications/oopsla15.pdf

#![forbid(rust_2018_idioms)]
#![deny(unsafe_code, nonstandard_style)]
#![warn(unreachable_pub, missing_docs)]

#[macro_use]
mod util;

mod config;
mod cursor;
mod error;
mod hash_provider;
mod nodes;
mod sync;
mod versioned;

pub mod shared_ptr;

pub use crate::config::{VersionedMapConfig, MAX_PRACTICAL_DEPTH};
pub use crate::cursor::{
    Cursor, DiffCursor, InOrderMapCursor, MapCursor, MapDiffCursor, ModificationTracker,
};
pub use crate::error::{Error, Result};
pub use crate::hash_provider::{ContinuousHashProvider, DefaultHashProvider};
pub use crate::versioned::{
    GenericVersionedMap, GenericVersionedMapStore, Iter, Version, VersionedMap, VersionedMapStore,
};

#[cfg(any(test, feature = "proptest"))]
pub mod proptest;
