// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Continuous hashing.
//!
//! A trie level only consumes five bits of a key's hash, so a single 32 bit
//! word runs out after seven levels. When two keys agree on every fragment
//! of a word, the trie asks the [`ContinuousHashProvider`] for the next
//! word, called the next *round*, and keeps descending with that.

use std::collections::hash_map::DefaultHasher;
use std::fmt::{Debug, Error, Formatter};
use std::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};

use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::SplitMix64;

/// Hashes keys into an unbounded sequence of 32 bit words.
///
/// `hash(key, round)` must be deterministic for the lifetime of every store
/// using the provider, and should give unrelated values for different
/// rounds: two keys that collide in round `n` ought to be separated by
/// round `n + 1`.
///
/// Any `Fn(&K, u32) -> u32` is a provider.
pub trait ContinuousHashProvider<K: ?Sized> {
    /// Produce the hash word for `round` (starting at 0) of `key`.
    fn hash(&self, key: &K, round: u32) -> u32;
}

impl<K: ?Sized, F> ContinuousHashProvider<K> for F
where
    F: Fn(&K, u32) -> u32,
{
    #[inline]
    fn hash(&self, key: &K, round: u32) -> u32 {
        self(key, round)
    }
}

const ROUND_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// A provider built on any [`BuildHasher`].
///
/// The first two rounds are the two halves of the 64 bit hash. Later rounds
/// are drawn from a [`SplitMix64`] generator seeded with the 64 bit hash and
/// the round number.
///
/// The default hasher uses fixed keys, so hashes are stable between runs.
#[derive(Clone, Default)]
pub struct DefaultHashProvider<S = BuildHasherDefault<DefaultHasher>> {
    hasher: S,
}

impl DefaultHashProvider {
    /// Construct a provider using the standard library's SipHash with
    /// fixed keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> DefaultHashProvider<S> {
    /// Construct a provider using the given [`BuildHasher`].
    #[must_use]
    pub fn with_hasher(hasher: S) -> Self {
        DefaultHashProvider { hasher }
    }

    /// Get a reference to the provider's [`BuildHasher`].
    #[must_use]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}

impl<K, S> ContinuousHashProvider<K> for DefaultHashProvider<S>
where
    K: Hash + ?Sized,
    S: BuildHasher,
{
    fn hash(&self, key: &K, round: u32) -> u32 {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        let base = hasher.finish();
        match round {
            0 => base as u32,
            1 => (base >> 32) as u32,
            _ => {
                let seed = base ^ u64::from(round).wrapping_mul(ROUND_SEED);
                SplitMix64::seed_from_u64(seed).next_u32()
            }
        }
    }
}

impl<S> Debug for DefaultHashProvider<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.write_str("DefaultHashProvider")
    }
}
