#![allow(dead_code)]
use rand::seq::SliceRandom;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

// Keys and values the benchmarks can generate. Generated values are never
// the type's default, so no write turns into a removal by accident.
pub trait TestData: Clone + Debug + Eq + Hash + Default {
    fn generate(size: usize) -> Vec<Self>;
}

impl TestData for i64 {
    fn generate(size: usize) -> Vec<Self> {
        let mut gen = SmallRng::seed_from_u64(1);
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(size);
        while out.len() < size {
            let next = gen.random::<i64>();
            if next != 0 && seen.insert(next) {
                out.push(next);
            }
        }
        out
    }
}

impl TestData for String {
    fn generate(size: usize) -> Vec<Self> {
        let mut gen = SmallRng::seed_from_u64(1);
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(size);
        while out.len() < size {
            let len = gen.random_range(5..20);
            let s: String = (0..len)
                .map(|_| gen.random_range(b'a'..=b'z') as char)
                .collect();
            if seen.insert(s.clone()) {
                out.push(s);
            }
        }
        out
    }
}

pub fn reorder<A: Clone>(vec: &[A]) -> Vec<A> {
    let mut gen = SmallRng::seed_from_u64(1);
    let mut out = vec.to_vec();
    out.shuffle(&mut gen);
    out
}

/// Pick `count` of `keys` to rewrite between two versions.
pub fn sample<A: Clone>(keys: &[A], count: usize) -> Vec<A> {
    let mut out = reorder(keys);
    out.truncate(count);
    out
}
