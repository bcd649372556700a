#![no_main]

use std::collections::HashMap as NatMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use versioned_map::{DefaultHashProvider, Version, VersionedMapStore};

#[derive(Arbitrary, Debug)]
enum Action<K, V> {
    Put(K, V),
    Remove(K),
    Commit,
    Restore(u8),
    Diff(u8, u8),
}

fuzz_target!(|actions: Vec<Action<u16, u8>>| {
    let store = VersionedMapStore::new(DefaultHashProvider::new(), 0u8);
    let mut map = store.create_map();
    let mut nat = NatMap::new();
    let mut versions: Vec<(Version<u16, u8>, NatMap<u16, u8>)> = vec![(Version::empty(), NatMap::new())];
    for action in actions {
        match action {
            Action::Put(key, value) => {
                let expected = nat.get(&key).copied().unwrap_or(0);
                if value == 0 {
                    nat.remove(&key);
                } else {
                    nat.insert(key, value);
                }
                assert_eq!(expected, map.put(key, value));
            }
            Action::Remove(key) => {
                let expected = nat.remove(&key).unwrap_or(0);
                assert_eq!(expected, map.remove(&key));
            }
            Action::Commit => {
                versions.push((map.commit(), nat.clone()));
            }
            Action::Restore(index) => {
                let (version, content) = &versions[index as usize % versions.len()];
                map.restore(version);
                nat = content.clone();
            }
            Action::Diff(from, to) => {
                let (from, from_content) = &versions[from as usize % versions.len()];
                let (to, to_content) = &versions[to as usize % versions.len()];
                let mut changes = store.diff_cursor(from, to).into_changes().unwrap();
                changes.sort_unstable();
                let mut expected: Vec<(u16, u8, u8)> = from_content
                    .keys()
                    .chain(to_content.keys())
                    .map(|key| {
                        let before = from_content.get(key).copied().unwrap_or(0);
                        let after = to_content.get(key).copied().unwrap_or(0);
                        (*key, before, after)
                    })
                    .filter(|(_, before, after)| before != after)
                    .collect();
                expected.sort_unstable();
                expected.dedup();
                assert_eq!(expected, changes);
            }
        }
        assert_eq!(nat.len(), map.size());
    }
    for (key, value) in &nat {
        assert_eq!(value, map.get(key));
    }
    assert_eq!(map.iter().count(), nat.len());
});
