use std::collections::BTreeMap;

use flow_core::{TreeMap, TreeSet};
use proptest::prelude::*;

#[test]
fn set_and_get() {
    let map = TreeMap::new().set(2, "two").set(1, "one").set(3, "three");
    assert_eq!(map.len(), 3);
    assert_eq!(map.get(&1), Some(&"one"));
    assert_eq!(map.get(&4), None);
    assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    map.validate_invariants().unwrap();
}

#[test]
fn set_returns_new_map_and_keeps_input() {
    let before = TreeMap::new().set("a", 1);
    let after = before.set("a", 2);
    assert_eq!(before.get("a"), Some(&1));
    assert_eq!(after.get("a"), Some(&2));
    assert_eq!(after.len(), 1);
}

#[test]
fn setting_an_equal_value_returns_the_same_map() {
    let map: TreeMap<u32, String> = (0..50).map(|i| (i, i.to_string())).collect();
    let same = map.set(17, "17".to_string());
    assert!(same.ptr_eq(&map));
}

#[test]
fn deleting_an_absent_key_returns_the_same_map() {
    let map: TreeMap<u32, u32> = (0..20).map(|i| (i * 2, i)).collect();
    let (same, removed) = map.delete(&7);
    assert!(same.ptr_eq(&map));
    assert_eq!(removed, None);

    let (empty, removed) = TreeMap::<u32, u32>::new().delete(&1);
    assert!(empty.is_empty());
    assert_eq!(removed, None);
}

#[test]
fn delete_returns_previous_value() {
    let map: TreeMap<u32, u32> = (0..10).map(|i| (i, i * 10)).collect();
    let (smaller, removed) = map.delete(&4);
    assert_eq!(removed, Some(40));
    assert_eq!(smaller.len(), 9);
    assert!(!smaller.contains_key(&4));
    assert!(map.contains_key(&4));
    smaller.validate_invariants().unwrap();
}

#[test]
fn delete_everything_in_both_directions() {
    let map: TreeMap<u32, ()> = (0..200).map(|i| (i, ())).collect();
    let mut forward = map.clone();
    for i in 0..200 {
        forward = forward.delete(&i).0;
        forward.validate_invariants().unwrap();
    }
    assert!(forward.is_empty());

    let mut backward = map;
    for i in (0..200).rev() {
        backward = backward.delete(&i).0;
        backward.validate_invariants().unwrap();
    }
    assert!(backward.is_empty());
}

#[test]
fn equality_ignores_tree_shape() {
    let ascending: TreeMap<u32, u32> = (0..64).map(|i| (i, i)).collect();
    let descending: TreeMap<u32, u32> = (0..64).rev().map(|i| (i, i)).collect();
    assert!(!ascending.ptr_eq(&descending));
    assert_eq!(ascending, descending);
    assert_ne!(ascending, descending.set(3, 4));
}

#[test]
fn iteration_is_restartable() {
    let map: TreeMap<u32, u32> = [(3, 0), (1, 0), (2, 0)].into_iter().collect();
    let first: Vec<_> = map.keys().collect();
    let second: Vec<_> = map.keys().collect();
    assert_eq!(first, second);
    assert_eq!(map.iter().len(), 3);
}

#[test]
fn set_is_a_map_with_unit_values() {
    let set: TreeSet<&str> = ["b", "a", "c", "a"].into_iter().collect();
    assert_eq!(set.len(), 3);
    assert!(set.contains("a"));
    assert!(set.insert("a").ptr_eq(&set));
    assert!(set.remove("z").ptr_eq(&set));
    assert_eq!(set.remove("b").iter().copied().collect::<Vec<_>>(), vec!["a", "c"]);
}

#[derive(Clone, Debug)]
enum Op {
    Set(u8, u8),
    Delete(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), any::<u8>()).prop_map(|(k, v)| Op::Set(k, v)),
        any::<u8>().prop_map(Op::Delete),
    ]
}

proptest! {
    #[test]
    fn traversal_is_sorted_and_distinct(keys in prop::collection::vec(any::<u16>(), 0..200)) {
        let map: TreeMap<u16, ()> = keys.iter().map(|k| (*k, ())).collect();
        let mut expected = keys.clone();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(map.keys().copied().collect::<Vec<_>>(), expected);
        map.validate_invariants().unwrap();
    }

    #[test]
    fn matches_a_btreemap(ops in prop::collection::vec(op(), 0..300)) {
        let mut map = TreeMap::new();
        let mut model = BTreeMap::new();
        for op in ops {
            match op {
                Op::Set(k, v) => {
                    let had = model.contains_key(&k);
                    let before = map.len();
                    map = map.set(k, v);
                    model.insert(k, v);
                    prop_assert_eq!(map.len(), if had { before } else { before + 1 });
                }
                Op::Delete(k) => {
                    let (next, removed) = map.delete(&k);
                    let expected = model.remove(&k);
                    prop_assert_eq!(removed, expected);
                    if expected.is_none() {
                        prop_assert!(next.ptr_eq(&map));
                    } else {
                        prop_assert_eq!(next.len(), map.len() - 1);
                    }
                    map = next;
                }
            }
            map.validate_invariants().unwrap();
        }
        prop_assert_eq!(
            map.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            model.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn no_op_set_preserves_identity(
        keys in prop::collection::vec(any::<u8>(), 1..100),
        pick in any::<prop::sample::Index>(),
    ) {
        let map: TreeMap<u8, u8> = keys.iter().map(|k| (*k, k.wrapping_mul(3))).collect();
        let key = keys[pick.index(keys.len())];
        let value = *map.get(&key).unwrap();
        prop_assert!(map.set(key, value).ptr_eq(&map));
    }

    #[test]
    fn insertion_order_does_not_matter(
        mut pairs in prop::collection::btree_map(any::<u16>(), any::<u16>(), 0..100)
            .prop_map(|m| m.into_iter().collect::<Vec<_>>()),
        seed in any::<u64>(),
    ) {
        let forward: TreeMap<u16, u16> = pairs.iter().copied().collect();
        let len = pairs.len();
        if len > 1 {
            let shift = (seed as usize) % len;
            pairs.rotate_left(shift);
            pairs.reverse();
        }
        let shuffled: TreeMap<u16, u16> = pairs.into_iter().collect();
        prop_assert_eq!(forward, shuffled);
    }
}
