//! Test deleting every key in a shuffled order.

use std::collections::BTreeSet;

use crate::e2e_tests::helpers::*;
use crate::storage::Key;

#[test]
fn test_random_deletes_default_degree() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(255);
    insert_all(&mut tree, 0..1000);

    let mut remaining: BTreeSet<Key> = (0..1000).collect();
    for key in shuffled(0..1000, 42) {
        tree.delete(key).expect("delete");
        remaining.remove(&key);

        assert_none_found(&mut tree, [key]);
        assert_all_found(&mut tree, remaining.iter().copied());
    }

    let stats = tree.verify().expect("verify");
    assert_eq!(stats.keys, 0);
    assert_eq!(stats.height, 1);
    assert!(tree.root().is_leaf());
}

#[test]
fn test_random_deletes_small_degree() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(2);
    insert_all(&mut tree, shuffled(0..1000, 7));
    tree.verify().expect("verify after inserts");

    let mut remaining: BTreeSet<Key> = (0..1000).collect();
    for (step, key) in shuffled(0..1000, 8).into_iter().enumerate() {
        tree.delete(key).expect("delete");
        remaining.remove(&key);
        assert_none_found(&mut tree, [key]);

        if step % 50 == 0 {
            let stats = tree.verify().expect("verify during deletes");
            assert_eq!(stats.keys, remaining.len());
            assert_all_found(&mut tree, remaining.iter().copied());
        }
    }

    let stats = tree.verify().expect("verify");
    assert_eq!(stats.keys, 0);
    assert_eq!(stats.blocks, 1);
    assert!(tree.root().is_leaf());
    assert!(tree.root().is_empty());
}

#[test]
fn test_interleaved_inserts_and_deletes() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(3);
    let mut live = BTreeSet::new();

    for (step, key) in shuffled(0..2000, 99).into_iter().enumerate() {
        tree.insert(key).expect("insert");
        live.insert(key);

        // Every third step, drop the smallest live key.
        if step % 3 == 2 {
            let smallest = *live.first().expect("non-empty");
            tree.delete(smallest).expect("delete");
            live.remove(&smallest);
        }
    }

    let stats = tree.verify().expect("verify");
    assert_eq!(stats.keys, live.len());
    assert_all_found(&mut tree, live.iter().copied());
    let gone: Vec<Key> = (0..2000).filter(|k| !live.contains(k)).collect();
    assert_none_found(&mut tree, gone);
}
