//! Test that sequential inserts grow the tree only through root splits.

use crate::e2e_tests::helpers::*;
use crate::storage::BlockTree;

fn insert_tracking_height(tree: &mut BlockTree, count: i32) {
    let max_keys = 2 * tree.min_degree() - 1;
    let mut height = tree.stats().expect("stats").height;

    for key in 0..count {
        let root_was_full = tree.root().len() == max_keys;
        tree.insert(key).expect("insert");

        let new_height = tree.stats().expect("stats").height;
        if root_was_full {
            assert_eq!(new_height, height + 1, "root split at key {key} must add a level");
        } else {
            assert_eq!(new_height, height, "height changed without a root split at key {key}");
        }
        height = new_height;
    }
}

#[test]
fn test_sequential_inserts_default_degree() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(255);

    insert_tracking_height(&mut tree, 1000);

    let stats = tree.verify().expect("verify");
    assert_eq!(stats.keys, 1000);
    assert_eq!(stats.height, 2);
    assert_all_found(&mut tree, 0..1000);
    assert_none_found(&mut tree, [1000, -1]);
}

#[test]
fn test_sequential_inserts_small_degree() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(3);

    insert_tracking_height(&mut tree, 1000);

    let stats = tree.verify().expect("verify");
    assert_eq!(stats.keys, 1000);
    assert!(stats.height > 3);
    assert_all_found(&mut tree, 0..1000);
    assert_none_found(&mut tree, [1000]);
}
