//! Test that deleting a key that is not present leaves the tree intact.

use crate::e2e_tests::helpers::*;

#[test]
fn test_delete_absent_from_root_leaf_leaves_file_untouched() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(255);
    insert_all(&mut tree, (0..100).map(|k| k * 2));
    tree.sync().expect("sync");
    let before = std::fs::read(scratch.path()).expect("read file");

    for key in [-5, 1, 51, 199, 1000] {
        tree.delete(key).expect("delete absent");
    }
    tree.sync().expect("sync");

    assert_eq!(std::fs::read(scratch.path()).expect("read file"), before);
    assert_all_found(&mut tree, (0..100).map(|k| k * 2));
}

#[test]
fn test_delete_absent_from_deep_tree() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(2);
    let keys: Vec<_> = (0..300).map(|k| k * 3).collect();
    insert_all(&mut tree, keys.iter().copied());

    // Restructuring on the way down is allowed; the key set is not touched.
    for key in [-1, 1, 302, 899, 10_000] {
        tree.delete(key).expect("delete absent");
        let stats = tree.verify().expect("verify");
        assert_eq!(stats.keys, keys.len());
    }
    assert_all_found(&mut tree, keys);
}

#[test]
fn test_delete_from_empty_tree() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(2);
    tree.delete(7).expect("delete from empty tree");
    assert_eq!(tree.block_count(), 1);
    assert_none_found(&mut tree, [7]);
}
