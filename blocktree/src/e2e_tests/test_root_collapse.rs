//! Test that emptying the root moves its only child to the head of the file.

use crate::e2e_tests::helpers::*;
use crate::storage::{BlockId, BlockStore};

#[test]
fn test_root_collapse_moves_child_to_head() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(2);

    // Root [20] over [10] and [30, 40].
    insert_all(&mut tree, [10, 20, 30, 40]);
    assert_eq!(tree.stats().expect("stats").height, 2);
    let children = tree.root().children().to_vec();
    assert_eq!(children.len(), 2);

    tree.delete(40).expect("delete 40");
    // Both children are minimal now; this merges them under an emptied root.
    tree.delete(10).expect("delete 10");

    assert!(tree.root().is_leaf());
    assert_eq!(tree.root().keys(), &[20, 30]);
    assert_eq!(tree.root().id(), Some(BlockId::ROOT));
    assert_eq!(tree.stats().expect("stats").height, 1);

    for key in [20, 30] {
        let location = tree.search(key).expect("search").expect("found");
        assert_eq!(location.block, BlockId::ROOT);
    }
    assert_none_found(&mut tree, [10, 40]);
    let block_count = tree.block_count();
    tree.close().expect("close");

    let mut store = BlockStore::open(&scratch.path()).expect("open store");
    assert_eq!(store.block_count(), block_count);
    let head = store.read(BlockId::ROOT).expect("read head");
    assert!(head.is_leaf());
    assert_eq!(head.keys(), &[20, 30]);

    for child in children {
        let abandoned = store.inspect(child).expect("inspect abandoned block");
        assert!(abandoned.is_free(), "{child} should be marked free");
        assert!(store.read(child).is_err());
    }
}

#[test]
fn test_height_shrinks_as_keys_drain() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(2);
    insert_all(&mut tree, 0..200);
    let mut height = tree.stats().expect("stats").height;
    assert!(height > 3);

    let mut collapses = 0;
    for key in 0..200 {
        tree.delete(key).expect("delete");
        let new_height = tree.stats().expect("stats").height;
        assert!(new_height <= height, "height grew while deleting {key}");
        if new_height < height {
            collapses += 1;
            assert_eq!(tree.root().id(), Some(tree.root_id()));
            tree.verify().expect("verify after collapse");
            assert_all_found(&mut tree, key + 1..200);
        }
        height = new_height;
    }

    assert!(collapses >= 3);
    assert_eq!(height, 1);
}

#[test]
fn test_collapsed_tree_reopens() {
    let scratch = Scratch::new();
    {
        let mut tree = scratch.open(2);
        insert_all(&mut tree, [10, 20, 30, 40]);
        tree.delete(40).expect("delete");
        tree.delete(10).expect("delete");
        tree.close().expect("close");
    }

    let mut tree = scratch.open(2);
    assert_all_found(&mut tree, [20, 30]);
    assert_none_found(&mut tree, [10, 40]);
    insert_all(&mut tree, [1, 2, 3, 4, 5]);
    tree.verify().expect("verify");
    assert_all_found(&mut tree, [1, 2, 3, 4, 5, 20, 30]);
}
