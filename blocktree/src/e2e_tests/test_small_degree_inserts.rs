//! Test a handful of inserts into a minimum-degree-2 tree.

use crate::e2e_tests::helpers::*;

#[test]
fn test_small_degree_inserts() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(2);

    let keys = [5, 3, 8, 1, 4, 7, 9, 2, 6];
    for key in keys {
        tree.insert(key).expect("insert");
        tree.verify().expect("verify after insert");
    }

    assert_all_found(&mut tree, keys);
    assert_none_found(&mut tree, [100, 0, 10, -1]);

    let stats = tree.verify().expect("verify");
    assert_eq!(stats.keys, 9);
    assert!(stats.height >= 2);
}

#[test]
fn test_search_reports_block_and_slot() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(2);
    insert_all(&mut tree, [5, 3, 8, 1, 4, 7, 9, 2, 6]);

    for key in 1..=9 {
        let location = tree.search(key).expect("search").expect("found");
        let block = crate::storage::BlockStore::open(&scratch.path())
            .expect("open store")
            .read(location.block)
            .expect("read block");
        assert_eq!(block.keys()[location.index], key);
        assert_eq!(location.offset(), location.block.offset());
    }
}
