//! Test that inserting an existing key is rejected without writing.

use crate::e2e_tests::helpers::*;
use crate::storage::{ErrorKind, TreeError};

#[test]
fn test_duplicate_insert_rejected() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(2);
    insert_all(&mut tree, 0..100);
    tree.sync().expect("sync");
    let before = std::fs::read(scratch.path()).expect("read file");

    for key in [0, 50, 99] {
        let error = tree.insert(key).expect_err("duplicate insert");
        assert!(matches!(error, TreeError::DuplicateKey(k) if k == key));
        assert_eq!(error.kind(), ErrorKind::Usage);
    }
    tree.sync().expect("sync");

    assert_eq!(std::fs::read(scratch.path()).expect("read file"), before);
    assert_eq!(tree.verify().expect("verify").keys, 100);
}

#[test]
fn test_reinsert_after_delete() {
    let scratch = Scratch::new();
    let mut tree = scratch.open(3);
    insert_all(&mut tree, 0..50);

    tree.delete(25).expect("delete");
    assert!(!tree.contains(25).expect("contains"));
    tree.insert(25).expect("reinsert");
    assert!(tree.contains(25).expect("contains"));
    assert_eq!(tree.verify().expect("verify").keys, 50);
}
