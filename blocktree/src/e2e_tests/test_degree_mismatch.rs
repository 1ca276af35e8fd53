//! Test that a file only reopens with the minimum degree it was built with.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use crate::e2e_tests::helpers::*;
use crate::storage::{BlockTree, ErrorKind, TreeError, TreeOptions};

fn reopen_with(scratch: &Scratch, min_degree: usize) -> Result<BlockTree, TreeError> {
    BlockTree::open_with(
        &scratch.path(),
        TreeOptions::default().with_min_degree(min_degree),
    )
}

#[test]
fn test_reopen_with_other_degree_rejected() {
    let scratch = Scratch::new();
    {
        let mut tree = scratch.open(255);
        insert_all(&mut tree, 0..600);
        tree.close().expect("close");
    }
    let before = std::fs::read(scratch.path()).expect("read file");

    for t in [2, 3, 254] {
        let error = reopen_with(&scratch, t).err().expect("degree mismatch");
        assert!(matches!(
            error,
            TreeError::DegreeMismatch {
                recorded: Some(255),
                requested,
            } if requested == t
        ));
        assert_eq!(error.kind(), ErrorKind::Usage);
    }
    assert_eq!(std::fs::read(scratch.path()).expect("read file"), before);

    let mut tree = scratch.open(255);
    insert_all(&mut tree, 1000..1010);
    let stats = tree.verify().expect("verify");
    assert_eq!(stats.keys, 610);
}

#[test]
fn test_degree_survives_root_growth_and_collapse() {
    let scratch = Scratch::new();
    {
        let mut tree = scratch.open(3);
        insert_all(&mut tree, 0..500);
        for key in 0..498 {
            tree.delete(key).expect("delete");
        }
        assert_eq!(tree.stats().expect("stats").height, 1);
        tree.close().expect("close");
    }

    assert!(reopen_with(&scratch, 2).is_err());
    let mut tree = scratch.open(3);
    assert_all_found(&mut tree, 498..500);
    tree.verify().expect("verify");
}

#[test]
fn test_missing_degree_is_corrupt() {
    let scratch = Scratch::new();
    scratch.open(4).close().expect("close");

    // Clear the degree word in block 0's header.
    let mut file = OpenOptions::new()
        .write(true)
        .open(scratch.path())
        .expect("open file");
    file.seek(SeekFrom::Start(8)).expect("seek");
    file.write_all(&[0, 0]).expect("write");
    drop(file);

    let error = reopen_with(&scratch, 4).err().expect("no recorded degree");
    assert!(matches!(
        error,
        TreeError::DegreeMismatch { recorded: None, .. }
    ));
    assert_eq!(error.kind(), ErrorKind::CorruptBlock);
}
