//! Block-file storage engine.
//!
//! A single-file B-tree index over `i32` keys.
//!
//! # File Format
//!
//! The file is a flat sequence of 4KB blocks, each holding one tree node:
//!
//! - Block 0: the current root
//! - Remaining blocks: interior and leaf nodes, plus blocks abandoned by
//!   merges (flagged `MARK_FREE`, never reused)
//!
//! There is no separate header, magic number or checksum. Block 0 records the
//! minimum degree the tree was built with. An empty tree is a root leaf with no
//! keys.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use blocktree::storage::{BlockTree, TreeOptions};
//!
//! let mut tree = BlockTree::open_with(Path::new("btree.dat"), TreeOptions::default())?;
//! tree.insert(42)?;
//! assert!(tree.search(42)?.is_some());
//! tree.delete(42)?;
//! tree.close()?;
//! # Ok::<(), blocktree::storage::TreeError>(())
//! ```

mod block;
mod buffer;
mod store;
mod tree;

pub use block::{
    Block, BlockError, BlockFlags, BlockId, Key, MAX_BLOCKS, MAX_CHILDREN, MAX_KEYS,
    MIN_DEGREE_CEILING, MIN_DEGREE_FLOOR,
};
pub use buffer::{BLOCK_SIZE, BLOCK_SIZE_U64, BlockBuffer, LeField};
pub use store::{BlockStore, StoreError};
pub use tree::{BlockTree, ErrorKind, KeyLocation, TreeError, TreeOptions, TreeStats};
