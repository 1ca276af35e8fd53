// A disk-resident B-tree index.
//
// Layers, bottom up:
//  - Block codec: one tree node <-> one 4KB byte buffer
//  - Block store: whole-block reads and writes against a single file
//  - Tree: search / insert / delete over blocks fetched from the store
//
// The driver binary (main.rs) loads `config::DriverConfig` and runs the tree
// over a key range.

pub mod config;
pub mod storage;

#[cfg(test)]
mod e2e_tests;

pub use storage::{BlockTree, ErrorKind, KeyLocation, TreeError, TreeOptions, TreeStats};
