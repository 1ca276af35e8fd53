//! End-to-end tests against real block files.
//!
//! Each test file covers a specific scenario, using deterministic key orders
//! so failures reproduce.

#![cfg(test)]


mod test_degree_mismatch;
mod test_delete_absent;
mod test_duplicate_keys;
mod test_random_deletes;
mod test_root_collapse;
mod test_sequential_inserts;
mod test_small_degree_inserts;
