//! Driver configuration.
//!
//! The driver binary exercises a tree over a range of keys. Its settings come
//! from environment variables.
//!
//! # Environment Variables
//!
//! - `BLOCKTREE_PATH`: Backing file for the tree (default: `./btree.dat`)
//! - `BLOCKTREE_KEY_COUNT`: Number of keys to insert and delete (default: `100000`)
//! - `BLOCKTREE_MIN_DEGREE`: Minimum degree of the tree (default: `255`)
//! - `BLOCKTREE_SEED`: If set, deletions run in an order shuffled with this seed;
//!   otherwise they run in ascending order
//!
//! # Invariants
//!
//! - `key_count` is always positive
//! - `min_degree` is always within the range the block format supports

use std::path::PathBuf;

use crate::storage::{Key, TreeOptions};

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Backing file for the tree.
    pub path: PathBuf,
    /// Keys `0..key_count` are inserted, then deleted.
    pub key_count: Key,
    /// Minimum degree the tree is opened with.
    pub min_degree: usize,
    /// Seed for the deletion order. `None` deletes in ascending order.
    pub seed: Option<u64>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl DriverConfig {
    /// Default backing file.
    pub const DEFAULT_PATH: &'static str = "./btree.dat";
    /// Default number of keys.
    pub const DEFAULT_KEY_COUNT: Key = 100_000;

    const PATH_VAR: &'static str = "BLOCKTREE_PATH";
    const KEY_COUNT_VAR: &'static str = "BLOCKTREE_KEY_COUNT";
    const MIN_DEGREE_VAR: &'static str = "BLOCKTREE_MIN_DEGREE";
    const SEED_VAR: &'static str = "BLOCKTREE_SEED";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse
    /// or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(Self::PATH_VAR)
            .map_or_else(|| PathBuf::from(Self::DEFAULT_PATH), PathBuf::from);

        let key_count = match lookup(Self::KEY_COUNT_VAR) {
            Some(value) => match value.parse::<Key>() {
                Ok(count) if count > 0 => count,
                _ => {
                    return Err(invalid(
                        Self::KEY_COUNT_VAR,
                        format!("'{value}' is not a positive 32-bit integer"),
                    ));
                }
            },
            None => Self::DEFAULT_KEY_COUNT,
        };

        let min_degree = match lookup(Self::MIN_DEGREE_VAR) {
            Some(value) => {
                let options = value
                    .parse::<usize>()
                    .ok()
                    .map(|t| TreeOptions::default().with_min_degree(t))
                    .filter(|options| options.validate().is_ok());
                match options {
                    Some(options) => options.min_degree,
                    None => {
                        return Err(invalid(
                            Self::MIN_DEGREE_VAR,
                            format!("'{value}' is not a supported minimum degree"),
                        ));
                    }
                }
            }
            None => TreeOptions::DEFAULT_MIN_DEGREE,
        };

        let seed = match lookup(Self::SEED_VAR) {
            Some(value) => Some(value.parse::<u64>().map_err(|_| {
                invalid(Self::SEED_VAR, format!("'{value}' is not a valid seed"))
            })?),
            None => None,
        };

        Ok(Self {
            path,
            key_count,
            min_degree,
            seed,
        })
    }

    /// Tree options for this run.
    #[must_use]
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions::default().with_min_degree(self.min_degree)
    }
}

fn invalid(name: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    }
}
