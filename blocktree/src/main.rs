#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use blocktree::config::DriverConfig;
use blocktree::storage::{BlockTree, Key, TreeError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Outcome of one driver run.
#[derive(Debug, Default)]
struct RunSummary {
    inserted: usize,
    deleted: usize,
    /// Keys missing right after insertion or still present after deletion.
    mismatches: usize,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blocktree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match DriverConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: path={}, key_count={}, min_degree={}, seed={:?}",
        config.path.display(),
        config.key_count,
        config.min_degree,
        config.seed
    );

    match run(&config) {
        Ok(summary) if summary.mismatches == 0 => {
            tracing::info!(
                inserted = summary.inserted,
                deleted = summary.deleted,
                "run complete"
            );
        }
        Ok(summary) => {
            tracing::error!(
                inserted = summary.inserted,
                deleted = summary.deleted,
                mismatches = summary.mismatches,
                "run finished with unexpected search results"
            );
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!("Tree operation failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Insert every key, searching after each insert, then delete every key,
/// searching after each delete.
fn run(config: &DriverConfig) -> Result<RunSummary, TreeError> {
    let mut tree = BlockTree::open_with(&config.path, config.tree_options())?;
    let mut summary = RunSummary::default();

    for key in 0..config.key_count {
        tree.insert(key)?;
        summary.inserted += 1;
        if tree.search(key)?.is_none() {
            tracing::warn!(key, "key missing right after insert");
            summary.mismatches += 1;
        }
    }

    let stats = tree.stats()?;
    tracing::info!(
        height = stats.height,
        blocks = stats.blocks,
        keys = stats.keys,
        file_blocks = tree.block_count(),
        "all keys inserted"
    );

    let mut order: Vec<Key> = (0..config.key_count).collect();
    if let Some(seed) = config.seed {
        order.shuffle(&mut StdRng::seed_from_u64(seed));
    }

    for key in order {
        tree.delete(key)?;
        summary.deleted += 1;
        match tree.search(key)? {
            None => tracing::debug!(key, "deleted"),
            Some(location) => {
                tracing::warn!(
                    key,
                    offset = location.offset(),
                    index = location.index,
                    "key still present after delete"
                );
                summary.mismatches += 1;
            }
        }
    }

    tree.close()?;
    Ok(summary)
}
