//! Disk-resident B-tree over fixed-size blocks.
//!
//! The tree is a classic multiway B-tree of minimum degree `T`: every block
//! other than the root holds between `T - 1` and `2T - 1` keys. The root lives
//! at block 0 and is cached in memory; every other block is read from the
//! store each time it is visited and written back after every mutation.
//!
//! Growth happens only by splitting a full root. When the root is emptied by
//! a merge, its sole child is relocated to block 0. Blocks abandoned by merges
//! are marked free and never reused.

use std::path::Path;

use tracing::{debug, info};

use crate::storage::block::{Block, BlockId, Key, MIN_DEGREE_CEILING, MIN_DEGREE_FLOOR};
use crate::storage::store::{BlockStore, StoreError};

/// Options for opening a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// Minimum degree `T`. Recorded in block 0 when the file is created; the
    /// file must be reopened with the same value.
    pub min_degree: usize,
}

impl TreeOptions {
    /// Largest degree that fits a 4KB block.
    pub const DEFAULT_MIN_DEGREE: usize = MIN_DEGREE_CEILING;

    #[must_use]
    pub const fn with_min_degree(mut self, min_degree: usize) -> Self {
        self.min_degree = min_degree;
        self
    }

    /// Check that a full block (`2T - 1` keys) fits the block format.
    pub const fn validate(&self) -> Result<(), TreeError> {
        if self.min_degree < MIN_DEGREE_FLOOR || self.min_degree > MIN_DEGREE_CEILING {
            return Err(TreeError::InvalidMinDegree(self.min_degree));
        }
        Ok(())
    }
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            min_degree: Self::DEFAULT_MIN_DEGREE,
        }
    }
}

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLocation {
    pub block: BlockId,
    pub index: usize,
}

impl KeyLocation {
    /// Byte offset of the block holding the key.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.block.offset()
    }
}

/// Shape of the live tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of levels; a lone root leaf is height 1.
    pub height: usize,
    /// Live blocks reachable from the root.
    pub blocks: usize,
    /// Keys stored.
    pub keys: usize,
}

/// A B-tree backed by a single block file.
pub struct BlockTree {
    store: BlockStore,
    /// In-memory copy of block 0, kept identical to what is on disk.
    root: Block,
    min_degree: usize,
}

impl BlockTree {
    /// Open the tree at `path` with default options.
    pub fn open(path: &Path) -> Result<Self, TreeError> {
        Self::open_with(path, TreeOptions::default())
    }

    /// Open the tree at `path`, creating an empty tree if the file is new.
    ///
    /// An existing file must have been built with `options.min_degree`;
    /// otherwise this fails with [`TreeError::DegreeMismatch`].
    pub fn open_with(path: &Path, options: TreeOptions) -> Result<Self, TreeError> {
        options.validate()?;
        let mut store = BlockStore::open(path)?;

        let root = if store.is_empty() {
            let mut root = store.allocate(true)?;
            root.degree = degree_word(options.min_degree);
            store.write(&mut root)?;
            info!(
                path = %path.display(),
                min_degree = options.min_degree,
                "initialised empty tree"
            );
            root
        } else {
            let root = store.read(BlockId::ROOT)?;
            let recorded = root.recorded_degree();
            if recorded != Some(options.min_degree) {
                return Err(TreeError::DegreeMismatch {
                    recorded,
                    requested: options.min_degree,
                });
            }
            info!(
                path = %path.display(),
                blocks = store.block_count(),
                root_keys = root.len(),
                min_degree = options.min_degree,
                "opened tree"
            );
            root
        };

        Ok(Self {
            store,
            root,
            min_degree: options.min_degree,
        })
    }

    #[must_use]
    pub const fn min_degree(&self) -> usize {
        self.min_degree
    }

    /// The cached root block.
    #[must_use]
    pub const fn root(&self) -> &Block {
        &self.root
    }

    /// Where the root lives. Always block 0, whatever the height.
    #[must_use]
    pub const fn root_id(&self) -> BlockId {
        BlockId::ROOT
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Blocks in the file, including abandoned ones.
    #[must_use]
    pub const fn block_count(&self) -> u32 {
        self.store.block_count()
    }

    const fn max_keys(&self) -> usize {
        2 * self.min_degree - 1
    }

    /// Find the block and slot holding `key`.
    pub fn search(&mut self, key: Key) -> Result<Option<KeyLocation>, TreeError> {
        let mut next = match probe(&self.root, key)? {
            Probe::Descend(child) => child,
            Probe::Found(location) => return Ok(Some(location)),
            Probe::Missing => return Ok(None),
        };

        loop {
            let block = self.store.read(next)?;
            next = match probe(&block, key)? {
                Probe::Descend(child) => child,
                Probe::Found(location) => return Ok(Some(location)),
                Probe::Missing => return Ok(None),
            };
        }
    }

    pub fn contains(&mut self, key: Key) -> Result<bool, TreeError> {
        Ok(self.search(key)?.is_some())
    }

    /// Insert a key.
    ///
    /// Keys are unique: inserting a key that is already present fails with
    /// [`TreeError::DuplicateKey`] before anything is written.
    pub fn insert(&mut self, key: Key) -> Result<(), TreeError> {
        if self.search(key)?.is_some() {
            return Err(TreeError::DuplicateKey(key));
        }
        if self.root.len() >= self.max_keys() {
            self.grow_root()?;
        }
        self.insert_non_full(key)
    }

    /// Move the full root out of block 0 and split it under a new root.
    fn grow_root(&mut self) -> Result<(), TreeError> {
        let mut old_root = self.root.clone();
        old_root.id = None;
        let relocated = self.persist(&mut old_root)?;

        let mut new_root = self.store.allocate(false)?;
        new_root.id = Some(BlockId::ROOT);
        new_root.children.push(relocated);

        debug!(%relocated, "root full, growing tree");
        self.split_child(&mut new_root, 0, old_root)
    }

    fn insert_non_full(&mut self, key: Key) -> Result<(), TreeError> {
        let mut node = self.root.clone();

        loop {
            let mut index = node.keys.partition_point(|&k| k < key);

            if node.leaf {
                node.keys.insert(index, key);
                self.persist(&mut node)?;
                return Ok(());
            }

            let mut child = self.store.read_child(&node, index)?;
            if child.len() >= self.max_keys() {
                self.split_child(&mut node, index, child)?;
                if key > node.keys[index] {
                    index += 1;
                }
                child = self.store.read_child(&node, index)?;
            }
            node = child;
        }
    }

    /// Split the full child at `index` of `parent`, promoting its median.
    ///
    /// The child keeps its first `T - 1` keys, a new sibling takes the last
    /// `T - 1`. Child, sibling and parent are written in that order.
    fn split_child(
        &mut self,
        parent: &mut Block,
        index: usize,
        mut full: Block,
    ) -> Result<(), TreeError> {
        let t = self.min_degree;
        let mut sibling = self.store.allocate(full.leaf)?;

        sibling.keys.extend(full.keys.drain(t..));
        let Some(median) = full.keys.pop() else {
            return Err(broken("split of a block with fewer than T keys"));
        };
        if !full.leaf {
            sibling.children.extend(full.children.drain(t..));
        }

        self.persist(&mut full)?;
        let sibling_id = self.persist(&mut sibling)?;

        parent.keys.insert(index, median);
        parent.children.insert(index + 1, sibling_id);
        self.persist(parent)?;
        Ok(())
    }

    /// Delete a key. Deleting an absent key is a no-op.
    pub fn delete(&mut self, key: Key) -> Result<(), TreeError> {
        let t = self.min_degree;
        let mut target = key;
        let mut node = self.root.clone();

        loop {
            if node.keys.is_empty() {
                return Ok(());
            }

            match node.keys.binary_search(&target) {
                Ok(index) if node.leaf => {
                    node.keys.remove(index);
                    self.persist(&mut node)?;
                    return Ok(());
                }
                Ok(index) => {
                    let before = self.store.read_child(&node, index)?;
                    if before.len() >= t {
                        let predecessor = self.subtree_max(&before)?;
                        node.keys[index] = predecessor;
                        self.persist(&mut node)?;
                        target = predecessor;
                        node = before;
                        continue;
                    }

                    let after = self.store.read_child(&node, index + 1)?;
                    if after.len() >= t {
                        let successor = self.subtree_min(&after)?;
                        node.keys[index] = successor;
                        self.persist(&mut node)?;
                        target = successor;
                        node = after;
                        continue;
                    }

                    node = self.merge_children(node, index, before, after)?;
                }
                Err(_) if node.leaf => return Ok(()),
                Err(index) => {
                    let child = self.store.read_child(&node, index)?;
                    node = if child.len() < t {
                        self.enrich_child(node, index, child)?
                    } else {
                        child
                    };
                }
            }
        }
    }

    /// Give the minimal child at `index` a spare key before descending into
    /// it, by rotating through the parent or merging with a sibling.
    fn enrich_child(
        &mut self,
        mut parent: Block,
        index: usize,
        mut child: Block,
    ) -> Result<Block, TreeError> {
        let t = self.min_degree;

        let mut left = match index.checked_sub(1) {
            Some(left_index) => Some(self.store.read_child(&parent, left_index)?),
            None => None,
        };
        if let Some(donor) = left.as_mut().filter(|b| b.len() >= t) {
            rotate_from_left(&mut parent, index, donor, &mut child)?;
            self.persist(&mut child)?;
            self.persist(&mut parent)?;
            self.persist(donor)?;
            return Ok(child);
        }

        let mut right = if index < parent.keys.len() {
            Some(self.store.read_child(&parent, index + 1)?)
        } else {
            None
        };
        if let Some(donor) = right.as_mut().filter(|b| b.len() >= t) {
            rotate_from_right(&mut parent, index, donor, &mut child)?;
            self.persist(&mut child)?;
            self.persist(&mut parent)?;
            self.persist(donor)?;
            return Ok(child);
        }

        match (left, right) {
            (Some(left), _) => self.merge_children(parent, index - 1, left, child),
            (None, Some(right)) => self.merge_children(parent, index, child, right),
            (None, None) => Err(broken("internal block with a single child")),
        }
    }

    /// Merge `right` and the separator at `index` into `left`.
    ///
    /// `right` is marked free. If the parent is the root and is left without
    /// keys, the merged block becomes the root. Returns the merged block.
    fn merge_children(
        &mut self,
        mut parent: Block,
        index: usize,
        mut left: Block,
        mut right: Block,
    ) -> Result<Block, TreeError> {
        let separator = parent.keys.remove(index);
        parent.children.remove(index + 1);

        left.keys.push(separator);
        left.keys.extend_from_slice(&right.keys);
        left.children.extend_from_slice(&right.children);

        right.free = true;
        self.persist(&mut right)?;

        let collapse = parent.id == Some(BlockId::ROOT) && parent.keys.is_empty();
        if collapse {
            // The merged block's own slot is abandoned; its bytes move to block 0.
            left.free = true;
        }
        let merged_id = self.persist(&mut left)?;
        debug!(%merged_id, keys = left.len(), "merged blocks");

        if collapse {
            left.free = false;
            left.id = Some(BlockId::ROOT);
            self.persist(&mut left)?;
            debug!(abandoned = %merged_id, keys = left.len(), "root collapsed into its only child");
            return Ok(left);
        }

        self.persist(&mut parent)?;
        Ok(left)
    }

    /// Largest key in the subtree rooted at `block`.
    fn subtree_max(&mut self, block: &Block) -> Result<Key, TreeError> {
        if block.leaf {
            return block.keys.last().copied().ok_or_else(|| broken("empty leaf"));
        }
        let mut node = self.store.read_child(block, block.keys.len())?;
        while !node.leaf {
            node = self.store.read_child(&node, node.keys.len())?;
        }
        node.keys.last().copied().ok_or_else(|| broken("empty leaf"))
    }

    /// Smallest key in the subtree rooted at `block`.
    fn subtree_min(&mut self, block: &Block) -> Result<Key, TreeError> {
        if block.leaf {
            return block.keys.first().copied().ok_or_else(|| broken("empty leaf"));
        }
        let mut node = self.store.read_child(block, 0)?;
        while !node.leaf {
            node = self.store.read_child(&node, 0)?;
        }
        node.keys.first().copied().ok_or_else(|| broken("empty leaf"))
    }

    /// Write a block, refreshing the cached root when block 0 is written.
    ///
    /// Only block 0 carries the minimum degree.
    fn persist(&mut self, block: &mut Block) -> Result<BlockId, TreeError> {
        block.degree = if block.id == Some(BlockId::ROOT) {
            degree_word(self.min_degree)
        } else {
            None
        };
        let id = self.store.write(block)?;
        if id == BlockId::ROOT {
            self.root.clone_from(block);
        }
        Ok(id)
    }

    /// Count levels, blocks and keys of the live tree.
    pub fn stats(&mut self) -> Result<TreeStats, TreeError> {
        self.walk(false)
    }

    /// Walk the live tree checking every structural invariant.
    ///
    /// Checks key ordering against the bounds inherited from ancestors,
    /// occupancy of non-root blocks, child counts and uniform leaf depth.
    pub fn verify(&mut self) -> Result<TreeStats, TreeError> {
        self.walk(true)
    }

    fn walk(&mut self, strict: bool) -> Result<TreeStats, TreeError> {
        let mut walk = Walk {
            strict,
            stats: TreeStats::default(),
            leaf_depth: None,
        };
        let root = self.root.clone();
        self.walk_block(&root, (None, None), 1, &mut walk)?;
        Ok(walk.stats)
    }

    fn walk_block(
        &mut self,
        block: &Block,
        bounds: (Option<Key>, Option<Key>),
        depth: usize,
        walk: &mut Walk,
    ) -> Result<(), TreeError> {
        walk.stats.blocks += 1;
        walk.stats.keys += block.len();
        walk.stats.height = walk.stats.height.max(depth);

        if walk.strict {
            self.check_block(block, bounds, depth)?;
        }

        if block.leaf {
            match walk.leaf_depth {
                Some(expected) if walk.strict && expected != depth => {
                    return Err(TreeError::InvariantViolation(format!(
                        "leaf at depth {depth}, expected {expected}"
                    )));
                }
                Some(_) => {}
                None => walk.leaf_depth = Some(depth),
            }
            return Ok(());
        }

        for index in 0..block.children.len() {
            let lower = index.checked_sub(1).map(|i| block.keys[i]).or(bounds.0);
            let upper = block.keys.get(index).copied().or(bounds.1);
            let child = self.store.read_child(block, index)?;
            self.walk_block(&child, (lower, upper), depth + 1, walk)?;
        }
        Ok(())
    }

    fn check_block(
        &self,
        block: &Block,
        bounds: (Option<Key>, Option<Key>),
        depth: usize,
    ) -> Result<(), TreeError> {
        let name = block
            .id
            .map_or_else(|| "unwritten block".to_string(), |id| id.to_string());
        let is_root = depth == 1;

        if block.len() > self.max_keys() {
            return Err(TreeError::InvariantViolation(format!(
                "{name} holds {} keys, more than {}",
                block.len(),
                self.max_keys()
            )));
        }
        if !is_root && block.len() < self.min_degree - 1 {
            return Err(TreeError::InvariantViolation(format!(
                "{name} holds {} keys, fewer than {}",
                block.len(),
                self.min_degree - 1
            )));
        }
        if is_root && block.recorded_degree() != Some(self.min_degree) {
            return Err(TreeError::InvariantViolation(format!(
                "root records minimum degree {:?}, tree uses {}",
                block.recorded_degree(),
                self.min_degree
            )));
        }
        if is_root && !block.leaf && block.is_empty() {
            return Err(TreeError::InvariantViolation(
                "internal root without keys".to_string(),
            ));
        }
        if block.keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TreeError::InvariantViolation(format!(
                "{name} keys are not strictly increasing"
            )));
        }
        let (lower, upper) = bounds;
        if let (Some(lower), Some(&first)) = (lower, block.keys.first())
            && first <= lower
        {
            return Err(TreeError::InvariantViolation(format!(
                "{name} key {first} not above bound {lower}"
            )));
        }
        if let (Some(upper), Some(&last)) = (upper, block.keys.last())
            && last >= upper
        {
            return Err(TreeError::InvariantViolation(format!(
                "{name} key {last} not below bound {upper}"
            )));
        }
        let expected_children = if block.leaf { 0 } else { block.len() + 1 };
        if block.children.len() != expected_children {
            return Err(TreeError::InvariantViolation(format!(
                "{name} has {} children for {} keys",
                block.children.len(),
                block.len()
            )));
        }
        Ok(())
    }

    /// Sync all writes to disk.
    pub fn sync(&self) -> Result<(), TreeError> {
        Ok(self.store.sync()?)
    }

    /// Sync and release the backing file.
    pub fn close(self) -> Result<(), TreeError> {
        Ok(self.store.close()?)
    }
}

struct Walk {
    strict: bool,
    stats: TreeStats,
    leaf_depth: Option<usize>,
}

enum Probe {
    Found(KeyLocation),
    Missing,
    Descend(BlockId),
}

/// Decide what a search does at one block.
fn probe(block: &Block, key: Key) -> Result<Probe, TreeError> {
    let index = block.keys.partition_point(|&k| k < key);

    if block.keys.get(index) == Some(&key) {
        let id = block.id.ok_or_else(|| broken("search reached an unwritten block"))?;
        return Ok(Probe::Found(KeyLocation { block: id, index }));
    }
    if block.leaf {
        return Ok(Probe::Missing);
    }
    block
        .child(index)
        .map(Probe::Descend)
        .ok_or(TreeError::Store(StoreError::NoSuchChild {
            index,
            children: block.children.len(),
        }))
}

/// Move the left sibling's largest key up into the parent and the separator
/// down into the front of `child`.
fn rotate_from_left(
    parent: &mut Block,
    index: usize,
    left: &mut Block,
    child: &mut Block,
) -> Result<(), TreeError> {
    let donated = left.keys.pop().ok_or_else(|| broken("empty left sibling"))?;
    let separator = std::mem::replace(&mut parent.keys[index - 1], donated);
    child.keys.insert(0, separator);

    if !child.leaf {
        let moved = left
            .children
            .pop()
            .ok_or_else(|| broken("left sibling without children"))?;
        child.children.insert(0, moved);
    }
    Ok(())
}

/// Move the right sibling's smallest key up into the parent and the separator
/// down onto the end of `child`.
fn rotate_from_right(
    parent: &mut Block,
    index: usize,
    right: &mut Block,
    child: &mut Block,
) -> Result<(), TreeError> {
    if right.keys.is_empty() {
        return Err(broken("empty right sibling"));
    }
    let donated = right.keys.remove(0);
    let separator = std::mem::replace(&mut parent.keys[index], donated);
    child.keys.push(separator);

    if !child.leaf {
        if right.children.is_empty() {
            return Err(broken("right sibling without children"));
        }
        child.children.push(right.children.remove(0));
    }
    Ok(())
}

/// Header encoding of a validated minimum degree.
fn degree_word(min_degree: usize) -> Option<u16> {
    u16::try_from(min_degree).ok()
}

fn broken(message: &str) -> TreeError {
    TreeError::InvariantViolation(message.to_string())
}

/// Broad failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file could not be opened, read or written.
    IoFailure,
    /// The file contents do not form a valid tree.
    CorruptBlock,
    /// Memory for a block could not be reserved.
    AllocationFailure,
    /// The call itself was invalid.
    Usage,
}

/// Errors that can occur during tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Block store error.
    Store(StoreError),
    /// Minimum degree outside the range the block format supports.
    InvalidMinDegree(usize),
    /// Key is already present.
    DuplicateKey(Key),
    /// The file was built with a different minimum degree than requested.
    DegreeMismatch {
        recorded: Option<usize>,
        requested: usize,
    },
    /// The live tree violates a B-tree invariant.
    InvariantViolation(String),
}

impl TreeError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(StoreError::Io(_) | StoreError::FileFull) => ErrorKind::IoFailure,
            Self::Store(StoreError::AllocationFailure(_)) => ErrorKind::AllocationFailure,
            Self::Store(_)
            | Self::InvariantViolation(_)
            | Self::DegreeMismatch { recorded: None, .. } => ErrorKind::CorruptBlock,
            Self::InvalidMinDegree(_) | Self::DuplicateKey(_) | Self::DegreeMismatch { .. } => {
                ErrorKind::Usage
            }
        }
    }
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::InvalidMinDegree(t) => write!(
                f,
                "minimum degree {t} out of range ({MIN_DEGREE_FLOOR}..={MIN_DEGREE_CEILING})"
            ),
            Self::DuplicateKey(key) => write!(f, "key {key} already present"),
            Self::DegreeMismatch {
                recorded: Some(recorded),
                requested,
            } => write!(
                f,
                "file was built with minimum degree {recorded}, opened with {requested}"
            ),
            Self::DegreeMismatch {
                recorded: None,
                requested,
            } => write!(
                f,
                "file records no minimum degree, opened with {requested}"
            ),
            Self::InvariantViolation(msg) => write!(f, "invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::InvalidMinDegree(_)
            | Self::DuplicateKey(_)
            | Self::DegreeMismatch { .. }
            | Self::InvariantViolation(_) => None,
        }
    }
}

impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
