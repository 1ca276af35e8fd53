//! Tree blocks and their on-disk encoding.
//!
//! Every tree node occupies exactly one 4KB block. Layout (little-endian):
//!
//! | offset | size | field                                     |
//! |-------:|-----:|-------------------------------------------|
//! | 0      | 2    | `key_count`                               |
//! | 2      | 2    | `flags` (`LEAF`, `ON_DISK`, `MARK_FREE`)  |
//! | 4      | 4    | byte offset of this block in the file     |
//! | 8      | 2    | minimum degree `T` (block 0 only, else 0) |
//! | 10     | 10   | reserved                                  |
//! | 20     | 2036 | 509 keys (`i32`)                          |
//! | 2056   | 2040 | 510 child byte offsets (`u32`)            |
//!
//! Unused key and child slots are zero.

#![allow(clippy::cast_possible_truncation)]

use std::collections::TryReserveError;

use crate::storage::buffer::{BLOCK_SIZE, BLOCK_SIZE_U64, BlockBuffer};

/// Keys stored in the tree.
pub type Key = i32;

/// Maximum number of keys in a block.
pub const MAX_KEYS: usize = 509;

/// Maximum number of child pointers in a block.
pub const MAX_CHILDREN: usize = MAX_KEYS + 1;

/// Smallest usable minimum degree.
pub const MIN_DEGREE_FLOOR: usize = 2;

/// Largest minimum degree whose full block (`2T - 1` keys) still fits.
pub const MIN_DEGREE_CEILING: usize = MAX_CHILDREN / 2;

/// Number of addressable blocks. Offsets are stored as `u32`.
pub const MAX_BLOCKS: u64 = (u32::MAX as u64 + 1) / BLOCK_SIZE_U64;

const KEY_COUNT_OFFSET: usize = 0;
const FLAGS_OFFSET: usize = 2;
const SELF_OFFSET: usize = 4;
const DEGREE_OFFSET: usize = 8;
const HEADER_SIZE: usize = 20;
const KEYS_OFFSET: usize = HEADER_SIZE;
const CHILDREN_OFFSET: usize = KEYS_OFFSET + MAX_KEYS * 4;

const _: () = assert!(CHILDREN_OFFSET + MAX_CHILDREN * 4 == BLOCK_SIZE);

/// Identity of a block: its index in the file.
///
/// The byte offset is `index * BLOCK_SIZE`. Index 0 always holds the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u32);

impl BlockId {
    /// The block at the head of the file.
    pub const ROOT: Self = Self(0);

    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Block index within the file.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Byte offset of the block within the file.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0 as u64 * BLOCK_SIZE_U64
    }

    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }

    /// Offset as stored on disk. Callers keep the index below `MAX_BLOCKS`.
    const fn disk_offset(self) -> u32 {
        self.0 * BLOCK_SIZE as u32
    }

    /// Parse an on-disk offset, rejecting anything not on a block boundary.
    #[must_use]
    pub const fn from_disk_offset(offset: u32) -> Option<Self> {
        if offset.is_multiple_of(BLOCK_SIZE as u32) {
            Some(Self(offset / BLOCK_SIZE as u32))
        } else {
            None
        }
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block {} (offset {:#x})", self.0, self.offset())
    }
}

/// Flag word stored in every block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFlags(u16);

impl BlockFlags {
    /// Block has no children.
    pub const LEAF: Self = Self(0x0001);
    /// Block has a real file offset.
    pub const ON_DISK: Self = Self(0x0002);
    /// Block storage is abandoned.
    pub const MARK_FREE: Self = Self(0x0004);

    const KNOWN: u16 = 0x0007;

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns `None` if any unknown bit is set.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Option<Self> {
        if bits & !Self::KNOWN == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// One tree node.
///
/// Internal blocks with `n` keys have `n + 1` children; `children[i]` holds
/// the keys strictly between `keys[i - 1]` and `keys[i]`. Leaves have no
/// children. A block without an id has never been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub(crate) id: Option<BlockId>,
    pub(crate) leaf: bool,
    pub(crate) free: bool,
    /// Minimum degree the tree was built with. Recorded in block 0 only.
    pub(crate) degree: Option<u16>,
    pub(crate) keys: Vec<Key>,
    pub(crate) children: Vec<BlockId>,
}

impl Block {
    /// Create an empty, unwritten block with room for a full node.
    pub fn try_new(leaf: bool) -> Result<Self, TryReserveError> {
        let mut keys = Vec::new();
        keys.try_reserve_exact(MAX_KEYS)?;
        let mut children = Vec::new();
        children.try_reserve_exact(MAX_CHILDREN)?;

        Ok(Self {
            id: None,
            leaf,
            free: false,
            degree: None,
            keys,
            children,
        })
    }

    #[must_use]
    pub const fn id(&self) -> Option<BlockId> {
        self.id
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.leaf
    }

    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.free
    }

    #[must_use]
    pub fn recorded_degree(&self) -> Option<usize> {
        self.degree.map(usize::from)
    }

    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[must_use]
    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    /// Number of keys.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn child(&self, index: usize) -> Option<BlockId> {
        self.children.get(index).copied()
    }

    /// Header flags as they would be written.
    #[must_use]
    pub const fn flags(&self) -> BlockFlags {
        let mut flags = BlockFlags::empty();
        if self.leaf {
            flags.insert(BlockFlags::LEAF);
        }
        if self.id.is_some() {
            flags.insert(BlockFlags::ON_DISK);
        }
        if self.free {
            flags.insert(BlockFlags::MARK_FREE);
        }
        flags
    }

    /// Serialize the block as it will live at `id`.
    pub fn encode(&self, id: BlockId, buf: &mut BlockBuffer) -> Result<(), BlockError> {
        if self.keys.len() > MAX_KEYS {
            return Err(BlockError::KeyCountOutOfRange(self.keys.len()));
        }
        if let Some(index) = first_unordered(&self.keys) {
            return Err(BlockError::KeysOutOfOrder { index });
        }
        let expected_children = if self.leaf { 0 } else { self.keys.len() + 1 };
        if self.children.len() != expected_children {
            return Err(BlockError::ChildCountMismatch {
                keys: self.keys.len(),
                children: self.children.len(),
            });
        }

        let mut flags = self.flags();
        flags.insert(BlockFlags::ON_DISK);

        buf.zero();
        buf.put(KEY_COUNT_OFFSET, self.keys.len() as u16);
        buf.put(FLAGS_OFFSET, flags.bits());
        buf.put(SELF_OFFSET, id.disk_offset());
        buf.put(DEGREE_OFFSET, self.degree.unwrap_or(0));
        for (i, &key) in self.keys.iter().enumerate() {
            buf.put(KEYS_OFFSET + i * 4, key);
        }
        for (i, child) in self.children.iter().enumerate() {
            buf.put(CHILDREN_OFFSET + i * 4, child.disk_offset());
        }

        Ok(())
    }

    /// Replace this block's contents with the block encoded in `buf`.
    ///
    /// Reuses the existing key and child storage.
    pub fn decode(&mut self, buf: &BlockBuffer) -> Result<(), BlockError> {
        let raw_flags = buf.get(FLAGS_OFFSET);
        let flags = BlockFlags::from_bits(raw_flags).ok_or(BlockError::UnknownFlags(raw_flags))?;

        let count = usize::from(buf.get::<u16>(KEY_COUNT_OFFSET));
        if count > MAX_KEYS {
            return Err(BlockError::KeyCountOutOfRange(count));
        }

        let raw_offset = buf.get(SELF_OFFSET);
        let id = if flags.contains(BlockFlags::ON_DISK) {
            Some(BlockId::from_disk_offset(raw_offset).ok_or(BlockError::MisalignedOffset(raw_offset))?)
        } else {
            None
        };

        let degree = match buf.get::<u16>(DEGREE_OFFSET) {
            0 => None,
            t if (MIN_DEGREE_FLOOR..=MIN_DEGREE_CEILING).contains(&usize::from(t)) => Some(t),
            t => return Err(BlockError::DegreeOutOfRange(t)),
        };

        let leaf = flags.contains(BlockFlags::LEAF);

        self.keys.clear();
        for i in 0..count {
            let key = buf.get::<Key>(KEYS_OFFSET + i * 4);
            if self.keys.last().is_some_and(|&prev| prev >= key) {
                return Err(BlockError::KeysOutOfOrder { index: i });
            }
            self.keys.push(key);
        }

        self.children.clear();
        if !leaf {
            for i in 0..=count {
                let raw = buf.get::<u32>(CHILDREN_OFFSET + i * 4);
                // Offset 0 is the root, which is nobody's child.
                let child = BlockId::from_disk_offset(raw)
                    .filter(|c| !c.is_root())
                    .ok_or(BlockError::MisalignedChild { index: i, offset: raw })?;
                self.children.push(child);
            }
        }

        self.id = id;
        self.leaf = leaf;
        self.free = flags.contains(BlockFlags::MARK_FREE);
        self.degree = degree;

        Ok(())
    }
}

fn first_unordered(keys: &[Key]) -> Option<usize> {
    keys.windows(2).position(|w| w[0] >= w[1]).map(|i| i + 1)
}

/// Errors produced while encoding or decoding a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// Fewer than `BLOCK_SIZE` bytes were available.
    Truncated { len: usize },
    /// Flag word has bits outside `LEAF | ON_DISK | MARK_FREE`.
    UnknownFlags(u16),
    /// Key count exceeds `MAX_KEYS`.
    KeyCountOutOfRange(usize),
    /// Keys are not strictly increasing at `index`.
    KeysOutOfOrder { index: usize },
    /// Child pointer is zero or not on a block boundary.
    MisalignedChild { index: usize, offset: u32 },
    /// Recorded self offset is not on a block boundary.
    MisalignedOffset(u32),
    /// Recorded minimum degree is neither 0 nor a supported degree.
    DegreeOutOfRange(u16),
    /// Internal block without exactly one more child than keys, or leaf with children.
    ChildCountMismatch { keys: usize, children: usize },
}

impl std::fmt::Display for BlockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { len } => {
                write!(f, "truncated block: {len} of {BLOCK_SIZE} bytes")
            }
            Self::UnknownFlags(bits) => write!(f, "unknown block flags: 0x{bits:04x}"),
            Self::KeyCountOutOfRange(count) => {
                write!(f, "key count {count} out of range (max {MAX_KEYS})")
            }
            Self::KeysOutOfOrder { index } => write!(f, "keys out of order at index {index}"),
            Self::MisalignedChild { index, offset } => {
                write!(f, "child {index} has invalid offset {offset:#x}")
            }
            Self::MisalignedOffset(offset) => write!(f, "block offset {offset:#x} is misaligned"),
            Self::DegreeOutOfRange(t) => write!(f, "recorded minimum degree {t} is unsupported"),
            Self::ChildCountMismatch { keys, children } => {
                write!(f, "block with {keys} keys has {children} children")
            }
        }
    }
}

impl std::error::Error for BlockError {}
