//! Block file I/O.
//!
//! The store owns the backing file and moves whole blocks between it and
//! memory. Blocks are addressed by [`BlockId`]; new blocks are appended at the
//! end of the file and never reclaimed.

use std::collections::TryReserveError;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::storage::block::{Block, BlockError, BlockId, MAX_BLOCKS};
use crate::storage::buffer::{BLOCK_SIZE, BLOCK_SIZE_U64, BlockBuffer};

/// A block file handle.
pub struct BlockStore {
    file: File,
    path: PathBuf,
    /// Blocks currently in the file, free ones included.
    block_count: u32,
    scratch: BlockBuffer,
}

impl BlockStore {
    /// Open the block file at `path`, creating it if absent.
    ///
    /// A newly created file is empty; the caller decides how to initialise it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(StoreError::Io)?;

        let len = file.metadata().map_err(StoreError::Io)?.len();
        if !len.is_multiple_of(BLOCK_SIZE_U64) {
            return Err(StoreError::MisalignedFile { len });
        }
        let block_count = u32::try_from(len / BLOCK_SIZE_U64)
            .ok()
            .filter(|&count| u64::from(count) <= MAX_BLOCKS)
            .ok_or(StoreError::FileFull)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            block_count,
            scratch: BlockBuffer::new(),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of blocks in the file, free ones included.
    #[must_use]
    pub const fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Whether the file holds no blocks at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    /// Allocate an empty in-memory block with no disk location.
    pub fn allocate(&self, leaf: bool) -> Result<Block, StoreError> {
        Block::try_new(leaf).map_err(StoreError::AllocationFailure)
    }

    /// Read a live block.
    ///
    /// Fails if the block is truncated, does not decode, records a different
    /// location than the one it was read from, or is marked free.
    pub fn read(&mut self, id: BlockId) -> Result<Block, StoreError> {
        let block = self.inspect(id)?;
        if block.id() != Some(id) {
            return Err(StoreError::MisplacedBlock {
                offset: id.offset(),
                recorded: block.id().map(BlockId::offset),
            });
        }
        if block.is_free() {
            return Err(StoreError::FreeBlockReached {
                offset: id.offset(),
            });
        }
        Ok(block)
    }

    /// Read the block behind `parent`'s child pointer at `index`.
    pub fn read_child(&mut self, parent: &Block, index: usize) -> Result<Block, StoreError> {
        let id = parent.child(index).ok_or_else(|| StoreError::NoSuchChild {
            index,
            children: parent.children().len(),
        })?;
        self.read(id)
    }

    /// Decode the block at `id` without liveness checks.
    ///
    /// Used to look at abandoned blocks; tree code goes through [`Self::read`].
    pub fn inspect(&mut self, id: BlockId) -> Result<Block, StoreError> {
        let offset = id.offset();
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(StoreError::Io)?;

        let len = read_full(&mut self.file, self.scratch.bytes_mut()).map_err(StoreError::Io)?;
        if len < BLOCK_SIZE {
            return Err(StoreError::CorruptBlock {
                offset,
                source: BlockError::Truncated { len },
            });
        }

        let mut block = self.allocate(false)?;
        block
            .decode(&self.scratch)
            .map_err(|source| StoreError::CorruptBlock { offset, source })?;

        trace!(offset, keys = block.len(), leaf = block.is_leaf(), "read block");
        Ok(block)
    }

    /// Write a block.
    ///
    /// A block that already has an id is overwritten in place; otherwise it is
    /// appended at the end of the file and given the new id.
    pub fn write(&mut self, block: &mut Block) -> Result<BlockId, StoreError> {
        let (id, appending) = if let Some(id) = block.id() {
            (id, false)
        } else {
            if u64::from(self.block_count) >= MAX_BLOCKS {
                return Err(StoreError::FileFull);
            }
            (BlockId::new(self.block_count), true)
        };
        let offset = id.offset();

        block
            .encode(id, &mut self.scratch)
            .map_err(|source| StoreError::CorruptBlock { offset, source })?;

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(StoreError::Io)?;
        self.file
            .write_all(self.scratch.bytes())
            .map_err(StoreError::Io)?;

        if appending {
            self.block_count += 1;
        }
        block.id = Some(id);

        trace!(offset, keys = block.len(), appended = appending, "wrote block");
        Ok(id)
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.file.sync_all().map_err(StoreError::Io)
    }

    /// Sync and release the file.
    pub fn close(self) -> Result<(), StoreError> {
        self.sync()
    }
}

/// Read until `buf` is full or the file ends, returning the bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Errors that can occur during block file operations.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error.
    Io(std::io::Error),
    /// Block bytes are short or do not decode.
    CorruptBlock { offset: u64, source: BlockError },
    /// Block records a different location than the one it was read from.
    MisplacedBlock { offset: u64, recorded: Option<u64> },
    /// A live pointer leads to a block marked free.
    FreeBlockReached { offset: u64 },
    /// Child index past the end of the parent's children.
    NoSuchChild { index: usize, children: usize },
    /// File length is not a whole number of blocks.
    MisalignedFile { len: u64 },
    /// No more block offsets fit in 32 bits.
    FileFull,
    /// Could not reserve memory for a block.
    AllocationFailure(TryReserveError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::CorruptBlock { offset, source } => {
                write!(f, "corrupt block at offset {offset:#x}: {source}")
            }
            Self::MisplacedBlock { offset, recorded } => match recorded {
                Some(recorded) => write!(
                    f,
                    "block at offset {offset:#x} records offset {recorded:#x}"
                ),
                None => write!(f, "block at offset {offset:#x} was never written"),
            },
            Self::FreeBlockReached { offset } => {
                write!(f, "reached freed block at offset {offset:#x}")
            }
            Self::NoSuchChild { index, children } => {
                write!(f, "child {index} requested from block with {children} children")
            }
            Self::MisalignedFile { len } => {
                write!(f, "file length {len} is not a multiple of {BLOCK_SIZE}")
            }
            Self::FileFull => write!(f, "block file is full"),
            Self::AllocationFailure(e) => write!(f, "block allocation failed: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::CorruptBlock { source, .. } => Some(source),
            Self::AllocationFailure(e) => Some(e),
            Self::MisplacedBlock { .. }
            | Self::FreeBlockReached { .. }
            | Self::NoSuchChild { .. }
            | Self::MisalignedFile { .. }
            | Self::FileFull => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
