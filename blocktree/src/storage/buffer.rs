//! Raw block buffers.
//!
//! The tree reads and writes whole 4KB blocks. A [`BlockBuffer`] is the
//! byte-level view of one of them; the block codec reads and writes its header
//! words, keys and child offsets through [`BlockBuffer::get`] and
//! [`BlockBuffer::put`].

/// Block size in bytes (4KB).
pub const BLOCK_SIZE: usize = 4096;

/// Block size as u64 for offset calculations.
pub const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;

/// A fixed-width integer stored little-endian inside a block.
pub trait LeField: Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Decode from exactly `WIDTH` bytes.
    fn from_le(bytes: &[u8]) -> Self;

    /// Encode into exactly `WIDTH` bytes.
    fn to_le(self, out: &mut [u8]);
}

macro_rules! le_field {
    ($($ty:ty),*) => {$(
        impl LeField for $ty {
            const WIDTH: usize = size_of::<$ty>();

            fn from_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }

            fn to_le(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }
        }
    )*};
}

le_field!(u16, u32, i32);

/// One block's worth of bytes, heap allocated.
pub struct BlockBuffer(Box<[u8; BLOCK_SIZE]>);

impl BlockBuffer {
    /// A zeroed buffer.
    #[must_use]
    pub fn new() -> Self {
        Self(Box::new([0; BLOCK_SIZE]))
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.0[..]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }

    pub fn zero(&mut self) {
        self.0.fill(0);
    }

    /// Field of type `T` starting at byte `at`.
    ///
    /// Panics if the field runs past the end of the block; callers use the
    /// fixed layout offsets only.
    #[must_use]
    pub fn get<T: LeField>(&self, at: usize) -> T {
        T::from_le(&self.0[at..at + T::WIDTH])
    }

    /// Store `value` at byte `at`.
    pub fn put<T: LeField>(&mut self, at: usize, value: T) {
        value.to_le(&mut self.0[at..at + T::WIDTH]);
    }
}

impl Default for BlockBuffer {
    fn default() -> Self {
        Self::new()
    }
}
