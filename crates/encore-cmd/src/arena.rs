//! Fixed-capacity storage blocks backing one recorded command list.

use core::fmt;

/// One bump-allocated block of entry storage.
///
/// The backing buffer never moves once the block exists; growing the owning
/// list moves this struct, not the bytes it owns. Contents are zero on
/// creation and after [`clear`](Self::clear), so reading unused storage
/// always yields the end-of-block sentinel.
pub(crate) struct StorageBlock {
    bytes: Box<[u8]>,
    cursor: usize,
}

impl StorageBlock {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
        }
    }

    /// Reserves `size` contiguous bytes and returns their offset, or `None`
    /// if the block cannot hold them. Failure is ordinary control flow; the
    /// caller moves on to another block.
    pub(crate) fn alloc(&mut self, size: usize) -> Option<usize> {
        if self.remaining() < size {
            return None;
        }
        let offset = self.cursor;
        self.cursor += size;
        Some(offset)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    pub(crate) fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Rewinds the cursor and zero-fills the whole buffer. Replay depends
    /// on unused storage reading as opcode 0.
    pub(crate) fn clear(&mut self) {
        self.cursor = 0;
        self.bytes.fill(0);
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn write(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    pub(crate) fn write_byte(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }
}

impl fmt::Debug for StorageBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageBlock")
            .field("capacity", &self.bytes.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_advances_in_address_order() {
        let mut block = StorageBlock::with_capacity(16);
        assert_eq!(block.alloc(4), Some(0));
        assert_eq!(block.alloc(8), Some(4));
        assert_eq!(block.remaining(), 4);
        assert_eq!(block.alloc(5), None);
        assert_eq!(block.alloc(4), Some(12));
        assert_eq!(block.alloc(1), None);
    }

    #[test]
    fn clear_rewinds_and_zeroes() {
        let mut block = StorageBlock::with_capacity(8);
        let at = block.alloc(3).unwrap();
        block.write(at, &[1, 2, 3]);
        block.clear();
        assert_eq!(block.remaining(), 8);
        assert!(block.bytes().iter().all(|&b| b == 0));
        assert_eq!(block.alloc(2), Some(0));
    }

    #[test]
    fn zero_size_alloc_succeeds_at_capacity() {
        let mut block = StorageBlock::with_capacity(2);
        assert_eq!(block.alloc(2), Some(0));
        assert_eq!(block.alloc(0), Some(2));
    }
}
