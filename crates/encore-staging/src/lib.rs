//! Pooled staging memory for bulk command payloads.
//!
//! Recorded command lists borrow scratch blocks from a [`StagingPool`] for
//! data that does not fit in a fixed-size command payload (buffer upload
//! contents, long dynamic-offset arrays, debug label bytes) and return them
//! once the recording is retired. Freed blocks are kept and handed out
//! again for later rentals, so steady-state recording does not allocate.

use core::fmt;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;
use tracing::debug;

/// Smallest capacity ever allocated for a block, in bytes. Renting less
/// still yields a block of at least this size so tiny payloads can share
/// recycled storage.
pub const MIN_BLOCK_CAPACITY: usize = 128;

/// Identifies one pool-owned block. Ids are indices into the pool's block
/// list and stay valid for the lifetime of the pool, across any number of
/// free/rent cycles.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct StagingBlockId(u32);

impl StagingBlockId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Returned when a rental would push the pool past its configured byte
/// budget.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StagingPoolError {
    #[error(
        "staging budget exhausted: requested {requested} bytes with {allocated} of {budget} already allocated"
    )]
    BudgetExhausted {
        requested: usize,
        allocated: usize,
        budget: usize,
    },
}

/// Backing storage is `u64` words so every block starts 8-aligned; renters
/// may reinterpret the bytes as any 4-byte scalar slice.
struct Block {
    words: Box<[u64]>,
    capacity: usize,
    len: usize,
    rented: bool,
}

impl Block {
    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.capacity]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.capacity]
    }
}

/// Grow-only pool of reusable staging blocks.
///
/// Freed blocks are indexed by capacity and rentals take the smallest free
/// block that fits, allocating a new one only when nothing free is large
/// enough. Blocks are never returned to the allocator while the pool lives.
pub struct StagingPool {
    blocks: Vec<Block>,
    /// `(capacity, id)` of every free block, sorted by ascending capacity.
    available: Vec<(usize, StagingBlockId)>,
    budget: Option<usize>,
    allocated: usize,
}

impl StagingPool {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            available: Vec::new(),
            budget: None,
            allocated: 0,
        }
    }

    /// A pool that refuses to grow past `budget` bytes of total capacity.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }

    /// Copies `source` into a rented block and returns its id. The staged
    /// length is exactly `source.len()`.
    pub fn stage(&mut self, source: &[u8]) -> Result<StagingBlockId, StagingPoolError> {
        let id = self.rent(source.len())?;
        self.blocks[id.index()].bytes_mut()[..source.len()].copy_from_slice(source);
        Ok(id)
    }

    /// Rents a block of `size` bytes for the caller to fill through
    /// [`block_mut`](Self::block_mut). Contents are zero on first
    /// allocation and stale after reuse.
    pub fn get_block(&mut self, size: usize) -> Result<StagingBlockId, StagingPoolError> {
        self.rent(size)
    }

    /// Mutable view of the rented bytes of `id`, `None` if the id was never
    /// issued by this pool.
    pub fn block_mut(&mut self, id: StagingBlockId) -> Option<&mut [u8]> {
        let block = self.blocks.get_mut(id.index())?;
        let len = block.len;
        Some(&mut block.bytes_mut()[..len])
    }

    /// The staged bytes of `id`, `None` if the id was never issued by this
    /// pool.
    pub fn staged_bytes(&self, id: StagingBlockId) -> Option<&[u8]> {
        let block = self.blocks.get(id.index())?;
        Some(&block.bytes()[..block.len])
    }

    /// Returns `id` to the pool for reuse. Freeing an id that is not
    /// currently rented is a caller bug; release builds ignore it.
    pub fn free(&mut self, id: StagingBlockId) {
        let Some(block) = self.blocks.get_mut(id.index()) else {
            debug_assert!(false, "freed unknown staging block {id:?}");
            return;
        };
        debug_assert!(block.rented, "double free of staging block {id:?}");
        if !block.rented {
            return;
        }
        block.rented = false;
        let capacity = block.capacity;
        let at = self.available.partition_point(|&(cap, _)| cap < capacity);
        self.available.insert(at, (capacity, id));
    }

    /// Total capacity in bytes of every block ever allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Number of blocks owned by the pool, rented or free.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of blocks currently free for rent.
    pub fn free_count(&self) -> usize {
        self.available.len()
    }

    fn rent(&mut self, size: usize) -> Result<StagingBlockId, StagingPoolError> {
        // `available` is sorted by capacity, so the first free block at or
        // past `size` is the smallest one that fits.
        let at = self.available.partition_point(|&(cap, _)| cap < size);
        if at < self.available.len() {
            let (_, id) = self.available.remove(at);
            let block = &mut self.blocks[id.index()];
            block.len = size;
            block.rented = true;
            return Ok(id);
        }
        self.allocate(size)
    }

    fn allocate(&mut self, size: usize) -> Result<StagingBlockId, StagingPoolError> {
        let capacity = size.max(MIN_BLOCK_CAPACITY);
        if let Some(budget) = self.budget {
            if self.allocated + capacity > budget {
                return Err(StagingPoolError::BudgetExhausted {
                    requested: size,
                    allocated: self.allocated,
                    budget,
                });
            }
        }
        let id = StagingBlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            words: vec![0u64; capacity.div_ceil(8)].into_boxed_slice(),
            capacity,
            len: size,
            rented: true,
        });
        self.allocated += capacity;
        debug!(
            id = id.raw(),
            capacity,
            total_bytes = self.allocated,
            "staging pool grew"
        );
        Ok(id)
    }
}

impl Default for StagingPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StagingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingPool")
            .field("blocks", &self.blocks.len())
            .field("free", &self.available.len())
            .field("allocated_bytes", &self.allocated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_copies_source_bytes() {
        let mut pool = StagingPool::new();
        let id = pool.stage(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(pool.staged_bytes(id), Some(&[1u8, 2, 3, 4, 5][..]));
    }

    #[test]
    fn small_rentals_share_min_capacity() {
        let mut pool = StagingPool::new();
        let id = pool.stage(&[7; 4]).unwrap();
        assert_eq!(pool.allocated_bytes(), MIN_BLOCK_CAPACITY);
        assert_eq!(pool.staged_bytes(id).unwrap().len(), 4);
    }

    #[test]
    fn free_then_rent_reuses_the_block() {
        let mut pool = StagingPool::new();
        let first = pool.stage(&[0; 16]).unwrap();
        pool.free(first);
        assert_eq!(pool.free_count(), 1);

        let second = pool.get_block(64).unwrap();
        assert_eq!(second, first);
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.staged_bytes(second).unwrap().len(), 64);

        // Nothing free now, so another rental grows the pool.
        let third = pool.get_block(64).unwrap();
        assert_ne!(third, first);
        assert_eq!(pool.block_count(), 2);
    }

    #[test]
    fn rent_takes_the_smallest_free_block_that_fits() {
        let mut pool = StagingPool::new();
        let big = pool.stage(&[0; 512]).unwrap();
        let small = pool.stage(&[0; 16]).unwrap();
        pool.free(big);
        pool.free(small);

        assert_eq!(pool.get_block(100).unwrap(), small);
        assert_eq!(pool.get_block(100).unwrap(), big);
    }

    #[test]
    fn block_mut_exposes_exactly_the_rented_length() {
        let mut pool = StagingPool::new();
        let id = pool.get_block(10).unwrap();
        pool.block_mut(id).unwrap().copy_from_slice(&[9; 10]);
        assert_eq!(pool.staged_bytes(id), Some(&[9u8; 10][..]));

        pool.free(id);
        let id = pool.get_block(5).unwrap();
        assert_eq!(pool.block_mut(id).unwrap().len(), 5);
    }

    #[test]
    fn budget_bounds_total_allocation() {
        let mut pool = StagingPool::with_budget(MIN_BLOCK_CAPACITY);
        let first = pool.stage(&[0; 16]).unwrap();
        assert_eq!(
            pool.stage(&[0; 16]),
            Err(StagingPoolError::BudgetExhausted {
                requested: 16,
                allocated: MIN_BLOCK_CAPACITY,
                budget: MIN_BLOCK_CAPACITY,
            })
        );

        // Freeing makes the existing block rentable again without growth.
        pool.free(first);
        assert!(pool.stage(&[0; 16]).is_ok());
        assert_eq!(pool.allocated_bytes(), MIN_BLOCK_CAPACITY);
    }

    #[test]
    fn staged_bytes_are_word_aligned() {
        let mut pool = StagingPool::new();
        let offsets: [u32; 12] = core::array::from_fn(|i| i as u32 * 64);
        let id = pool.stage(bytemuck::cast_slice(&offsets)).unwrap();
        // cast_slice panics on misaligned input, so this doubles as an
        // alignment check.
        let staged: &[u32] = bytemuck::cast_slice(pool.staged_bytes(id).unwrap());
        assert_eq!(staged, &offsets);
    }

    #[test]
    fn unknown_ids_do_not_resolve() {
        let pool = StagingPool::new();
        assert_eq!(pool.staged_bytes(StagingBlockId::from_raw(3)), None);
    }
}
