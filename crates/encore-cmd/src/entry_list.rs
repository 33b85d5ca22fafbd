//! Recording side: the deferred command list.

use core::fmt;

use encore_staging::{StagingBlockId, StagingPool, StagingPoolError};
use tracing::debug;

use crate::arena::StorageBlock;
use crate::opcode::{Opcode, END_OF_BLOCK};
use crate::records::{
    ClearColorTargetRecord, ClearDepthStencilRecord, CopyBufferRecord, CopyTextureRecord,
    DispatchIndirectRecord, DispatchRecord, DrawIndexedIndirectRecord, DrawIndexedRecord,
    DrawIndirectRecord, DrawRecord, GenerateMipmapsRecord, IndexFormat, InsertDebugMarkerRecord,
    PushDebugGroupRecord, Record, ResolveTextureRecord, SetFramebufferRecord,
    SetIndexBufferRecord, SetPipelineRecord, SetResourceSetRecord, SetScissorRectRecord,
    SetVertexBufferRecord, SetViewportRecord, TextureRegion, UpdateBufferRecord, Viewport,
    MAX_INLINE_DYNAMIC_OFFSETS,
};
use crate::track::ReferenceTable;

/// Storage block capacity used by [`EntryList::new`], in bytes.
pub const DEFAULT_BLOCK_CAPACITY: usize = 40_000;

/// Placement of one encoded entry: which block it landed in, where its
/// opcode byte sits, and where a tail sentinel belongs if the entry left
/// room for one in the same block.
struct Chunk {
    block: usize,
    offset: usize,
    terminator: Option<usize>,
}

/// A deferred command list.
///
/// Commands are encoded as a one-byte opcode followed by a fixed-size
/// payload, packed back to back into fixed-capacity [`StorageBlock`]s, and
/// replayed later in recording order against an
/// [`Executor`](crate::Executor). Recording a command never allocates once
/// the list and pool have warmed up, which is the point: recording happens
/// on the hot path, replay on the submit path.
///
/// `R` is the caller's resource representation (buffers, textures,
/// pipelines, resource sets); the list treats it as opaque and stores it in
/// a side [`ReferenceTable`] so entry storage stays plain bytes.
pub struct EntryList<R> {
    blocks: Vec<StorageBlock>,
    /// Index of the block most recently allocated from. Earlier blocks are
    /// full or nearly so; later ones may have been skipped by a spanning
    /// entry and still have room.
    current: usize,
    block_capacity: usize,
    total_entries: usize,
    refs: ReferenceTable<R>,
    /// Ids of every staging block rented during this session, returned to
    /// the pool wholesale on reset or dispose.
    staging: Vec<StagingBlockId>,
}

impl<R> EntryList<R> {
    /// A list with the default block capacity.
    pub fn new() -> Self {
        Self::with_block_capacity(DEFAULT_BLOCK_CAPACITY)
    }

    /// A list whose blocks hold `block_capacity` bytes each. Recording an
    /// entry wider than one block panics, so full-catalog lists want at
    /// least [`max_entry_size`](crate::max_entry_size) bytes.
    pub fn with_block_capacity(block_capacity: usize) -> Self {
        assert!(block_capacity > 0, "block capacity must be non-zero");
        Self {
            blocks: vec![StorageBlock::with_capacity(block_capacity)],
            current: 0,
            block_capacity,
            total_entries: 0,
            refs: ReferenceTable::new(),
            staging: Vec::new(),
        }
    }

    /// Number of entries recorded since the last reset.
    pub fn entry_count(&self) -> usize {
        self.total_entries
    }

    /// Number of storage blocks the list currently owns.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn storage(&self) -> &[StorageBlock] {
        &self.blocks
    }

    pub(crate) fn references(&self) -> &ReferenceTable<R> {
        &self.refs
    }

    #[cfg(test)]
    pub(crate) fn corrupt_byte(&mut self, block: usize, offset: usize, value: u8) {
        self.blocks[block].write_byte(offset, value);
    }

    pub fn begin(&mut self) {
        self.push_plain(Opcode::Begin);
    }

    pub fn end(&mut self) {
        self.push_plain(Opcode::End);
    }

    pub fn clear_color_target(&mut self, index: u32, color: [f32; 4]) {
        self.push_record(ClearColorTargetRecord { index, color });
    }

    pub fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) {
        self.push_record(ClearDepthStencilRecord {
            depth,
            stencil: u32::from(stencil),
        });
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.push_record(DrawRecord {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        self.push_record(DrawIndexedRecord {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        });
    }

    pub fn draw_indirect(
        &mut self,
        buffer: R,
        offset_bytes: u32,
        draw_count: u32,
        stride_bytes: u32,
    ) {
        let buffer = self.refs.track(buffer);
        self.push_record(DrawIndirectRecord {
            buffer,
            offset_bytes,
            draw_count,
            stride_bytes,
        });
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: R,
        offset_bytes: u32,
        draw_count: u32,
        stride_bytes: u32,
    ) {
        let buffer = self.refs.track(buffer);
        self.push_record(DrawIndexedIndirectRecord {
            buffer,
            offset_bytes,
            draw_count,
            stride_bytes,
        });
    }

    pub fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.push_record(DispatchRecord {
            group_count_x,
            group_count_y,
            group_count_z,
        });
    }

    pub fn dispatch_indirect(&mut self, buffer: R, offset_bytes: u32) {
        let buffer = self.refs.track(buffer);
        self.push_record(DispatchIndirectRecord {
            buffer,
            offset_bytes,
        });
    }

    pub fn set_framebuffer(&mut self, framebuffer: R) {
        let framebuffer = self.refs.track(framebuffer);
        self.push_record(SetFramebufferRecord { framebuffer });
    }

    pub fn set_index_buffer(&mut self, buffer: R, format: IndexFormat, offset_bytes: u32) {
        let buffer = self.refs.track(buffer);
        self.push_record(SetIndexBufferRecord {
            buffer,
            format: format as u32,
            offset_bytes,
        });
    }

    pub fn set_pipeline(&mut self, pipeline: R) {
        let pipeline = self.refs.track(pipeline);
        self.push_record(SetPipelineRecord { pipeline });
    }

    pub fn set_graphics_resource_set(
        &mut self,
        pool: &mut StagingPool,
        slot: u32,
        resource_set: R,
        dynamic_offsets: &[u32],
    ) -> Result<(), StagingPoolError> {
        self.set_resource_set(pool, slot, resource_set, dynamic_offsets, true)
    }

    pub fn set_compute_resource_set(
        &mut self,
        pool: &mut StagingPool,
        slot: u32,
        resource_set: R,
        dynamic_offsets: &[u32],
    ) -> Result<(), StagingPoolError> {
        self.set_resource_set(pool, slot, resource_set, dynamic_offsets, false)
    }

    fn set_resource_set(
        &mut self,
        pool: &mut StagingPool,
        slot: u32,
        resource_set: R,
        dynamic_offsets: &[u32],
        graphics: bool,
    ) -> Result<(), StagingPoolError> {
        let mut inline = [0u32; MAX_INLINE_DYNAMIC_OFFSETS];
        let mut spilled = StagingBlockId::from_raw(0);
        if dynamic_offsets.len() > MAX_INLINE_DYNAMIC_OFFSETS {
            let id = pool.get_block(core::mem::size_of_val(dynamic_offsets))?;
            self.staging.push(id);
            pool.block_mut(id)
                .expect("just-rented block resolves")
                .copy_from_slice(bytemuck::cast_slice(dynamic_offsets));
            spilled = id;
        } else {
            inline[..dynamic_offsets.len()].copy_from_slice(dynamic_offsets);
        }
        let resource_set = self.refs.track(resource_set);
        self.push_record(SetResourceSetRecord {
            slot,
            resource_set,
            graphics: u32::from(graphics),
            dynamic_offset_count: dynamic_offsets.len() as u32,
            dynamic_offsets_inline: inline,
            dynamic_offsets_block: spilled,
        });
        Ok(())
    }

    pub fn set_scissor_rect(&mut self, index: u32, x: u32, y: u32, width: u32, height: u32) {
        self.push_record(SetScissorRectRecord {
            index,
            x,
            y,
            width,
            height,
        });
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: R, offset_bytes: u32) {
        let buffer = self.refs.track(buffer);
        self.push_record(SetVertexBufferRecord {
            slot,
            buffer,
            offset_bytes,
        });
    }

    pub fn set_viewport(&mut self, index: u32, viewport: &Viewport) {
        self.push_record(SetViewportRecord {
            index,
            viewport: *viewport,
        });
    }

    pub fn update_buffer(
        &mut self,
        pool: &mut StagingPool,
        buffer: R,
        offset_bytes: u32,
        data: &[u8],
    ) -> Result<(), StagingPoolError> {
        let staging = self.stage(pool, data)?;
        let buffer = self.refs.track(buffer);
        self.push_record(UpdateBufferRecord {
            buffer,
            offset_bytes,
            staging,
            len_bytes: data.len() as u32,
        });
        Ok(())
    }

    pub fn copy_buffer(
        &mut self,
        source: R,
        source_offset: u32,
        destination: R,
        destination_offset: u32,
        len_bytes: u32,
    ) {
        let record = CopyBufferRecord {
            source: self.refs.track(source),
            source_offset,
            destination: self.refs.track(destination),
            destination_offset,
            len_bytes,
        };
        self.push_record(record);
    }

    pub fn copy_texture(&mut self, source: R, destination: R, region: &TextureRegion) {
        let record = CopyTextureRecord {
            source: self.refs.track(source),
            destination: self.refs.track(destination),
            region: *region,
        };
        self.push_record(record);
    }

    pub fn resolve_texture(&mut self, source: R, destination: R) {
        let record = ResolveTextureRecord {
            source: self.refs.track(source),
            destination: self.refs.track(destination),
        };
        self.push_record(record);
    }

    pub fn generate_mipmaps(&mut self, texture: R) {
        let texture = self.refs.track(texture);
        self.push_record(GenerateMipmapsRecord { texture });
    }

    pub fn push_debug_group(
        &mut self,
        pool: &mut StagingPool,
        name: &str,
    ) -> Result<(), StagingPoolError> {
        let record = PushDebugGroupRecord {
            name: self.stage(pool, name.as_bytes())?,
            len_bytes: name.len() as u32,
        };
        self.push_record(record);
        Ok(())
    }

    pub fn pop_debug_group(&mut self) {
        self.push_plain(Opcode::PopDebugGroup);
    }

    pub fn insert_debug_marker(
        &mut self,
        pool: &mut StagingPool,
        name: &str,
    ) -> Result<(), StagingPoolError> {
        let record = InsertDebugMarkerRecord {
            name: self.stage(pool, name.as_bytes())?,
            len_bytes: name.len() as u32,
        };
        self.push_record(record);
        Ok(())
    }

    /// Returns every rented staging block, drops all tracked references,
    /// and zero-clears entry storage for a fresh session. Storage blocks
    /// are kept, so a warmed-up list records without allocating.
    pub fn reset(&mut self, pool: &mut StagingPool) {
        debug!(
            entries = self.total_entries,
            blocks = self.blocks.len(),
            staging = self.staging.len(),
            "resetting command list"
        );
        self.flush_staging(pool);
        self.refs.clear();
        self.total_entries = 0;
        self.current = 0;
        for block in &mut self.blocks {
            block.clear();
        }
    }

    /// Returns every rented staging block and releases entry storage.
    /// Dropping a list without disposing it leaks its staging rentals,
    /// since the pool cannot be reached from `Drop`.
    pub fn dispose(mut self, pool: &mut StagingPool) {
        debug!(
            entries = self.total_entries,
            blocks = self.blocks.len(),
            staging = self.staging.len(),
            "disposing command list"
        );
        self.flush_staging(pool);
    }

    fn flush_staging(&mut self, pool: &mut StagingPool) {
        for id in self.staging.drain(..) {
            pool.free(id);
        }
    }

    fn stage(
        &mut self,
        pool: &mut StagingPool,
        bytes: &[u8],
    ) -> Result<StagingBlockId, StagingPoolError> {
        let id = pool.stage(bytes)?;
        self.staging.push(id);
        Ok(id)
    }

    fn push_record<T: Record>(&mut self, record: T) {
        let payload = bytemuck::bytes_of(&record);
        debug_assert_eq!(payload.len(), T::OPCODE.payload_size());
        let chunk = self.chunk(1 + payload.len());
        let block = &mut self.blocks[chunk.block];
        block.write_byte(chunk.offset, T::OPCODE as u8);
        block.write(chunk.offset + 1, payload);
        if let Some(at) = chunk.terminator {
            block.write_byte(at, END_OF_BLOCK);
        }
        self.total_entries += 1;
    }

    fn push_plain(&mut self, opcode: Opcode) {
        let chunk = self.chunk(1);
        let block = &mut self.blocks[chunk.block];
        block.write_byte(chunk.offset, opcode as u8);
        if let Some(at) = chunk.terminator {
            block.write_byte(at, END_OF_BLOCK);
        }
        self.total_entries += 1;
    }

    /// Places one entry of `size` bytes. The sentinel slot is only claimed
    /// when the entry leaves spare capacity; a block filled to the brim
    /// ends implicitly.
    fn chunk(&mut self, size: usize) -> Chunk {
        assert!(
            size <= self.block_capacity,
            "entry of {size} bytes exceeds the {}-byte block capacity",
            self.block_capacity
        );
        let (block, offset) = self.alloc_entry(size);
        let terminator = if self.blocks[block].remaining() > 0 {
            Some(offset + size)
        } else {
            None
        };
        Chunk {
            block,
            offset,
            terminator,
        }
    }

    fn alloc_entry(&mut self, size: usize) -> (usize, usize) {
        if let Some(offset) = self.blocks[self.current].alloc(size) {
            return (self.current, offset);
        }
        // Entries never move backwards: blocks before `current` stay
        // untouched so replay order matches recording order.
        for index in self.current + 1..self.blocks.len() {
            if let Some(offset) = self.blocks[index].alloc(size) {
                self.current = index;
                return (index, offset);
            }
        }
        let mut block = StorageBlock::with_capacity(self.block_capacity);
        let offset = block.alloc(size).expect("checked against block capacity");
        self.blocks.push(block);
        self.current = self.blocks.len() - 1;
        debug!(
            blocks = self.blocks.len(),
            capacity = self.block_capacity,
            "command list grew"
        );
        (self.current, offset)
    }
}

impl<R> Default for EntryList<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for EntryList<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryList")
            .field("entries", &self.total_entries)
            .field("blocks", &self.blocks.len())
            .field("tracked", &self.refs.len())
            .field("staging", &self.staging.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1 byte opcode + 16 byte payload.
    const DRAW_ENTRY: usize = 17;

    #[test]
    fn entries_pack_back_to_back_with_a_tail_sentinel() {
        let mut list = EntryList::<()>::with_block_capacity(64);
        list.begin();
        list.draw(3, 1, 0, 0);

        let bytes = list.storage()[0].bytes();
        assert_eq!(bytes[0], Opcode::Begin as u8);
        assert_eq!(bytes[1], Opcode::Draw as u8);
        assert_eq!(&bytes[2..6], 3u32.to_le_bytes());
        assert_eq!(bytes[1 + DRAW_ENTRY], END_OF_BLOCK);
        assert_eq!(list.entry_count(), 2);
    }

    #[test]
    fn full_block_spills_into_a_fresh_one() {
        let mut list = EntryList::<()>::with_block_capacity(DRAW_ENTRY * 2 + 1);
        for _ in 0..5 {
            list.draw(3, 1, 0, 0);
        }
        assert_eq!(list.block_count(), 3);
        assert_eq!(list.current, 2);
        assert_eq!(list.entry_count(), 5);
    }

    #[test]
    fn exactly_full_block_skips_the_terminator() {
        let mut list = EntryList::<()>::with_block_capacity(DRAW_ENTRY);
        list.draw(3, 1, 0, 0);
        assert_eq!(list.storage()[0].remaining(), 0);
        list.draw(4, 1, 0, 0);
        assert_eq!(list.block_count(), 2);
    }

    #[test]
    fn reset_zeroes_storage_and_keeps_blocks() {
        let mut pool = StagingPool::new();
        let mut list = EntryList::with_block_capacity(DRAW_ENTRY);
        list.draw(3, 1, 0, 0);
        list.draw(3, 1, 0, 0);
        list.update_buffer(&mut pool, "staging-buffer", 0, &[1, 2, 3, 4])
            .unwrap();
        assert_eq!(pool.free_count(), 0);

        list.reset(&mut pool);
        assert_eq!(list.entry_count(), 0);
        assert_eq!(list.current, 0);
        assert_eq!(list.block_count(), 3);
        assert_eq!(pool.free_count(), 1);
        for block in list.storage() {
            assert!(block.bytes().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn dispose_returns_staging_rentals() {
        let mut pool = StagingPool::new();
        let mut list = EntryList::new();
        list.push_debug_group(&mut pool, "frame").unwrap();
        list.insert_debug_marker(&mut pool, "draw").unwrap();
        list.set_graphics_resource_set(&mut pool, 0, "set", &[0; 11])
            .unwrap();
        assert_eq!(pool.block_count(), 3);

        list.dispose(&mut pool);
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn inline_offsets_do_not_touch_the_pool() {
        let mut pool = StagingPool::new();
        let mut list = EntryList::new();
        list.set_graphics_resource_set(&mut pool, 0, "set", &[4; MAX_INLINE_DYNAMIC_OFFSETS])
            .unwrap();
        assert_eq!(pool.block_count(), 0);

        list.set_graphics_resource_set(&mut pool, 1, "set", &[4; MAX_INLINE_DYNAMIC_OFFSETS + 1])
            .unwrap();
        assert_eq!(pool.block_count(), 1);
    }

    #[test]
    fn staged_recorders_track_their_resources() {
        let mut pool = StagingPool::new();
        let mut list = EntryList::new();
        list.update_buffer(&mut pool, "uniforms", 16, &[0; 8]).unwrap();
        list.set_graphics_resource_set(&mut pool, 0, "set", &[4; MAX_INLINE_DYNAMIC_OFFSETS + 1])
            .unwrap();

        assert_eq!(list.entry_count(), 2);
        assert_eq!(list.references().len(), 2);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn oversized_entry_panics() {
        let mut list = EntryList::<()>::with_block_capacity(8);
        list.draw(1, 1, 0, 0);
    }
}
