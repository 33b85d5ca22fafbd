//! Replay side: decoding recorded entries and dispatching them in order.

use encore_staging::{StagingBlockId, StagingPool};
use thiserror::Error;
use tracing::debug;

use crate::entry_list::EntryList;
use crate::opcode::{Opcode, END_OF_BLOCK};
use crate::records::{
    ClearColorTargetRecord, ClearDepthStencilRecord, CopyBufferRecord, CopyTextureRecord,
    DispatchIndirectRecord, DispatchRecord, DrawIndexedIndirectRecord, DrawIndexedRecord,
    DrawIndirectRecord, DrawRecord, GenerateMipmapsRecord, IndexFormat, InsertDebugMarkerRecord,
    PushDebugGroupRecord, ResolveTextureRecord, SetFramebufferRecord, SetIndexBufferRecord,
    SetPipelineRecord, SetResourceSetRecord, SetScissorRectRecord, SetVertexBufferRecord,
    SetViewportRecord, TextureRegion, UpdateBufferRecord, Viewport, MAX_INLINE_DYNAMIC_OFFSETS,
};
use crate::track::{ReferenceTable, TrackedHandle};

/// Receiver for replayed commands, one method per catalog opcode.
///
/// The dispatcher hands over fully resolved arguments: handles are already
/// translated back to `&R` and staged payloads to byte slices, so an
/// implementation never touches the encoding. Methods take `&mut self`;
/// replay is single threaded and strictly ordered.
pub trait Executor<R> {
    fn begin(&mut self);
    fn end(&mut self);
    fn clear_color_target(&mut self, index: u32, color: [f32; 4]);
    fn clear_depth_stencil(&mut self, depth: f32, stencil: u8);
    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    );
    fn draw_indirect(&mut self, buffer: &R, offset_bytes: u32, draw_count: u32, stride_bytes: u32);
    fn draw_indexed_indirect(
        &mut self,
        buffer: &R,
        offset_bytes: u32,
        draw_count: u32,
        stride_bytes: u32,
    );
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);
    fn dispatch_indirect(&mut self, buffer: &R, offset_bytes: u32);
    fn set_framebuffer(&mut self, framebuffer: &R);
    fn set_index_buffer(&mut self, buffer: &R, format: IndexFormat, offset_bytes: u32);
    fn set_pipeline(&mut self, pipeline: &R);
    fn set_graphics_resource_set(&mut self, slot: u32, resource_set: &R, dynamic_offsets: &[u32]);
    fn set_compute_resource_set(&mut self, slot: u32, resource_set: &R, dynamic_offsets: &[u32]);
    fn set_scissor_rect(&mut self, index: u32, x: u32, y: u32, width: u32, height: u32);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: &R, offset_bytes: u32);
    fn set_viewport(&mut self, index: u32, viewport: &Viewport);
    fn update_buffer(&mut self, buffer: &R, offset_bytes: u32, data: &[u8]);
    fn copy_buffer(
        &mut self,
        source: &R,
        source_offset: u32,
        destination: &R,
        destination_offset: u32,
        len_bytes: u32,
    );
    fn copy_texture(&mut self, source: &R, destination: &R, region: &TextureRegion);
    fn resolve_texture(&mut self, source: &R, destination: &R);
    fn generate_mipmaps(&mut self, texture: &R);
    fn push_debug_group(&mut self, name: &str);
    fn pop_debug_group(&mut self);
    fn insert_debug_marker(&mut self, name: &str);
}

/// Fatal replay failures.
///
/// Every variant means the recorded stream, the reference table, and the
/// staging pool no longer agree with each other. None is recoverable; the
/// pass stops at the first error with no executor call for the bad entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("invalid opcode {opcode:#04x} at block {block} offset {offset}")]
    InvalidOpcode {
        opcode: u8,
        block: usize,
        offset: usize,
    },

    #[error("recorded stream ended with {remaining} entries undecoded")]
    StreamExhausted { remaining: usize },

    #[error("{opcode:?} payload at block {block} offset {offset} overruns the block")]
    EntryOverrunsBlock {
        opcode: Opcode,
        block: usize,
        offset: usize,
    },

    #[error("tracked handle {handle} at block {block} offset {offset} out of range (table holds {tracked})")]
    UnknownHandle {
        handle: u32,
        tracked: usize,
        block: usize,
        offset: usize,
    },

    #[error("staging block {id} at block {block} offset {offset} is not owned by the replay pool")]
    UnknownStagingBlock {
        id: u32,
        block: usize,
        offset: usize,
    },

    #[error("staging block {id} at block {block} offset {offset} holds {actual} bytes but the entry recorded {recorded}")]
    StagingTooSmall {
        id: u32,
        actual: usize,
        recorded: usize,
        block: usize,
        offset: usize,
    },

    #[error("invalid index format {value} at block {block} offset {offset}")]
    InvalidIndexFormat {
        value: u32,
        block: usize,
        offset: usize,
    },

    #[error("debug label at block {block} offset {offset} is not valid UTF-8")]
    InvalidDebugLabel { block: usize, offset: usize },
}

#[derive(Clone, Copy)]
struct Position {
    block: usize,
    offset: usize,
}

impl<R> EntryList<R> {
    /// Decodes every recorded entry in order and invokes the matching
    /// [`Executor`] operation with resolved arguments.
    ///
    /// Replay does not consume the recording; a second pass over the same
    /// list decodes the same sequence. `pool` must be the pool the list
    /// recorded against, or staged lookups will fail.
    pub fn replay<E: Executor<R>>(
        &self,
        pool: &StagingPool,
        executor: &mut E,
    ) -> Result<(), ReplayError> {
        debug!(
            entries = self.entry_count(),
            blocks = self.block_count(),
            "replaying command list"
        );
        let blocks = self.storage();
        let refs = self.references();
        let mut block = 0usize;
        let mut offset = 0usize;

        for decoded in 0..self.entry_count() {
            // Step to the next live opcode, hopping over exhausted blocks
            // and zeroed block tails.
            let tag = loop {
                let Some(storage) = blocks.get(block) else {
                    return Err(ReplayError::StreamExhausted {
                        remaining: self.entry_count() - decoded,
                    });
                };
                if offset == storage.capacity() {
                    block += 1;
                    offset = 0;
                    continue;
                }
                let tag = storage.bytes()[offset];
                if tag == END_OF_BLOCK {
                    block += 1;
                    offset = 0;
                    continue;
                }
                break tag;
            };

            let opcode = Opcode::from_u8(tag).ok_or(ReplayError::InvalidOpcode {
                opcode: tag,
                block,
                offset,
            })?;
            let payload_at = offset + 1;
            let payload = blocks[block]
                .bytes()
                .get(payload_at..payload_at + opcode.payload_size())
                .ok_or(ReplayError::EntryOverrunsBlock {
                    opcode,
                    block,
                    offset,
                })?;

            dispatch(
                opcode,
                payload,
                refs,
                pool,
                executor,
                Position { block, offset },
            )?;
            offset = payload_at + opcode.payload_size();
        }
        Ok(())
    }
}

fn dispatch<R, E: Executor<R>>(
    opcode: Opcode,
    payload: &[u8],
    refs: &ReferenceTable<R>,
    pool: &StagingPool,
    executor: &mut E,
    at: Position,
) -> Result<(), ReplayError> {
    match opcode {
        Opcode::Begin => executor.begin(),
        Opcode::End => executor.end(),
        Opcode::PopDebugGroup => executor.pop_debug_group(),
        Opcode::ClearColorTarget => {
            let rec: ClearColorTargetRecord = bytemuck::pod_read_unaligned(payload);
            executor.clear_color_target(rec.index, rec.color);
        }
        Opcode::ClearDepthStencil => {
            let rec: ClearDepthStencilRecord = bytemuck::pod_read_unaligned(payload);
            executor.clear_depth_stencil(rec.depth, rec.stencil as u8);
        }
        Opcode::Draw => {
            let rec: DrawRecord = bytemuck::pod_read_unaligned(payload);
            executor.draw(
                rec.vertex_count,
                rec.instance_count,
                rec.first_vertex,
                rec.first_instance,
            );
        }
        Opcode::DrawIndexed => {
            let rec: DrawIndexedRecord = bytemuck::pod_read_unaligned(payload);
            executor.draw_indexed(
                rec.index_count,
                rec.instance_count,
                rec.first_index,
                rec.base_vertex,
                rec.first_instance,
            );
        }
        Opcode::DrawIndirect => {
            let rec: DrawIndirectRecord = bytemuck::pod_read_unaligned(payload);
            executor.draw_indirect(
                resolve(refs, rec.buffer, at)?,
                rec.offset_bytes,
                rec.draw_count,
                rec.stride_bytes,
            );
        }
        Opcode::DrawIndexedIndirect => {
            let rec: DrawIndexedIndirectRecord = bytemuck::pod_read_unaligned(payload);
            executor.draw_indexed_indirect(
                resolve(refs, rec.buffer, at)?,
                rec.offset_bytes,
                rec.draw_count,
                rec.stride_bytes,
            );
        }
        Opcode::Dispatch => {
            let rec: DispatchRecord = bytemuck::pod_read_unaligned(payload);
            executor.dispatch(rec.group_count_x, rec.group_count_y, rec.group_count_z);
        }
        Opcode::DispatchIndirect => {
            let rec: DispatchIndirectRecord = bytemuck::pod_read_unaligned(payload);
            executor.dispatch_indirect(resolve(refs, rec.buffer, at)?, rec.offset_bytes);
        }
        Opcode::SetFramebuffer => {
            let rec: SetFramebufferRecord = bytemuck::pod_read_unaligned(payload);
            executor.set_framebuffer(resolve(refs, rec.framebuffer, at)?);
        }
        Opcode::SetIndexBuffer => {
            let rec: SetIndexBufferRecord = bytemuck::pod_read_unaligned(payload);
            let format =
                IndexFormat::from_u32(rec.format).ok_or(ReplayError::InvalidIndexFormat {
                    value: rec.format,
                    block: at.block,
                    offset: at.offset,
                })?;
            executor.set_index_buffer(resolve(refs, rec.buffer, at)?, format, rec.offset_bytes);
        }
        Opcode::SetPipeline => {
            let rec: SetPipelineRecord = bytemuck::pod_read_unaligned(payload);
            executor.set_pipeline(resolve(refs, rec.pipeline, at)?);
        }
        Opcode::SetResourceSet => {
            let rec: SetResourceSetRecord = bytemuck::pod_read_unaligned(payload);
            let count = rec.dynamic_offset_count as usize;
            let resource_set = resolve(refs, rec.resource_set, at)?;
            let inline;
            let offsets: &[u32] = if count > MAX_INLINE_DYNAMIC_OFFSETS {
                bytemuck::cast_slice(staged(pool, rec.dynamic_offsets_block, count * 4, at)?)
            } else {
                inline = rec.dynamic_offsets_inline;
                &inline[..count]
            };
            if rec.graphics != 0 {
                executor.set_graphics_resource_set(rec.slot, resource_set, offsets);
            } else {
                executor.set_compute_resource_set(rec.slot, resource_set, offsets);
            }
        }
        Opcode::SetScissorRect => {
            let rec: SetScissorRectRecord = bytemuck::pod_read_unaligned(payload);
            executor.set_scissor_rect(rec.index, rec.x, rec.y, rec.width, rec.height);
        }
        Opcode::SetVertexBuffer => {
            let rec: SetVertexBufferRecord = bytemuck::pod_read_unaligned(payload);
            executor.set_vertex_buffer(rec.slot, resolve(refs, rec.buffer, at)?, rec.offset_bytes);
        }
        Opcode::SetViewport => {
            let rec: SetViewportRecord = bytemuck::pod_read_unaligned(payload);
            executor.set_viewport(rec.index, &rec.viewport);
        }
        Opcode::UpdateBuffer => {
            let rec: UpdateBufferRecord = bytemuck::pod_read_unaligned(payload);
            let data = staged(pool, rec.staging, rec.len_bytes as usize, at)?;
            executor.update_buffer(resolve(refs, rec.buffer, at)?, rec.offset_bytes, data);
        }
        Opcode::CopyBuffer => {
            let rec: CopyBufferRecord = bytemuck::pod_read_unaligned(payload);
            executor.copy_buffer(
                resolve(refs, rec.source, at)?,
                rec.source_offset,
                resolve(refs, rec.destination, at)?,
                rec.destination_offset,
                rec.len_bytes,
            );
        }
        Opcode::CopyTexture => {
            let rec: CopyTextureRecord = bytemuck::pod_read_unaligned(payload);
            executor.copy_texture(
                resolve(refs, rec.source, at)?,
                resolve(refs, rec.destination, at)?,
                &rec.region,
            );
        }
        Opcode::ResolveTexture => {
            let rec: ResolveTextureRecord = bytemuck::pod_read_unaligned(payload);
            executor.resolve_texture(
                resolve(refs, rec.source, at)?,
                resolve(refs, rec.destination, at)?,
            );
        }
        Opcode::GenerateMipmaps => {
            let rec: GenerateMipmapsRecord = bytemuck::pod_read_unaligned(payload);
            executor.generate_mipmaps(resolve(refs, rec.texture, at)?);
        }
        Opcode::PushDebugGroup => {
            let rec: PushDebugGroupRecord = bytemuck::pod_read_unaligned(payload);
            executor.push_debug_group(label(pool, rec.name, rec.len_bytes, at)?);
        }
        Opcode::InsertDebugMarker => {
            let rec: InsertDebugMarkerRecord = bytemuck::pod_read_unaligned(payload);
            executor.insert_debug_marker(label(pool, rec.name, rec.len_bytes, at)?);
        }
    }
    Ok(())
}

fn resolve<R>(
    refs: &ReferenceTable<R>,
    handle: TrackedHandle,
    at: Position,
) -> Result<&R, ReplayError> {
    refs.resolve(handle).ok_or(ReplayError::UnknownHandle {
        handle: handle.raw(),
        tracked: refs.len(),
        block: at.block,
        offset: at.offset,
    })
}

fn staged(
    pool: &StagingPool,
    id: StagingBlockId,
    wanted: usize,
    at: Position,
) -> Result<&[u8], ReplayError> {
    let bytes = pool
        .staged_bytes(id)
        .ok_or(ReplayError::UnknownStagingBlock {
            id: id.raw(),
            block: at.block,
            offset: at.offset,
        })?;
    bytes.get(..wanted).ok_or(ReplayError::StagingTooSmall {
        id: id.raw(),
        actual: bytes.len(),
        recorded: wanted,
        block: at.block,
        offset: at.offset,
    })
}

fn label<'p>(
    pool: &'p StagingPool,
    id: StagingBlockId,
    len_bytes: u32,
    at: Position,
) -> Result<&'p str, ReplayError> {
    let bytes = staged(pool, id, len_bytes as usize, at)?;
    core::str::from_utf8(bytes).map_err(|_| ReplayError::InvalidDebugLabel {
        block: at.block,
        offset: at.offset,
    })
}
