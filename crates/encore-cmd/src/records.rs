//! Fixed-layout payload records, one per catalog opcode that carries data.
//!
//! Every record is `#[repr(C)]`, built only from 4-byte scalars so the
//! layout has no padding, and derives `Pod`. The encoder copies records
//! into entry storage with [`bytemuck::bytes_of`] and the dispatcher reads
//! them back with [`bytemuck::pod_read_unaligned`], since entries start at
//! arbitrary byte offsets inside a block.

use bytemuck::{Pod, Zeroable};
use encore_staging::StagingBlockId;

use crate::opcode::Opcode;
use crate::track::TrackedHandle;

/// Dynamic offsets up to this count are stored inside
/// [`SetResourceSetRecord`]; longer arrays spill into a staging block.
pub const MAX_INLINE_DYNAMIC_OFFSETS: usize = 10;

/// Index element width for `set_index_buffer`.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16 = 0,
    Uint32 = 1,
}

impl IndexFormat {
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Uint16),
            1 => Some(Self::Uint32),
            _ => None,
        }
    }
}

/// Viewport rectangle and depth range, all `f32`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Source and destination coordinates for a texture copy.
///
/// Layout: 14 `u32` fields, 56 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TextureRegion {
    pub src_x: u32,
    pub src_y: u32,
    pub src_z: u32,
    pub src_mip_level: u32,
    pub src_base_array_layer: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub dst_z: u32,
    pub dst_mip_level: u32,
    pub dst_base_array_layer: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u32,
}

/// Ties a payload record to its opcode so the encoder and the dispatcher
/// cannot disagree on which struct a tag decodes as.
pub(crate) trait Record: Pod {
    const OPCODE: Opcode;
}

macro_rules! record {
    ($ty:ty, $opcode:ident) => {
        impl Record for $ty {
            const OPCODE: Opcode = Opcode::$opcode;
        }
    };
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ClearColorTargetRecord {
    pub index: u32,
    pub color: [f32; 4],
}
record!(ClearColorTargetRecord, ClearColorTarget);

/// Stencil values are 8-bit at the API surface; widened here to keep the
/// record free of padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ClearDepthStencilRecord {
    pub depth: f32,
    pub stencil: u32,
}
record!(ClearDepthStencilRecord, ClearDepthStencil);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DrawRecord {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}
record!(DrawRecord, Draw);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DrawIndexedRecord {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}
record!(DrawIndexedRecord, DrawIndexed);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DrawIndirectRecord {
    pub buffer: TrackedHandle,
    pub offset_bytes: u32,
    pub draw_count: u32,
    pub stride_bytes: u32,
}
record!(DrawIndirectRecord, DrawIndirect);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DrawIndexedIndirectRecord {
    pub buffer: TrackedHandle,
    pub offset_bytes: u32,
    pub draw_count: u32,
    pub stride_bytes: u32,
}
record!(DrawIndexedIndirectRecord, DrawIndexedIndirect);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DispatchRecord {
    pub group_count_x: u32,
    pub group_count_y: u32,
    pub group_count_z: u32,
}
record!(DispatchRecord, Dispatch);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DispatchIndirectRecord {
    pub buffer: TrackedHandle,
    pub offset_bytes: u32,
}
record!(DispatchIndirectRecord, DispatchIndirect);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SetFramebufferRecord {
    pub framebuffer: TrackedHandle,
}
record!(SetFramebufferRecord, SetFramebuffer);

/// `format` holds an [`IndexFormat`] discriminant; the dispatcher validates
/// it on the way out.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SetIndexBufferRecord {
    pub buffer: TrackedHandle,
    pub format: u32,
    pub offset_bytes: u32,
}
record!(SetIndexBufferRecord, SetIndexBuffer);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SetPipelineRecord {
    pub pipeline: TrackedHandle,
}
record!(SetPipelineRecord, SetPipeline);

/// When `dynamic_offset_count <= MAX_INLINE_DYNAMIC_OFFSETS` the offsets
/// live in `dynamic_offsets_inline` and `dynamic_offsets_block` is unused;
/// otherwise they are staged and `dynamic_offsets_inline` is all zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SetResourceSetRecord {
    pub slot: u32,
    pub resource_set: TrackedHandle,
    /// 1 for the graphics bind point, 0 for compute.
    pub graphics: u32,
    pub dynamic_offset_count: u32,
    pub dynamic_offsets_inline: [u32; MAX_INLINE_DYNAMIC_OFFSETS],
    pub dynamic_offsets_block: StagingBlockId,
}
record!(SetResourceSetRecord, SetResourceSet);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SetScissorRectRecord {
    pub index: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
record!(SetScissorRectRecord, SetScissorRect);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SetVertexBufferRecord {
    pub slot: u32,
    pub buffer: TrackedHandle,
    pub offset_bytes: u32,
}
record!(SetVertexBufferRecord, SetVertexBuffer);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SetViewportRecord {
    pub index: u32,
    pub viewport: Viewport,
}
record!(SetViewportRecord, SetViewport);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct UpdateBufferRecord {
    pub buffer: TrackedHandle,
    pub offset_bytes: u32,
    pub staging: StagingBlockId,
    pub len_bytes: u32,
}
record!(UpdateBufferRecord, UpdateBuffer);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct CopyBufferRecord {
    pub source: TrackedHandle,
    pub source_offset: u32,
    pub destination: TrackedHandle,
    pub destination_offset: u32,
    pub len_bytes: u32,
}
record!(CopyBufferRecord, CopyBuffer);

/// The widest record in the catalog; `max_entry_size` follows it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct CopyTextureRecord {
    pub source: TrackedHandle,
    pub destination: TrackedHandle,
    pub region: TextureRegion,
}
record!(CopyTextureRecord, CopyTexture);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ResolveTextureRecord {
    pub source: TrackedHandle,
    pub destination: TrackedHandle,
}
record!(ResolveTextureRecord, ResolveTexture);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct GenerateMipmapsRecord {
    pub texture: TrackedHandle,
}
record!(GenerateMipmapsRecord, GenerateMipmaps);

/// Label bytes are staged UTF-8; `len_bytes` is the byte length, not the
/// character count.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct PushDebugGroupRecord {
    pub name: StagingBlockId,
    pub len_bytes: u32,
}
record!(PushDebugGroupRecord, PushDebugGroup);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct InsertDebugMarkerRecord {
    pub name: StagingBlockId,
    pub len_bytes: u32,
}
record!(InsertDebugMarkerRecord, InsertDebugMarker);

#[cfg(test)]
mod tests {
    use core::mem::size_of;

    use super::*;

    fn check<R: Record>() {
        assert_eq!(
            R::OPCODE.payload_size(),
            size_of::<R>(),
            "size table entry for {:?}",
            R::OPCODE
        );
    }

    #[test]
    fn size_table_agrees_with_every_record() {
        check::<ClearColorTargetRecord>();
        check::<ClearDepthStencilRecord>();
        check::<DrawRecord>();
        check::<DrawIndexedRecord>();
        check::<DrawIndirectRecord>();
        check::<DrawIndexedIndirectRecord>();
        check::<DispatchRecord>();
        check::<DispatchIndirectRecord>();
        check::<SetFramebufferRecord>();
        check::<SetIndexBufferRecord>();
        check::<SetPipelineRecord>();
        check::<SetResourceSetRecord>();
        check::<SetScissorRectRecord>();
        check::<SetVertexBufferRecord>();
        check::<SetViewportRecord>();
        check::<UpdateBufferRecord>();
        check::<CopyBufferRecord>();
        check::<CopyTextureRecord>();
        check::<ResolveTextureRecord>();
        check::<GenerateMipmapsRecord>();
        check::<PushDebugGroupRecord>();
        check::<InsertDebugMarkerRecord>();
    }

    #[test]
    fn records_have_no_padding() {
        assert_eq!(size_of::<ClearColorTargetRecord>(), 20);
        assert_eq!(size_of::<ClearDepthStencilRecord>(), 8);
        assert_eq!(size_of::<DrawRecord>(), 16);
        assert_eq!(size_of::<DrawIndexedRecord>(), 20);
        assert_eq!(size_of::<Viewport>(), 24);
        assert_eq!(size_of::<SetViewportRecord>(), 28);
        assert_eq!(size_of::<TextureRegion>(), 56);
        assert_eq!(size_of::<CopyTextureRecord>(), 64);
        assert_eq!(size_of::<SetResourceSetRecord>(), 60);
    }

    #[test]
    fn index_format_round_trips() {
        assert_eq!(IndexFormat::from_u32(0), Some(IndexFormat::Uint16));
        assert_eq!(IndexFormat::from_u32(1), Some(IndexFormat::Uint32));
        assert_eq!(IndexFormat::from_u32(2), None);
    }
}
