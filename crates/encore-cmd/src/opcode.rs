//! The closed command catalog shared by the encoder and the dispatcher.

use core::mem::size_of;

use crate::records::{
    ClearColorTargetRecord, ClearDepthStencilRecord, CopyBufferRecord, CopyTextureRecord,
    DispatchIndirectRecord, DispatchRecord, DrawIndexedIndirectRecord, DrawIndexedRecord,
    DrawIndirectRecord, DrawRecord, GenerateMipmapsRecord, InsertDebugMarkerRecord,
    PushDebugGroupRecord, ResolveTextureRecord, SetFramebufferRecord, SetIndexBufferRecord,
    SetPipelineRecord, SetResourceSetRecord, SetScissorRectRecord, SetVertexBufferRecord,
    SetViewportRecord, UpdateBufferRecord,
};

/// Byte value marking "no further entries in this block". Blocks are zero
/// filled, so the byte after the last entry already reads as this sentinel
/// without being written.
pub const END_OF_BLOCK: u8 = 0;

/// One-byte tag identifying each recordable command.
///
/// Discriminants start at 1; 0 is reserved for [`END_OF_BLOCK`].
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Begin = 1,
    ClearColorTarget = 2,
    ClearDepthStencil = 3,
    DrawIndexed = 4,
    End = 5,
    SetFramebuffer = 6,
    SetIndexBuffer = 7,
    SetPipeline = 8,
    SetResourceSet = 9,
    SetScissorRect = 10,
    SetVertexBuffer = 11,
    SetViewport = 12,
    UpdateBuffer = 13,
    CopyBuffer = 14,
    CopyTexture = 15,
    ResolveTexture = 16,
    Draw = 17,
    Dispatch = 18,
    DrawIndirect = 19,
    DrawIndexedIndirect = 20,
    DispatchIndirect = 21,
    GenerateMipmaps = 22,
    PushDebugGroup = 23,
    PopDebugGroup = 24,
    InsertDebugMarker = 25,
}

impl Opcode {
    /// Every catalog entry, in tag order.
    pub const ALL: [Opcode; 25] = [
        Opcode::Begin,
        Opcode::ClearColorTarget,
        Opcode::ClearDepthStencil,
        Opcode::DrawIndexed,
        Opcode::End,
        Opcode::SetFramebuffer,
        Opcode::SetIndexBuffer,
        Opcode::SetPipeline,
        Opcode::SetResourceSet,
        Opcode::SetScissorRect,
        Opcode::SetVertexBuffer,
        Opcode::SetViewport,
        Opcode::UpdateBuffer,
        Opcode::CopyBuffer,
        Opcode::CopyTexture,
        Opcode::ResolveTexture,
        Opcode::Draw,
        Opcode::Dispatch,
        Opcode::DrawIndirect,
        Opcode::DrawIndexedIndirect,
        Opcode::DispatchIndirect,
        Opcode::GenerateMipmaps,
        Opcode::PushDebugGroup,
        Opcode::PopDebugGroup,
        Opcode::InsertDebugMarker,
    ];

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::ClearColorTarget),
            3 => Some(Self::ClearDepthStencil),
            4 => Some(Self::DrawIndexed),
            5 => Some(Self::End),
            6 => Some(Self::SetFramebuffer),
            7 => Some(Self::SetIndexBuffer),
            8 => Some(Self::SetPipeline),
            9 => Some(Self::SetResourceSet),
            10 => Some(Self::SetScissorRect),
            11 => Some(Self::SetVertexBuffer),
            12 => Some(Self::SetViewport),
            13 => Some(Self::UpdateBuffer),
            14 => Some(Self::CopyBuffer),
            15 => Some(Self::CopyTexture),
            16 => Some(Self::ResolveTexture),
            17 => Some(Self::Draw),
            18 => Some(Self::Dispatch),
            19 => Some(Self::DrawIndirect),
            20 => Some(Self::DrawIndexedIndirect),
            21 => Some(Self::DispatchIndirect),
            22 => Some(Self::GenerateMipmaps),
            23 => Some(Self::PushDebugGroup),
            24 => Some(Self::PopDebugGroup),
            25 => Some(Self::InsertDebugMarker),
            _ => None,
        }
    }

    /// Payload size in bytes for this opcode. The encoder and the
    /// dispatcher are both driven by this one table, so an entry's width is
    /// known from its tag alone.
    pub const fn payload_size(self) -> usize {
        match self {
            Opcode::Begin | Opcode::End | Opcode::PopDebugGroup => 0,
            Opcode::ClearColorTarget => size_of::<ClearColorTargetRecord>(),
            Opcode::ClearDepthStencil => size_of::<ClearDepthStencilRecord>(),
            Opcode::DrawIndexed => size_of::<DrawIndexedRecord>(),
            Opcode::SetFramebuffer => size_of::<SetFramebufferRecord>(),
            Opcode::SetIndexBuffer => size_of::<SetIndexBufferRecord>(),
            Opcode::SetPipeline => size_of::<SetPipelineRecord>(),
            Opcode::SetResourceSet => size_of::<SetResourceSetRecord>(),
            Opcode::SetScissorRect => size_of::<SetScissorRectRecord>(),
            Opcode::SetVertexBuffer => size_of::<SetVertexBufferRecord>(),
            Opcode::SetViewport => size_of::<SetViewportRecord>(),
            Opcode::UpdateBuffer => size_of::<UpdateBufferRecord>(),
            Opcode::CopyBuffer => size_of::<CopyBufferRecord>(),
            Opcode::CopyTexture => size_of::<CopyTextureRecord>(),
            Opcode::ResolveTexture => size_of::<ResolveTextureRecord>(),
            Opcode::Draw => size_of::<DrawRecord>(),
            Opcode::Dispatch => size_of::<DispatchRecord>(),
            Opcode::DrawIndirect => size_of::<DrawIndirectRecord>(),
            Opcode::DrawIndexedIndirect => size_of::<DrawIndexedIndirectRecord>(),
            Opcode::DispatchIndirect => size_of::<DispatchIndirectRecord>(),
            Opcode::GenerateMipmaps => size_of::<GenerateMipmapsRecord>(),
            Opcode::PushDebugGroup => size_of::<PushDebugGroupRecord>(),
            Opcode::InsertDebugMarker => size_of::<InsertDebugMarkerRecord>(),
        }
    }
}

/// Largest encoded entry in the catalog, opcode byte included. Lists whose
/// blocks are at least this large can record any command.
pub const fn max_entry_size() -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < Opcode::ALL.len() {
        let size = Opcode::ALL[i].payload_size();
        if size > max {
            max = size;
        }
        i += 1;
    }
    max + 1
}

// A command tag must never collide with the end-of-block byte, or replay
// would treat the entry as a zeroed block tail.
const _: () = {
    let mut i = 0;
    while i < Opcode::ALL.len() {
        assert!(Opcode::ALL[i] as u8 != END_OF_BLOCK);
        i += 1;
    }
};
