//! Deferred command recording and replay.
//!
//! An [`EntryList`] captures a graphics/compute command sequence as
//! one-byte opcodes plus fixed-size payloads, packed into fixed-capacity
//! zero-filled blocks, and replays it later in recording order against an
//! [`Executor`]. The design keeps the recording hot path allocation free:
//!
//! - entry storage is bump allocated from reusable fixed-capacity blocks
//!   that survive [`EntryList::reset`],
//! - live resources stay out of the byte stream behind [`TrackedHandle`]
//!   indices into a side [`ReferenceTable`],
//! - bulk payloads (buffer uploads, long dynamic-offset arrays, debug
//!   labels) ride in blocks rented from an [`encore_staging::StagingPool`]
//!   and are returned wholesale on reset or dispose.

mod arena;
mod entry_list;
mod opcode;
mod records;
mod replay;
mod track;

pub use entry_list::{EntryList, DEFAULT_BLOCK_CAPACITY};
pub use opcode::{max_entry_size, Opcode, END_OF_BLOCK};
pub use records::{IndexFormat, TextureRegion, Viewport, MAX_INLINE_DYNAMIC_OFFSETS};
pub use replay::{Executor, ReplayError};
pub use track::{ReferenceTable, TrackedHandle};

pub use encore_staging::{StagingBlockId, StagingPool, StagingPoolError};
