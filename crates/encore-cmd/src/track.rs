//! Side table of the live objects a recorded command list refers to.

use core::fmt;

use bytemuck::{Pod, Zeroable};

/// Index into a [`ReferenceTable`], standing in for a live object inside a
/// bytes-only payload record.
///
/// A handle is only meaningful against the table that issued it, within the
/// recording session that issued it. Resetting the list invalidates every
/// handle it ever produced.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct TrackedHandle(u32);

impl TrackedHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Append-only list of tracked objects.
///
/// Payload records store [`TrackedHandle`] indices instead of the objects
/// themselves, keeping entry storage plain bytes with no drop glue.
/// Tracking never deduplicates: recording the same object twice yields two
/// handles.
pub struct ReferenceTable<R> {
    entries: Vec<R>,
}

impl<R> ReferenceTable<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends `resource` and returns its handle. Handles count up from 0
    /// within one session.
    pub fn track(&mut self, resource: R) -> TrackedHandle {
        let handle = TrackedHandle(self.entries.len() as u32);
        self.entries.push(resource);
        handle
    }

    /// Pure index lookup. `None` means the handle came from another table
    /// or from before a reset; replay treats that as fatal.
    pub fn resolve(&self, handle: TrackedHandle) -> Option<&R> {
        self.entries.get(handle.index())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<R> Default for ReferenceTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for ReferenceTable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceTable")
            .field("tracked", &self.entries.len())
            .finish()
    }
}
