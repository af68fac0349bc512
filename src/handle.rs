use std::sync::Arc;

use crate::error::{PipeError, Result};
use crate::event::EventCore;
use crate::pipe::PipeEndpoint;

/// Raw representation of an opaque handle value.
///
/// Layout: generation tag in the upper 32 bits, 1-based slot index in
/// the lower 32. No valid handle is ever `0` or [`INVALID_HANDLE_VALUE`].
pub type RawHandle = u64;

/// The all-ones invalid-handle sentinel. Deliberately not zero, so a
/// zeroed field can never alias a live handle.
pub const INVALID_HANDLE_VALUE: RawHandle = RawHandle::MAX;

/// Opaque identifier for an open named-pipe endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeHandle(pub(crate) RawHandle);

/// Opaque identifier for a waitable event object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub(crate) RawHandle);

impl PipeHandle {
    pub const INVALID: PipeHandle = PipeHandle(INVALID_HANDLE_VALUE);

    pub fn is_valid(self) -> bool {
        self.0 != INVALID_HANDLE_VALUE && self.0 != 0
    }

    pub fn raw(self) -> RawHandle {
        self.0
    }
}

impl EventHandle {
    pub const INVALID: EventHandle = EventHandle(INVALID_HANDLE_VALUE);

    pub fn is_valid(self) -> bool {
        self.0 != INVALID_HANDLE_VALUE && self.0 != 0
    }

    pub fn raw(self) -> RawHandle {
        self.0
    }
}

impl From<PipeHandle> for RawHandle {
    fn from(h: PipeHandle) -> RawHandle {
        h.0
    }
}

impl From<EventHandle> for RawHandle {
    fn from(h: EventHandle) -> RawHandle {
        h.0
    }
}

/// What a handle-table slot refers to.
pub(crate) enum HandleObject {
    Pipe(Arc<PipeEndpoint>),
    Event(Arc<EventCore>),
}

struct Slot {
    generation: u32,
    object: Option<HandleObject>,
}

/// Generation-tagged arena of handle slots.
///
/// A slot's generation is bumped when it is reused, so a raw value that
/// survived a close can never resolve to a newer occupant: it fails
/// with `InvalidHandle` instead.
pub(crate) struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

// Keep the top generation bit clear so index+generation never packs to
// the all-ones sentinel.
const GENERATION_MASK: u32 = 0x7fff_ffff;

fn pack(index: u32, generation: u32) -> RawHandle {
    ((generation as RawHandle) << 32) | (index as RawHandle + 1)
}

fn unpack(raw: RawHandle) -> Option<(u32, u32)> {
    if raw == 0 || raw == INVALID_HANDLE_VALUE {
        return None;
    }
    let index = (raw & 0xffff_ffff) as u32;
    let generation = (raw >> 32) as u32;
    if index == 0 {
        return None;
    }
    Some((index - 1, generation))
}

pub(crate) enum RemoveOutcome {
    Removed(HandleObject),
    AlreadyClosed,
    Invalid,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, object: HandleObject) -> RawHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
            slot.object = Some(object);
            pack(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                object: Some(object),
            });
            pack(index, 0)
        }
    }

    pub fn get(&self, raw: RawHandle) -> Option<&HandleObject> {
        let (index, generation) = unpack(raw)?;
        let slot = self.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.object.as_ref()
    }

    /// Removes a live entry. A matching generation with an empty slot
    /// means the caller is closing the same handle twice.
    pub fn remove(&mut self, raw: RawHandle) -> RemoveOutcome {
        let Some((index, generation)) = unpack(raw) else {
            return RemoveOutcome::Invalid;
        };
        let Some(slot) = self.slots.get_mut(index as usize) else {
            return RemoveOutcome::Invalid;
        };
        if slot.generation != generation {
            return RemoveOutcome::Invalid;
        }
        match slot.object.take() {
            Some(object) => {
                self.free.push(index);
                RemoveOutcome::Removed(object)
            }
            None => RemoveOutcome::AlreadyClosed,
        }
    }

    pub fn get_pipe(&self, handle: PipeHandle) -> Result<Arc<PipeEndpoint>> {
        match self.get(handle.0) {
            Some(HandleObject::Pipe(endpoint)) => Ok(endpoint.clone()),
            _ => Err(PipeError::InvalidHandle),
        }
    }

    pub fn get_event(&self, handle: EventHandle) -> Result<Arc<EventCore>> {
        match self.get(handle.0) {
            Some(HandleObject::Event(event)) => Ok(event.clone()),
            _ => Err(PipeError::InvalidHandle),
        }
    }
}
