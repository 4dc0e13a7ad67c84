//! Fixed pool of platform buffers with explicit per-buffer state

use crate::platform::{BufferId, OutputQueue};
use crate::{AudioError, Result};

/// Whether a buffer is currently submitted to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Not submitted; may be primed by `write`
    Free,
    /// Submitted and counted as pending
    Playing,
}

#[derive(Debug)]
struct Slot {
    id: BufferId,
    state: BufferState,
}

/// Buffers allocated once at open time
///
/// Tracks the number of `Playing` slots so the pending count can never drift
/// from the tags: it only changes through [`BufferPool::mark_playing`] and
/// [`BufferPool::mark_free`].
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Slot>,
    capacity: usize,
    playing: u32,
}

impl BufferPool {
    /// A pool with no buffers yet
    pub fn empty(capacity: usize) -> Self {
        BufferPool {
            slots: Vec::new(),
            capacity,
            playing: 0,
        }
    }

    /// Allocate `count` buffers of `capacity` bytes on `queue`, all Free
    pub fn allocate(queue: &dyn OutputQueue, count: usize, capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(count)
            .map_err(|e| AudioError::Allocation(format!("buffer pool of {count}: {e}")))?;

        for _ in 0..count {
            let id = queue.allocate_buffer(capacity)?;
            slots.push(Slot {
                id,
                state: BufferState::Free,
            });
        }

        Ok(BufferPool {
            slots,
            capacity,
            playing: 0,
        })
    }

    /// Number of buffers in the pool
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool holds no buffers
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bytes each buffer can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffer handles in allocation order
    pub fn ids(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.slots.iter().map(|slot| slot.id)
    }

    /// State of `id`, or `None` if it does not belong to this pool
    pub fn state_of(&self, id: BufferId) -> Option<BufferState> {
        self.slot(id).map(|slot| slot.state)
    }

    /// Number of buffers tagged `Playing`
    pub fn playing_count(&self) -> u32 {
        self.playing
    }

    /// Tag `id` as Playing; returns `true` if it was Free
    pub fn mark_playing(&mut self, id: BufferId) -> bool {
        let transitioned = match self.slot_mut(id) {
            Some(slot) if slot.state == BufferState::Free => {
                slot.state = BufferState::Playing;
                true
            }
            _ => false,
        };
        if transitioned {
            self.playing += 1;
        }
        debug_assert!(self.playing as usize <= self.slots.len());
        transitioned
    }

    /// Tag `id` as Free; returns `true` if it was Playing
    pub fn mark_free(&mut self, id: BufferId) -> bool {
        let transitioned = match self.slot_mut(id) {
            Some(slot) if slot.state == BufferState::Playing => {
                slot.state = BufferState::Free;
                true
            }
            _ => false,
        };
        if transitioned {
            self.playing -= 1;
        }
        transitioned
    }

    /// Drop every slot; the platform has already released the memory
    pub fn release(&mut self) {
        self.slots.clear();
        self.playing = 0;
    }

    fn slot(&self, id: BufferId) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    fn slot_mut(&mut self, id: BufferId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }
}
