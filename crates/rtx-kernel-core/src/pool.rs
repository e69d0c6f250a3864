//! Fixed-size block pool
//!
//! A bank of [`BLOCK_SIZE`]-byte blocks, each holding exactly one
//! [`Envelope`]. Handles are byte offsets into the pool region; a handle is
//! only honored if it is in range, aligned, and names an occupied block.
//!
//! Exhaustion is not an error at this layer: `try_alloc` returns `None` and
//! the caller decides whether to block the requesting process.

use alloc::vec::Vec;

use crate::types::{BlockRef, Envelope, KernelError, BLOCK_SIZE};

struct Slot {
    occupied: bool,
    env: Envelope,
    /// Mailbox linkage for the envelope in this slot.
    next: Option<BlockRef>,
}

impl Slot {
    fn free() -> Self {
        Self {
            occupied: false,
            env: Envelope::empty(),
            next: None,
        }
    }
}

/// The kernel's envelope pool.
pub struct BlockPool {
    slots: Vec<Slot>,
}

impl BlockPool {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot::free());
        }
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied).count()
    }

    pub fn has_free(&self) -> bool {
        self.slots.iter().any(|s| !s.occupied)
    }

    /// Claim the first free block, if any. The envelope comes back cleared.
    pub fn try_alloc(&mut self) -> Option<BlockRef> {
        let index = self.slots.iter().position(|s| !s.occupied)?;
        let slot = &mut self.slots[index];
        slot.occupied = true;
        slot.env.clear();
        slot.next = None;
        Some(BlockRef::from_index(index))
    }

    /// Return a block to the pool.
    ///
    /// Rejects handles that are out of range, misaligned, or name a block
    /// that is not currently allocated.
    pub fn release(&mut self, block: BlockRef) -> Result<(), KernelError> {
        let index = self.index_of(block)?;
        let slot = &mut self.slots[index];
        if !slot.occupied {
            return Err(KernelError::InvalidAddress);
        }
        slot.occupied = false;
        slot.env.clear();
        slot.next = None;
        Ok(())
    }

    /// Slot index for a handle, validating range and alignment.
    pub fn index_of(&self, block: BlockRef) -> Result<usize, KernelError> {
        let offset = block.offset();
        if offset % BLOCK_SIZE != 0 {
            return Err(KernelError::InvalidAddress);
        }
        let index = offset / BLOCK_SIZE;
        if index >= self.slots.len() {
            return Err(KernelError::InvalidAddress);
        }
        Ok(index)
    }

    /// The envelope stored in an occupied block.
    pub fn envelope(&self, block: BlockRef) -> Result<&Envelope, KernelError> {
        let index = self.index_of(block)?;
        let slot = &self.slots[index];
        if !slot.occupied {
            return Err(KernelError::InvalidAddress);
        }
        Ok(&slot.env)
    }

    pub fn envelope_mut(&mut self, block: BlockRef) -> Result<&mut Envelope, KernelError> {
        let index = self.index_of(block)?;
        let slot = &mut self.slots[index];
        if !slot.occupied {
            return Err(KernelError::InvalidAddress);
        }
        Ok(&mut slot.env)
    }

    pub(crate) fn link(&self, block: BlockRef) -> Option<BlockRef> {
        match self.index_of(block) {
            Ok(index) => self.slots[index].next,
            Err(_) => None,
        }
    }

    pub(crate) fn set_link(&mut self, block: BlockRef, next: Option<BlockRef>) {
        if let Ok(index) = self.index_of(block) {
            self.slots[index].next = next;
        }
    }
}
