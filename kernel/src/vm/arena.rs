//! An index-based frame allocator.
//!
//! Frames are `ENTRIES` 64-bit words, addressed by page number `base + slot`. Freed slots go on
//! a free list and are handed out again before the arena grows. Besides page tables the arena
//! can hold guest data pages, which makes it a small physical memory for hosted use.

use alloc::{boxed::Box, vec::Vec};

use super::shadow::{PageTableMemory, Ppn, ENTRIES, PAGE_SIZE};

type Frame = [u64; ENTRIES];

#[derive(Debug)]
pub struct FrameArena {
    base: Ppn,
    capacity: usize,
    slots: Vec<Option<Box<Frame>>>,
    free: Vec<usize>,
}

impl FrameArena {
    /// An empty arena whose first frame is page `base`, holding at most `capacity` live frames.
    pub fn new(base: Ppn, capacity: usize) -> Self {
        Self {
            base,
            capacity,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn slot(&self, ppn: Ppn) -> Option<usize> {
        let slot = usize::try_from(ppn.checked_sub(self.base)?).ok()?;
        if slot < self.slots.len() {
            Some(slot)
        } else {
            None
        }
    }

    fn frame(&self, ppn: Ppn) -> Option<&Frame> {
        self.slots[self.slot(ppn)?].as_deref()
    }

    fn frame_mut(&mut self, ppn: Ppn) -> Option<&mut Frame> {
        let slot = self.slot(ppn)?;
        self.slots[slot].as_deref_mut()
    }

    pub fn is_live(&self, ppn: Ppn) -> bool {
        self.frame(ppn).is_some()
    }

    /// Number of allocated frames.
    pub fn live_frames(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Read a naturally aligned word at physical address `pa`.
    pub fn read_u32(&self, pa: u64) -> Option<u32> {
        if pa % 4 != 0 {
            return None;
        }
        let frame = self.frame(pa / PAGE_SIZE)?;
        let offset = (pa % PAGE_SIZE) as usize;
        let word = frame[offset / 8];
        Some((word >> ((offset % 8) * 8)) as u32)
    }

    /// Write a naturally aligned word at physical address `pa`.
    pub fn write_u32(&mut self, pa: u64, value: u32) -> bool {
        if pa % 4 != 0 {
            return false;
        }
        let offset = (pa % PAGE_SIZE) as usize;
        let Some(frame) = self.frame_mut(pa / PAGE_SIZE) else {
            return false;
        };
        let shift = (offset % 8) * 8;
        let word = &mut frame[offset / 8];
        *word = (*word & !(0xffff_ffff << shift)) | ((value as u64) << shift);
        true
    }
}

impl PageTableMemory for FrameArena {
    fn read_pte(&self, frame: Ppn, index: usize) -> Option<u64> {
        self.frame(frame)?.get(index).copied()
    }

    fn write_pte(&mut self, frame: Ppn, index: usize, pte: u64) {
        if let Some(entry) = self.frame_mut(frame).and_then(|f| f.get_mut(index)) {
            *entry = pte;
        }
    }

    fn alloc_frame(&mut self) -> Option<Ppn> {
        if self.live_frames() >= self.capacity {
            return None;
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(Box::new([0; ENTRIES]));
                slot
            }
            None => {
                self.slots.push(Some(Box::new([0; ENTRIES])));
                self.slots.len() - 1
            }
        };
        Some(self.base + slot as Ppn)
    }

    fn free_frame(&mut self, frame: Ppn) -> bool {
        let Some(slot) = self.slot(frame) else {
            return false;
        };
        if self.slots[slot].take().is_none() {
            return false;
        }
        self.free.push(slot);
        true
    }
}
