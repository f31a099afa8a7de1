//! Shadow page tables.
//!
//! The host gives each process one Sv39 table. While the guest runs below machine level it
//! runs on a structural duplicate of that table instead, whose leaves over the protection
//! window carry only the permissions the guest's emulated PMP grants. The duplicate owns every
//! table frame it allocated; the data pages its leaves point at still belong to the host.

use log::{error, trace};
use riscv::cpu::Mode;
use riscv::csr::{read_field, PMPADDR_SHIFT, PMPCFG_A, PMPCFG_R, PMPCFG_W, PMPCFG_X, PMP_A_TOR};

use super::config::ProtectionWindow;
use super::error::VirtError;

/// Physical page number; identifies a frame.
pub type Ppn = u64;

pub const PAGE_SIZE: u64 = 4096;
/// PTEs per table frame.
pub const ENTRIES: usize = 512;
/// Sv39 has three levels; level 0 holds the leaves.
pub const LEVELS: usize = 3;
const VPN_BITS: u64 = 9;
const PAGE_SHIFT: u64 = 12;

pub const PTE_V: u64 = 1 << 0;
pub const PTE_R: u64 = 1 << 1;
pub const PTE_W: u64 = 1 << 2;
pub const PTE_X: u64 = 1 << 3;
pub const PTE_U: u64 = 1 << 4;
pub const PTE_RWX: u64 = PTE_R | PTE_W | PTE_X;
const PTE_FLAGS: u64 = 0x3ff;
const PTE_PPN_SHIFT: u64 = 10;

/// Raw access to the frames page tables live in.
pub trait PageTableMemory {
    /// The PTE at `index` of table frame `frame`, or None if the frame is not readable.
    fn read_pte(&self, frame: Ppn, index: usize) -> Option<u64>;
    fn write_pte(&mut self, frame: Ppn, index: usize, pte: u64);
    /// A fresh zeroed frame.
    fn alloc_frame(&mut self) -> Option<Ppn>;
    /// Release a frame. Returns false if the frame was not allocated.
    fn free_frame(&mut self, frame: Ppn) -> bool;
}

pub const fn pte_ppn(pte: u64) -> Ppn {
    pte >> PTE_PPN_SHIFT
}

pub const fn make_pte(ppn: Ppn, flags: u64) -> u64 {
    (ppn << PTE_PPN_SHIFT) | (flags & PTE_FLAGS)
}

/// A valid entry with any of R/W/X set maps memory; a valid entry without them points at the
/// next level.
pub const fn is_leaf(pte: u64) -> bool {
    pte & PTE_V != 0 && pte & PTE_RWX != 0
}

const fn vpn(va: u64, level: usize) -> usize {
    ((va >> (PAGE_SHIFT + VPN_BITS * level as u64)) & ((1 << VPN_BITS) - 1)) as usize
}

/// Build a duplicate of `host_root`. Every table frame is fresh; leaf entries are copied as-is,
/// so they keep pointing at the host's data pages. Superpages that overlap `window` are split
/// down to 4 KiB leaves in frames the duplicate owns, so the window's permissions can be set
/// page by page.
pub fn duplicate<M: PageTableMemory>(
    mem: &mut M,
    host_root: Ppn,
    window: &ProtectionWindow,
) -> Result<Ppn, VirtError> {
    let root = copy_table(mem, host_root, LEVELS - 1, 0, window)?;
    trace!("duplicated table {:#x} into {:#x}", host_root, root);
    Ok(root)
}

/// Bytes mapped by one entry of a table at `level`.
const fn span(level: usize) -> u64 {
    1 << (PAGE_SHIFT + VPN_BITS * level as u64)
}

const fn overlaps(window: &ProtectionWindow, va: u64, size: u64) -> bool {
    va < window.end() && va.saturating_add(size) > window.start
}

fn copy_table<M: PageTableMemory>(
    mem: &mut M,
    src: Ppn,
    level: usize,
    base: u64,
    window: &ProtectionWindow,
) -> Result<Ppn, VirtError> {
    let dst = mem.alloc_frame().ok_or(VirtError::OutOfFrames)?;

    for index in 0..ENTRIES {
        let pte = mem.read_pte(src, index).unwrap_or(0);
        if pte & PTE_V == 0 {
            continue;
        }
        let va = base + index as u64 * span(level);
        let child = if level == 0 || (is_leaf(pte) && !overlaps(window, va, span(level))) {
            mem.write_pte(dst, index, pte);
            continue;
        } else if is_leaf(pte) {
            split_superpage(mem, pte, level - 1, va, window)
        } else {
            copy_table(mem, pte_ppn(pte), level - 1, va, window)
        };

        match child {
            Ok(child) => mem.write_pte(dst, index, make_pte(child, PTE_V)),
            Err(err) => {
                // undo the entries copied so far, then the frame itself
                destroy_table(mem, dst, level);
                return Err(err);
            }
        }
    }
    Ok(dst)
}

/// Build a table at `level` mapping the same run of pages as the superpage leaf `pte` at `base`.
fn split_superpage<M: PageTableMemory>(
    mem: &mut M,
    pte: u64,
    level: usize,
    base: u64,
    window: &ProtectionWindow,
) -> Result<Ppn, VirtError> {
    let dst = mem.alloc_frame().ok_or(VirtError::OutOfFrames)?;
    trace!("splitting level {} superpage at {:#x}", level + 1, base);

    for index in 0..ENTRIES {
        let va = base + index as u64 * span(level);
        let leaf = make_pte(pte_ppn(pte) + ((index as u64) << (VPN_BITS * level as u64)), pte);
        if level == 0 || !overlaps(window, va, span(level)) {
            mem.write_pte(dst, index, leaf);
            continue;
        }
        match split_superpage(mem, leaf, level - 1, va, window) {
            Ok(child) => mem.write_pte(dst, index, make_pte(child, PTE_V)),
            Err(err) => {
                destroy_table(mem, dst, level);
                return Err(err);
            }
        }
    }
    Ok(dst)
}

/// Free every table frame reachable from `root`. Data pages referenced by leaves are left alone.
pub fn destroy<M: PageTableMemory>(mem: &mut M, root: Ppn) {
    destroy_table(mem, root, LEVELS - 1);
    trace!("destroyed table {:#x}", root);
}

fn destroy_table<M: PageTableMemory>(mem: &mut M, table: Ppn, level: usize) {
    if level > 0 {
        for index in 0..ENTRIES {
            let pte = mem.read_pte(table, index).unwrap_or(0);
            if pte & PTE_V != 0 && !is_leaf(pte) {
                destroy_table(mem, pte_ppn(pte), level - 1);
            }
        }
    }
    if !mem.free_frame(table) {
        error!("shadow table frame {:#x} was not allocated", table);
    }
}

/// The frame and index of the leaf entry mapping `va`, if it is mapped.
pub fn walk<M: PageTableMemory>(mem: &M, root: Ppn, va: u64) -> Option<(Ppn, usize)> {
    walk_leaf(mem, root, va).map(|(table, index, _)| (table, index))
}

fn walk_leaf<M: PageTableMemory>(mem: &M, root: Ppn, va: u64) -> Option<(Ppn, usize, usize)> {
    let mut table = root;
    for level in (0..LEVELS).rev() {
        let index = vpn(va, level);
        let pte = mem.read_pte(table, index)?;
        if pte & PTE_V == 0 {
            return None;
        }
        if level == 0 || is_leaf(pte) {
            return Some((table, index, level));
        }
        table = pte_ppn(pte);
    }
    None
}

/// Translate `va` to a physical address through `root`, ignoring permissions.
pub fn translate<M: PageTableMemory>(mem: &M, root: Ppn, va: u64) -> Option<u64> {
    let mut table = root;
    for level in (0..LEVELS).rev() {
        let pte = mem.read_pte(table, vpn(va, level))?;
        if pte & PTE_V == 0 {
            return None;
        }
        if level == 0 || is_leaf(pte) {
            // superpages keep the low VPN bits of the address
            let offset = va & (span(level) - 1);
            return Some((pte_ppn(pte) << PAGE_SHIFT) + offset);
        }
        table = pte_ppn(pte);
    }
    None
}

/// Rewrite the R/W/X bits of every mapped 4 KiB page in `[start, start + size)` to `perm`.
/// Unmapped pages are skipped, and so are superpages: a superpage leaf without R/W/X would read
/// as a pointer to a lower table.
pub fn set_permissions<M: PageTableMemory>(mem: &mut M, root: Ppn, start: u64, size: u64, perm: u64) {
    let end = start.saturating_add(size);
    let mut va = start & !(PAGE_SIZE - 1);
    while va < end {
        let step = match walk_leaf(mem, root, va) {
            Some((table, index, 0)) => {
                if let Some(pte) = mem.read_pte(table, index) {
                    mem.write_pte(table, index, (pte & !PTE_RWX) | (perm & PTE_RWX));
                }
                PAGE_SIZE
            }
            Some((_, _, level)) => {
                trace!("skipping level {} superpage at {:#x}", level, va);
                span(level) - (va & (span(level) - 1))
            }
            None => PAGE_SIZE,
        };
        va = match va.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
}

/// PTE permission bits granted by the R/W/X bits of a pmpcfg entry.
pub const fn pmp_permissions(pmpcfg: u64) -> u64 {
    let mut perm = 0;
    if pmpcfg & PMPCFG_R != 0 {
        perm |= PTE_R;
    }
    if pmpcfg & PMPCFG_W != 0 {
        perm |= PTE_W;
    }
    if pmpcfg & PMPCFG_X != 0 {
        perm |= PTE_X;
    }
    perm
}

/// Re-derive the window's permissions from PMP entry 0.
///
/// The whole window is closed first. A top-of-range entry then opens
/// `[window.start, pmpaddr0 << 2)` with its R/W/X bits; any other matching mode keeps the window
/// closed.
pub fn apply_protection<M: PageTableMemory>(
    mem: &mut M,
    root: Ppn,
    window: &ProtectionWindow,
    pmpcfg0: u64,
    pmpaddr0: u64,
) {
    set_permissions(mem, root, window.start, window.size, 0);

    if read_field(pmpcfg0, PMPCFG_A) != PMP_A_TOR {
        trace!("pmp entry 0 is not top-of-range ({:#x}), window closed", pmpcfg0 & 0xff);
        return;
    }
    let top = (pmpaddr0 << PMPADDR_SHIFT).min(window.end());
    if top <= window.start {
        return;
    }
    let perm = pmp_permissions(pmpcfg0);
    trace!("pmp opens [{:#x}, {:#x}) with {:#x}", window.start, top, perm);
    set_permissions(mem, root, window.start, top - window.start, perm);
}

/// Which table is installed for the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTable {
    Host,
    Guest,
}

impl ActiveTable {
    /// Machine mode sees the host's view; anything below it runs on the shadow.
    pub const fn for_mode(mode: Mode) -> ActiveTable {
        match mode {
            Mode::Machine => ActiveTable::Host,
            Mode::User | Mode::Supervisor => ActiveTable::Guest,
        }
    }
}

/// The host's table, its shadow, and which of the two is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTables {
    pub host: Ppn,
    pub guest: Ppn,
    pub active: ActiveTable,
}

impl ShadowTables {
    /// Duplicate `host` into a new guest table split around `window`. The host table stays
    /// installed.
    pub fn build<M: PageTableMemory>(
        mem: &mut M,
        host: Ppn,
        window: &ProtectionWindow,
    ) -> Result<Self, VirtError> {
        let guest = duplicate(mem, host, window)?;
        Ok(Self {
            host,
            guest,
            active: ActiveTable::Host,
        })
    }

    pub const fn root(&self, table: ActiveTable) -> Ppn {
        match table {
            ActiveTable::Host => self.host,
            ActiveTable::Guest => self.guest,
        }
    }

    pub const fn active_root(&self) -> Ppn {
        self.root(self.active)
    }
}
