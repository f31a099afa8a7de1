//! What the virtualization layer needs from the host kernel.

use riscv::cpu::XRegisters;

use super::shadow::{PageTableMemory, Ppn};

/// The host side of a privileged trap.
pub trait Host {
    type Memory: PageTableMemory;

    /// Physical memory holding the process's page tables.
    fn memory(&mut self) -> &mut Self::Memory;

    /// Root of the address-space table the host assigned to the current process.
    fn process_table(&self) -> Ppn;

    /// Read the instruction at `va` through the table currently installed for the process.
    fn fetch_instruction(&mut self, va: u64) -> Option<u32>;

    /// Install `root` as the process's active address space.
    fn install_table(&mut self, root: Ppn);

    /// Kill the current process once the trap handler returns.
    fn kill_current(&mut self);
}

/// The guest registers saved on trap entry.
pub trait TrapFrame {
    fn pc(&self) -> u64;
    fn set_pc(&mut self, pc: u64);
    /// x0 always reads 0.
    fn read(&self, reg: u32) -> u64;
    /// Writes to x0 are discarded.
    fn write(&mut self, reg: u32, value: u64);
}

/// A plain saved-register block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestFrame {
    pub pc: u64,
    pub xregs: XRegisters,
}

impl GuestFrame {
    pub const fn new(pc: u64) -> Self {
        Self {
            pc,
            xregs: XRegisters::new(),
        }
    }
}

impl TrapFrame for GuestFrame {
    fn pc(&self) -> u64 {
        self.pc
    }

    fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    fn read(&self, reg: u32) -> u64 {
        self.xregs.read(reg)
    }

    fn write(&mut self, reg: u32, value: u64) {
        self.xregs.write(reg, value);
    }
}
