//! The virtual CSR register file.

use alloc::collections::BTreeMap;

use riscv::cpu::Mode;
use riscv::csr::*;

use super::config::VirtConfig;

/// Every CSR the layer emulates. Anything else is an unknown register.
#[rustfmt::skip]
pub const TRACKED_CSRS: [CsrAddress; 41] = [
    // user trap setup
    USTATUS, UIE, UTVEC,
    // user trap handling
    USCRATCH, UEPC, UCAUSE, UTVAL, UIP,
    // supervisor trap setup
    SSTATUS, SEDELEG, SIDELEG, SIE, STVEC, SCOUNTEREN,
    // supervisor trap handling
    SSCRATCH, SEPC, SCAUSE, STVAL, SIP,
    // supervisor protection and translation
    SATP,
    // machine information
    MVENDORID, MARCHID, MIMPID, MHARTID,
    // machine trap setup
    MSTATUS, MISA, MEDELEG, MIDELEG, MIE, MTVEC, MCOUNTEREN, MSTATUSH,
    // machine trap handling
    MSCRATCH, MEPC, MCAUSE, MTVAL, MIP, MTINST, MTVAL2,
    // machine memory protection
    PMPCFG0, PMPADDR0,
];

/// The `misa` a guest sees: RV64IMASU.
pub const POWER_ON_MISA: u64 = MISA_MXL_64 | MISA_I | MISA_M | MISA_A | MISA_S | MISA_U;

/// Minimum mode needed to touch `address`.
///
/// Bits [9:8] of the address, except `mvendorid`, which is readable from user mode. The
/// hypervisor encoding (0b10) is not emulated and is treated as machine-only.
pub fn required_mode(address: CsrAddress) -> Mode {
    if address == MVENDORID {
        return Mode::User;
    }
    Mode::from_bits(address_privilege_bits(address)).unwrap_or(Mode::Machine)
}

/// A tracked register and its current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualRegister {
    pub address: CsrAddress,
    pub value: u64,
}

impl VirtualRegister {
    pub fn required_mode(&self) -> Mode {
        required_mode(self.address)
    }

    pub fn is_read_only(&self) -> bool {
        is_read_only(self.address)
    }
}

/// The guest's privileged registers, keyed by CSR address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    regs: BTreeMap<CsrAddress, u64>,
    vendor_id: u64,
}

impl RegisterFile {
    /// A register file holding power-on values.
    pub fn new(config: &VirtConfig) -> Self {
        let mut file = Self {
            regs: BTreeMap::new(),
            vendor_id: config.vendor_id,
        };
        file.reset();
        file
    }

    /// Return every register to its power-on value.
    pub fn reset(&mut self) {
        self.regs.clear();
        for address in TRACKED_CSRS {
            self.regs.insert(address, 0);
        }
        self.regs.insert(MVENDORID, self.vendor_id);
        self.regs.insert(MISA, POWER_ON_MISA);
    }

    pub fn lookup(&self, address: CsrAddress) -> Option<VirtualRegister> {
        self.regs
            .get(&address)
            .map(|&value| VirtualRegister { address, value })
    }

    /// Value of a tracked register; untracked addresses read as 0.
    pub fn read(&self, address: CsrAddress) -> u64 {
        self.regs.get(&address).copied().unwrap_or(0)
    }

    /// Store `value` into a tracked register. Returns false, and changes nothing, for an
    /// untracked address.
    pub fn write(&mut self, address: CsrAddress, value: u64) -> bool {
        match self.regs.get_mut(&address) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// A field of a register, e.g. `read_field(MSTATUS, XSTATUS_MPP)`.
    pub fn read_field(&self, address: CsrAddress, mask: u64) -> u64 {
        read_field(self.read(address), mask)
    }

    pub fn write_field(&mut self, address: CsrAddress, mask: u64, field: u64) {
        let value = write_field(self.read(address), mask, field);
        self.write(address, value);
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = VirtualRegister> + '_ {
        self.regs
            .iter()
            .map(|(&address, &value)| VirtualRegister { address, value })
    }
}
