//! The cpu module contains the privileged mode and the general-purpose registers of a guest hart.

use core::fmt;

/// The number of registers.
pub const REGISTERS_COUNT: usize = 32;

/// The privileged mode.
///
/// Variants are ordered from least to most privileged, so `<` and `>=` compare privilege.
#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone)]
pub enum Mode {
    User = 0b00,
    Supervisor = 0b01,
    Machine = 0b11,
}

impl Mode {
    /// Decode a two-bit privilege field (MPP, or bits [9:8] of a CSR address).
    ///
    /// `0b10` names the hypervisor level, which is not emulated.
    pub const fn from_bits(bits: u64) -> Option<Mode> {
        match bits & 0b11 {
            0b00 => Some(Mode::User),
            0b01 => Some(Mode::Supervisor),
            0b11 => Some(Mode::Machine),
            _ => None,
        }
    }

    pub const fn bits(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::User => "user",
            Mode::Supervisor => "supervisor",
            Mode::Machine => "machine",
        };
        f.write_str(name)
    }
}

/// The integer registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRegisters {
    xregs: [u64; REGISTERS_COUNT],
}

impl XRegisters {
    /// Create a new `XRegisters` object with every register cleared.
    pub const fn new() -> Self {
        Self {
            xregs: [0; REGISTERS_COUNT],
        }
    }

    /// Read the value from a register. Indices are taken modulo the register count.
    pub fn read(&self, index: u32) -> u64 {
        self.xregs[index as usize % REGISTERS_COUNT]
    }

    /// Write the value to a register.
    pub fn write(&mut self, index: u32, value: u64) {
        // Register x0 is hardwired with all bits equal to 0.
        let index = index as usize % REGISTERS_COUNT;
        if index != 0 {
            self.xregs[index] = value;
        }
    }
}

impl Default for XRegisters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_are_ordered_by_privilege() {
        assert!(Mode::User < Mode::Supervisor);
        assert!(Mode::Supervisor < Mode::Machine);
        assert_eq!(Mode::from_bits(0b10), None);
        assert_eq!(Mode::from_bits(Mode::Supervisor.bits()), Some(Mode::Supervisor));
    }

    #[test]
    fn x0_is_hardwired() {
        let mut regs = XRegisters::new();
        regs.write(0, 0xdead);
        regs.write(5, 0xbeef);
        assert_eq!(regs.read(0), 0);
        assert_eq!(regs.read(5), 0xbeef);
    }
}
