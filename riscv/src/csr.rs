//! The csr module contains the addresses of the control and status registers (CSRs) and the bit
//! fields the privilege layer reads and writes.

pub type CsrAddress = u16;

/// The width of a CSR address field.
pub const CSR_ADDRESS_MASK: u32 = 0xfff;

//////////////////////////////
// User-level CSR addresses //
//////////////////////////////
// User trap setup.
/// User status register.
pub const USTATUS: CsrAddress = 0x000;
/// User interrupt-enable register.
pub const UIE: CsrAddress = 0x004;
/// User trap handler base address.
pub const UTVEC: CsrAddress = 0x005;

// User trap handling.
/// Scratch register for user trap handlers.
pub const USCRATCH: CsrAddress = 0x040;
/// User exception program counter.
pub const UEPC: CsrAddress = 0x041;
/// User trap cause.
pub const UCAUSE: CsrAddress = 0x042;
/// User bad address or instruction.
pub const UTVAL: CsrAddress = 0x043;
/// User interrupt pending.
pub const UIP: CsrAddress = 0x044;

////////////////////////////////////
// Supervisor-level CSR addresses //
////////////////////////////////////
// Supervisor trap setup.
/// Supervisor status register.
pub const SSTATUS: CsrAddress = 0x100;
/// Supervisor exception delegation register.
pub const SEDELEG: CsrAddress = 0x102;
/// Supervisor interrupt delegation register.
pub const SIDELEG: CsrAddress = 0x103;
/// Supervisor interrupt-enable register.
pub const SIE: CsrAddress = 0x104;
/// Supervisor trap handler base address.
pub const STVEC: CsrAddress = 0x105;
/// Supervisor counter enable.
pub const SCOUNTEREN: CsrAddress = 0x106;

// Supervisor trap handling.
/// Scratch register for supervisor trap handlers.
pub const SSCRATCH: CsrAddress = 0x140;
/// Supervisor exception program counter.
pub const SEPC: CsrAddress = 0x141;
/// Supervisor trap cause.
pub const SCAUSE: CsrAddress = 0x142;
/// Supervisor bad address or instruction.
pub const STVAL: CsrAddress = 0x143;
/// Supervisor interrupt pending.
pub const SIP: CsrAddress = 0x144;

// Supervisor protection and translation.
/// Supervisor address translation and protection.
pub const SATP: CsrAddress = 0x180;

/////////////////////////////////
// Machine-level CSR addresses //
/////////////////////////////////
// Machine information registers.
/// Vendor ID.
pub const MVENDORID: CsrAddress = 0xf11;
/// Architecture ID.
pub const MARCHID: CsrAddress = 0xf12;
/// Implementation ID.
pub const MIMPID: CsrAddress = 0xf13;
/// Hardware thread ID.
pub const MHARTID: CsrAddress = 0xf14;

// Machine trap setup.
/// Machine status register.
pub const MSTATUS: CsrAddress = 0x300;
/// ISA and extensions.
pub const MISA: CsrAddress = 0x301;
/// Machine exception delegation register.
pub const MEDELEG: CsrAddress = 0x302;
/// Machine interrupt delegation register.
pub const MIDELEG: CsrAddress = 0x303;
/// Machine interrupt-enable register.
pub const MIE: CsrAddress = 0x304;
/// Machine trap-handler base address.
pub const MTVEC: CsrAddress = 0x305;
/// Machine counter enable.
pub const MCOUNTEREN: CsrAddress = 0x306;
/// Additional machine status register (upper half on RV32).
pub const MSTATUSH: CsrAddress = 0x310;

// Machine trap handling.
/// Scratch register for machine trap handlers.
pub const MSCRATCH: CsrAddress = 0x340;
/// Machine exception program counter.
pub const MEPC: CsrAddress = 0x341;
/// Machine trap cause.
pub const MCAUSE: CsrAddress = 0x342;
/// Machine bad address or instruction.
pub const MTVAL: CsrAddress = 0x343;
/// Machine interrupt pending.
pub const MIP: CsrAddress = 0x344;
/// Machine trap instruction (transformed).
pub const MTINST: CsrAddress = 0x34a;
/// Machine bad guest physical address.
pub const MTVAL2: CsrAddress = 0x34b;

// Machine memory protection.
/// Physical memory protection configuration, entries 0-7 on RV64.
pub const PMPCFG0: CsrAddress = 0x3a0;
/// Physical memory protection address register 0.
pub const PMPADDR0: CsrAddress = 0x3b0;

// mstatus and sstatus fields.
/// Supervisor interrupt enable.
pub const XSTATUS_SIE: u64 = 1 << 1;
/// Machine interrupt enable.
pub const XSTATUS_MIE: u64 = 1 << 3;
/// Previous supervisor interrupt enable.
pub const XSTATUS_SPIE: u64 = 1 << 5;
/// Previous machine interrupt enable.
pub const XSTATUS_MPIE: u64 = 1 << 7;
/// Previous supervisor privilege (one bit: user or supervisor).
pub const XSTATUS_SPP: u64 = 1 << 8;
/// Previous machine privilege (two bits).
pub const XSTATUS_MPP: u64 = 0b11 << 11;
/// Modify privilege.
pub const XSTATUS_MPRV: u64 = 1 << 17;

// misa fields.
/// MXL = 2, a 64-bit hart.
pub const MISA_MXL_64: u64 = 2 << 62;
pub const MISA_A: u64 = 1 << 0;
pub const MISA_I: u64 = 1 << 8;
pub const MISA_M: u64 = 1 << 12;
pub const MISA_S: u64 = 1 << 18;
pub const MISA_U: u64 = 1 << 20;

// pmpcfg fields, for the low byte (entry 0).
pub const PMPCFG_R: u64 = 1 << 0;
pub const PMPCFG_W: u64 = 1 << 1;
pub const PMPCFG_X: u64 = 1 << 2;
/// Address-matching mode.
pub const PMPCFG_A: u64 = 0b11 << 3;
/// Address-matching: top of range.
pub const PMP_A_TOR: u64 = 0b01;
/// pmpaddr registers hold bits [55:2] of the address.
pub const PMPADDR_SHIFT: u32 = 2;

/// Extract a field from `value` described by a contiguous `mask`.
pub const fn read_field(value: u64, mask: u64) -> u64 {
    (value & mask) >> mask.trailing_zeros()
}

/// Return `value` with the field described by `mask` replaced by `field`.
pub const fn write_field(value: u64, mask: u64, field: u64) -> u64 {
    (value & !mask) | ((field << mask.trailing_zeros()) & mask)
}

/// The two-bit privilege level encoded in bits [9:8] of a CSR address.
pub const fn address_privilege_bits(address: CsrAddress) -> u64 {
    ((address >> 8) & 0b11) as u64
}

/// Whether bits [11:10] of the address mark the CSR read-only.
pub const fn is_read_only(address: CsrAddress) -> bool {
    (address >> 10) & 0b11 == 0b11
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_helpers_follow_the_mask() {
        let status = write_field(0, XSTATUS_MPP, 0b11);
        assert_eq!(status, 0b11 << 11);
        assert_eq!(read_field(status, XSTATUS_MPP), 0b11);
        let status = write_field(status | XSTATUS_MIE, XSTATUS_MPP, 0b01);
        assert_eq!(read_field(status, XSTATUS_MPP), 0b01);
        assert_eq!(status & XSTATUS_MIE, XSTATUS_MIE);
    }

    #[test]
    fn address_encoding() {
        assert_eq!(address_privilege_bits(SSTATUS), 0b01);
        assert_eq!(address_privilege_bits(MEPC), 0b11);
        assert_eq!(address_privilege_bits(UEPC), 0b00);
        assert!(is_read_only(MVENDORID));
        assert!(is_read_only(MHARTID));
        assert!(!is_read_only(MSTATUS));
        assert!(!is_read_only(PMPADDR0));
    }
}
