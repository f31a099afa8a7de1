//! The decode module splits a 32-bit instruction word into its I-type fields and recognizes the
//! SYSTEM-opcode instructions that trap when a guest executes them without real privilege.

use core::fmt;

use crate::csr::{CsrAddress, CSR_ADDRESS_MASK};

/// The SYSTEM major opcode. Every privileged instruction lives here.
pub const SYSTEM_OPCODE: u32 = 0x73;
/// Width in bytes of an uncompressed instruction.
pub const INSTRUCTION_WIDTH: u64 = 4;

const ECALL_IMM: u32 = 0x000;
const EBREAK_IMM: u32 = 0x001;
const SRET_IMM: u32 = 0x102;
const MRET_IMM: u32 = 0x302;

/// The raw fields of an I-type instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    pub opcode: u32,
    pub rd: u32,
    pub funct3: u32,
    pub rs1: u32,
    pub imm: u32,
}

impl Fields {
    pub const fn from_raw(inst: u32) -> Self {
        Self {
            opcode: inst & 0x0000007f,
            rd: (inst & 0x00000f80) >> 7,
            funct3: (inst & 0x00007000) >> 12,
            rs1: (inst & 0x000f8000) >> 15,
            imm: (inst >> 20) & CSR_ADDRESS_MASK,
        }
    }
}

/// The read-modify-write operation of a CSR instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrOp {
    /// csrrw / csrrwi: replace the register.
    Swap,
    /// csrrs / csrrsi: OR the operand into the register.
    Set,
    /// csrrc / csrrci: clear the operand's bits from the register.
    Clear,
}

impl CsrOp {
    /// The new register value given the `old` value and the operand.
    pub const fn apply(self, old: u64, operand: u64) -> u64 {
        match self {
            CsrOp::Swap => operand,
            CsrOp::Set => old | operand,
            CsrOp::Clear => old & !operand,
        }
    }
}

/// The source of a CSR instruction's operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrOperand {
    /// A general-purpose register number.
    Register(u32),
    /// A 5-bit zero-extended literal carried in the rs1 field.
    Immediate(u32),
}

impl CsrOperand {
    /// The raw 5-bit rs1 field the operand came from.
    pub const fn field(&self) -> u32 {
        match self {
            CsrOperand::Register(reg) => *reg,
            CsrOperand::Immediate(uimm) => *uimm,
        }
    }
}

/// A decoded SYSTEM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemInst {
    Ecall,
    Ebreak,
    Sret,
    Mret,
    Csr {
        op: CsrOp,
        csr: CsrAddress,
        rd: u32,
        operand: CsrOperand,
    },
}

impl SystemInst {
    pub fn name(&self) -> &'static str {
        match self {
            SystemInst::Ecall => "ecall",
            SystemInst::Ebreak => "ebreak",
            SystemInst::Sret => "sret",
            SystemInst::Mret => "mret",
            SystemInst::Csr { op, operand, .. } => match (op, operand) {
                (CsrOp::Swap, CsrOperand::Register(_)) => "csrrw",
                (CsrOp::Set, CsrOperand::Register(_)) => "csrrs",
                (CsrOp::Clear, CsrOperand::Register(_)) => "csrrc",
                (CsrOp::Swap, CsrOperand::Immediate(_)) => "csrrwi",
                (CsrOp::Set, CsrOperand::Immediate(_)) => "csrrsi",
                (CsrOp::Clear, CsrOperand::Immediate(_)) => "csrrci",
            },
        }
    }
}

/// Why an instruction word is not an emulatable SYSTEM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The major opcode is not SYSTEM.
    NotSystem { inst: u32 },
    /// funct3 selects no supported form (0b100 is reserved).
    UnsupportedFunct3 { inst: u32, funct3: u32 },
    /// funct3 is 0 but the immediate/operand fields name no supported instruction.
    UnsupportedSystem { inst: u32 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotSystem { inst } => {
                write!(f, "{:#010x} is not a system instruction", inst)
            }
            DecodeError::UnsupportedFunct3 { inst, funct3 } => {
                write!(f, "{:#010x} has unsupported funct3 {:#x}", inst, funct3)
            }
            DecodeError::UnsupportedSystem { inst } => {
                write!(f, "{:#010x} is not a supported privileged instruction", inst)
            }
        }
    }
}

impl core::error::Error for DecodeError {}

/// Decode a faulting instruction word.
pub fn decode(inst: u32) -> Result<SystemInst, DecodeError> {
    let fields = Fields::from_raw(inst);
    if fields.opcode != SYSTEM_OPCODE {
        return Err(DecodeError::NotSystem { inst });
    }

    let csr = fields.imm as CsrAddress;
    let csr_inst = |op, operand| SystemInst::Csr {
        op,
        csr,
        rd: fields.rd,
        operand,
    };

    match fields.funct3 {
        0x0 => {
            // ECALL, EBREAK and the trap returns carry no operands.
            if fields.rd != 0 || fields.rs1 != 0 {
                return Err(DecodeError::UnsupportedSystem { inst });
            }
            match fields.imm {
                ECALL_IMM => Ok(SystemInst::Ecall),
                EBREAK_IMM => Ok(SystemInst::Ebreak),
                SRET_IMM => Ok(SystemInst::Sret),
                MRET_IMM => Ok(SystemInst::Mret),
                _ => Err(DecodeError::UnsupportedSystem { inst }),
            }
        }
        0x1 => Ok(csr_inst(CsrOp::Swap, CsrOperand::Register(fields.rs1))),
        0x2 => Ok(csr_inst(CsrOp::Set, CsrOperand::Register(fields.rs1))),
        0x3 => Ok(csr_inst(CsrOp::Clear, CsrOperand::Register(fields.rs1))),
        0x5 => Ok(csr_inst(CsrOp::Swap, CsrOperand::Immediate(fields.rs1))),
        0x6 => Ok(csr_inst(CsrOp::Set, CsrOperand::Immediate(fields.rs1))),
        0x7 => Ok(csr_inst(CsrOp::Clear, CsrOperand::Immediate(fields.rs1))),
        funct3 => Err(DecodeError::UnsupportedFunct3 { inst, funct3 }),
    }
}
