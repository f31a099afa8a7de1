//! Errors of the virtualization layer.

use core::fmt;

use riscv::{cpu::Mode, csr::CsrAddress, decode::DecodeError};

/// Why a CSR access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessFault {
    /// The address is not in the tracked register set.
    UnknownRegister,
    /// The current mode is below the register's required mode.
    InsufficientPrivilege { required: Mode },
    /// A write to a register whose address marks it read-only.
    ReadOnly,
}

/// Errors of the virtualization layer.
///
/// Every error returned by [`super::trap_and_emulate`] is fatal to the guest: by the time it is
/// returned, the guest's shadow state has been torn down and the host told to kill it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtError {
    PrivilegeViolation {
        csr: CsrAddress,
        mode: Mode,
        fault: AccessFault,
    },
    /// A trap return issued from a mode that does not own it, or one that would return to a
    /// level this layer does not emulate.
    InvalidTransition {
        instruction: &'static str,
        mode: Mode,
    },
    MalformedInstruction(DecodeError),
    /// The faulting pc does not translate to readable instruction bytes.
    FetchFault { pc: u64 },
    /// The frame allocator ran dry while building the shadow table.
    OutOfFrames,
    /// The guest cleared its own `mvendorid`.
    VendorIdCleared,
}

impl From<DecodeError> for VirtError {
    fn from(err: DecodeError) -> Self {
        VirtError::MalformedInstruction(err)
    }
}

impl fmt::Display for VirtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtError::PrivilegeViolation { csr, mode, fault } => match fault {
                AccessFault::UnknownRegister => {
                    write!(f, "access to unknown csr {:#05x} in {} mode", csr, mode)
                }
                AccessFault::InsufficientPrivilege { required } => write!(
                    f,
                    "csr {:#05x} requires {} mode, guest is in {} mode",
                    csr, required, mode
                ),
                AccessFault::ReadOnly => {
                    write!(f, "write to read-only csr {:#05x} in {} mode", csr, mode)
                }
            },
            VirtError::InvalidTransition { instruction, mode } => {
                write!(f, "{} is not allowed in {} mode", instruction, mode)
            }
            VirtError::MalformedInstruction(err) => write!(f, "malformed instruction: {}", err),
            VirtError::FetchFault { pc } => write!(f, "cannot fetch instruction at {:#x}", pc),
            VirtError::OutOfFrames => f.write_str("out of page-table frames"),
            VirtError::VendorIdCleared => f.write_str("guest cleared mvendorid"),
        }
    }
}

impl core::error::Error for VirtError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            VirtError::MalformedInstruction(err) => Some(err),
            _ => None,
        }
    }
}
