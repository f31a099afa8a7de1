//! The exception module contains the synchronous exceptions the privilege layer delivers to a
//! guest, and their cause codes.

use crate::cpu::Mode;

/// Exceptions a guest can raise that are reflected back into its own trap handlers.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Exception {
    Breakpoint,
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
}

impl Exception {
    /// The environment call raised by an ECALL executed in `mode`.
    pub const fn environment_call(mode: Mode) -> Exception {
        match mode {
            Mode::User => Exception::EnvironmentCallFromUMode,
            Mode::Supervisor => Exception::EnvironmentCallFromSMode,
            Mode::Machine => Exception::EnvironmentCallFromMMode,
        }
    }

    /// The value written to `mcause`/`scause`; also the `medeleg` bit index.
    pub const fn exception_code(&self) -> u64 {
        match self {
            Exception::Breakpoint => 3,
            // ECALL causes are laid out as 8 + the privilege level of the caller.
            Exception::EnvironmentCallFromUMode => 8 + Mode::User.bits(),
            Exception::EnvironmentCallFromSMode => 8 + Mode::Supervisor.bits(),
            Exception::EnvironmentCallFromMMode => 8 + Mode::Machine.bits(),
        }
    }
}
