//! RISC-V vocabulary shared by the kernel's privilege virtualization layer: privilege modes,
//! the general-purpose register file, CSR addresses and status bits, exception causes, and the
//! SYSTEM-opcode instruction decoder.
#![no_std]

pub mod cpu;
pub mod csr;
pub mod decode;
pub mod exception;
