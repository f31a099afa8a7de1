//! Kernel-side trap-and-emulate privilege virtualization.
//!
//! A guest written for machine/supervisor privilege runs in a real user-mode process. Every
//! privileged instruction it executes traps into the host, which hands the trap to
//! [`vm::trap_and_emulate`] together with the process's [`vm::VirtState`]. The host is expected
//! to provide:
//! - the process's address-space table and a way to install another one
//! - instruction fetch through the installed table
//! - a physical frame allocator for the shadow page tables
//! - a way to kill the current process
#![no_std]

extern crate alloc;

pub mod task;
pub mod vm;
