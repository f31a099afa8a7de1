//! Trap-and-emulate virtualization of privileged state: the virtual CSR file, the emulated
//! privilege mode, and the shadow page tables that give the guest a memory view matching it.

mod arena;
mod config;
mod csr;
mod dispatch;
mod error;
mod host;
mod privilege;
pub mod regfile;
pub mod shadow;

use log::{debug, info};
use riscv::cpu::Mode;
use riscv::csr::{CsrAddress, PMPADDR0, PMPCFG0};
use riscv::decode::{CsrOp, SystemInst};

pub use arena::FrameArena;
pub use config::{ProtectionWindow, VirtConfig};
pub use dispatch::trap_and_emulate;
pub use error::{AccessFault, VirtError};
pub use host::{GuestFrame, Host, TrapFrame};
pub use regfile::{RegisterFile, VirtualRegister};
pub use shadow::{ActiveTable, PageTableMemory, Ppn, ShadowTables};

/// The effect of one emulated instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emulated {
    Csr {
        csr: CsrAddress,
        op: CsrOp,
        old: u64,
        new: u64,
    },
    /// ECALL or EBREAK, delivered to the guest's own handler at `to`.
    Trap { cause: u64, from: Mode, to: Mode },
    /// MRET or SRET.
    Return { from: Mode, to: Mode },
}

/// Virtualization state of one guest process.
///
/// Created detached; the first privileged trap attaches it to the process's address space.
#[derive(Debug, Clone)]
pub struct VirtState {
    config: VirtConfig,
    regs: RegisterFile,
    mode: Mode,
    tables: Option<ShadowTables>,
}

impl VirtState {
    pub fn new(config: VirtConfig) -> Self {
        Self {
            regs: RegisterFile::new(&config),
            config,
            mode: Mode::Machine,
            tables: None,
        }
    }

    pub fn config(&self) -> &VirtConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn tables(&self) -> Option<&ShadowTables> {
        self.tables.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.tables.is_some()
    }

    /// Capture the host's process table and build its shadow, unless already attached. The
    /// shadow starts with the protection window derived from the current PMP registers.
    pub fn attach<H: Host>(&mut self, host: &mut H) -> Result<(), VirtError> {
        if self.tables.is_some() {
            return Ok(());
        }
        let host_root = host.process_table();
        let tables = ShadowTables::build(host.memory(), host_root, &self.config.window)?;
        info!(
            "virtualizing address space {:#x}, shadow table {:#x}",
            tables.host, tables.guest
        );
        self.tables = Some(tables);
        self.reapply_protection(host);
        Ok(())
    }

    /// Undo everything: reinstall the host table, free the shadow, and return the registers
    /// and mode to power-on state.
    pub fn teardown<H: Host>(&mut self, host: &mut H) {
        if let Some(tables) = self.tables.take() {
            host.install_table(tables.host);
            shadow::destroy(host.memory(), tables.guest);
            info!("released shadow table {:#x}", tables.guest);
        }
        self.regs.reset();
        self.mode = Mode::Machine;
    }

    /// Emulate one decoded instruction. On error nothing has been changed.
    pub fn emulate<H: Host, F: TrapFrame>(
        &mut self,
        host: &mut H,
        frame: &mut F,
        inst: SystemInst,
    ) -> Result<Emulated, VirtError> {
        match inst {
            SystemInst::Ecall => self.environment_call(host, frame),
            SystemInst::Ebreak => self.breakpoint(host, frame),
            SystemInst::Mret => self.mret(host, frame),
            SystemInst::Sret => self.sret(host, frame),
            SystemInst::Csr {
                op,
                csr,
                rd,
                operand,
            } => self.csr(host, frame, op, csr, rd, operand),
        }
    }

    /// Change mode and, with it, the installed table.
    fn switch_mode<H: Host>(&mut self, host: &mut H, mode: Mode) {
        let previous = self.mode;
        self.mode = mode;
        if let Some(tables) = self.tables.as_mut() {
            let wanted = ActiveTable::for_mode(mode);
            if tables.active != wanted {
                tables.active = wanted;
                host.install_table(tables.root(wanted));
            }
        }
        debug!("privilege {} -> {}", previous, mode);
    }

    fn reapply_protection<H: Host>(&self, host: &mut H) {
        if let Some(tables) = self.tables.as_ref() {
            shadow::apply_protection(
                host.memory(),
                tables.guest,
                &self.config.window,
                self.regs.read(PMPCFG0),
                self.regs.read(PMPADDR0),
            );
        }
    }
}
