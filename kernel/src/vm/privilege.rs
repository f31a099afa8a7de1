//! Trap entry and return: ECALL, EBREAK, MRET and SRET.

use log::debug;
use riscv::cpu::Mode;
use riscv::csr::*;
use riscv::decode::INSTRUCTION_WIDTH;
use riscv::exception::Exception;

use super::{Emulated, Host, TrapFrame, VirtError, VirtState};

impl VirtState {
    pub(super) fn environment_call<H: Host, F: TrapFrame>(
        &mut self,
        host: &mut H,
        frame: &mut F,
    ) -> Result<Emulated, VirtError> {
        self.take_trap(host, frame, Exception::environment_call(self.mode))
    }

    pub(super) fn breakpoint<H: Host, F: TrapFrame>(
        &mut self,
        host: &mut H,
        frame: &mut F,
    ) -> Result<Emulated, VirtError> {
        self.take_trap(host, frame, Exception::Breakpoint)
    }

    /// The mode that handles `exception`. Traps from below machine mode go to supervisor mode
    /// when their medeleg bit is set; machine-mode traps are never delegated.
    fn trap_target(&self, exception: Exception) -> Mode {
        let delegated = self.regs.read(MEDELEG) & (1 << exception.exception_code()) != 0;
        if self.mode < Mode::Machine && delegated {
            Mode::Supervisor
        } else {
            Mode::Machine
        }
    }

    fn take_trap<H: Host, F: TrapFrame>(
        &mut self,
        host: &mut H,
        frame: &mut F,
        exception: Exception,
    ) -> Result<Emulated, VirtError> {
        let from = self.mode;
        let to = self.trap_target(exception);
        let cause = exception.exception_code();
        // The trapping instruction has been carried out by the time the handler runs, so the
        // handler's xRET resumes after it.
        let epc = frame.pc().wrapping_add(INSTRUCTION_WIDTH);

        match to {
            Mode::Machine => {
                self.regs.write(MEPC, epc);
                self.regs.write(MCAUSE, cause);
                self.regs.write(MTVAL, 0);
                // When a trap is taken from privilege mode y into privilege mode x, xPIE is set
                // to the value of xIE; xIE is set to 0; and xPP is set to y.
                let mie = self.regs.read_field(MSTATUS, XSTATUS_MIE);
                self.regs.write_field(MSTATUS, XSTATUS_MPIE, mie);
                self.regs.write_field(MSTATUS, XSTATUS_MIE, 0);
                self.regs.write_field(MSTATUS, XSTATUS_MPP, from.bits());
                frame.set_pc(self.regs.read(MTVEC) & !0b11);
            }
            _ => {
                self.regs.write(SEPC, epc);
                self.regs.write(SCAUSE, cause);
                self.regs.write(STVAL, 0);
                let sie = self.regs.read_field(SSTATUS, XSTATUS_SIE);
                self.regs.write_field(SSTATUS, XSTATUS_SPIE, sie);
                self.regs.write_field(SSTATUS, XSTATUS_SIE, 0);
                // SPP is one bit wide: trap from user or from supervisor.
                self.regs
                    .write_field(SSTATUS, XSTATUS_SPP, (from == Mode::Supervisor) as u64);
                frame.set_pc(self.regs.read(STVEC) & !0b11);
            }
        }

        debug!(
            "{:?} from {} handled in {} mode, vector {:#x}",
            exception,
            from,
            to,
            frame.pc()
        );
        self.switch_mode(host, to);
        Ok(Emulated::Trap { cause, from, to })
    }

    pub(super) fn mret<H: Host, F: TrapFrame>(
        &mut self,
        host: &mut H,
        frame: &mut F,
    ) -> Result<Emulated, VirtError> {
        let invalid = VirtError::InvalidTransition {
            instruction: "mret",
            mode: self.mode,
        };
        if self.mode != Mode::Machine {
            return Err(invalid);
        }
        let to = Mode::from_bits(self.regs.read_field(MSTATUS, XSTATUS_MPP)).ok_or(invalid)?;

        // MIE = MPIE, MPIE = 1, MPP = U; returning below M also clears MPRV.
        let mpie = self.regs.read_field(MSTATUS, XSTATUS_MPIE);
        self.regs.write_field(MSTATUS, XSTATUS_MIE, mpie);
        self.regs.write_field(MSTATUS, XSTATUS_MPIE, 1);
        self.regs.write_field(MSTATUS, XSTATUS_MPP, Mode::User.bits());
        if to != Mode::Machine {
            self.regs.write_field(MSTATUS, XSTATUS_MPRV, 0);
        }
        frame.set_pc(self.regs.read(MEPC));

        self.switch_mode(host, to);
        Ok(Emulated::Return {
            from: Mode::Machine,
            to,
        })
    }

    pub(super) fn sret<H: Host, F: TrapFrame>(
        &mut self,
        host: &mut H,
        frame: &mut F,
    ) -> Result<Emulated, VirtError> {
        if self.mode != Mode::Supervisor {
            return Err(VirtError::InvalidTransition {
                instruction: "sret",
                mode: self.mode,
            });
        }
        let to = match self.regs.read_field(SSTATUS, XSTATUS_SPP) {
            0 => Mode::User,
            _ => Mode::Supervisor,
        };

        // SIE = SPIE, SPIE = 1, SPP = U.
        let spie = self.regs.read_field(SSTATUS, XSTATUS_SPIE);
        self.regs.write_field(SSTATUS, XSTATUS_SIE, spie);
        self.regs.write_field(SSTATUS, XSTATUS_SPIE, 1);
        self.regs.write_field(SSTATUS, XSTATUS_SPP, 0);
        frame.set_pc(self.regs.read(SEPC));

        self.switch_mode(host, to);
        Ok(Emulated::Return {
            from: Mode::Supervisor,
            to,
        })
    }
}
