//! The six Zicsr instructions against the virtual register file.

use log::debug;
use riscv::csr::{CsrAddress, MVENDORID, PMPADDR0, PMPCFG0};
use riscv::decode::{CsrOp, CsrOperand, INSTRUCTION_WIDTH};

use super::error::AccessFault;
use super::{Emulated, Host, TrapFrame, VirtError, VirtState};

impl VirtState {
    pub(super) fn csr<H: Host, F: TrapFrame>(
        &mut self,
        host: &mut H,
        frame: &mut F,
        op: CsrOp,
        csr: CsrAddress,
        rd: u32,
        operand: CsrOperand,
    ) -> Result<Emulated, VirtError> {
        let violation = |fault| VirtError::PrivilegeViolation {
            csr,
            mode: self.mode,
            fault,
        };

        let reg = self
            .regs
            .lookup(csr)
            .ok_or_else(|| violation(AccessFault::UnknownRegister))?;
        let required = reg.required_mode();
        if self.mode < required {
            return Err(violation(AccessFault::InsufficientPrivilege { required }));
        }

        let value = match operand {
            CsrOperand::Register(rs1) => frame.read(rs1),
            CsrOperand::Immediate(uimm) => uimm as u64,
        };
        // csrrs/csrrc with x0 or a zero immediate only read the register.
        let writes = op == CsrOp::Swap || operand.field() != 0;
        if writes && self.config.enforce_read_only && reg.is_read_only() {
            return Err(violation(AccessFault::ReadOnly));
        }

        let old = reg.value;
        let new = if writes { op.apply(old, value) } else { old };
        if self.config.exit_on_vendor_id_zero && csr == MVENDORID && new == 0 {
            return Err(VirtError::VendorIdCleared);
        }

        if writes {
            self.regs.write(csr, new);
        }
        frame.write(rd, old);
        debug!(
            "csr {:#05x} {:?} in {} mode: {:#x} -> {:#x}",
            csr, op, self.mode, old, new
        );

        if writes && (csr == PMPCFG0 || csr == PMPADDR0) {
            self.reapply_protection(host);
        }

        frame.set_pc(frame.pc().wrapping_add(INSTRUCTION_WIDTH));
        Ok(Emulated::Csr { csr, op, old, new })
    }
}

