
use helper::{
    Guest, CSRRS, CSRRW, EBREAK, ECALL, MACHINE_HANDLER, MRET, SRET, SUPERVISOR_HANDLER,
    USER_ENTRY,
};
use kernel::vm::{ActiveTable, Emulated, VirtConfig, VirtError};
use riscv::cpu::Mode;
use riscv::csr::*;
use riscv::decode::decode;

/// Set `medeleg` bits and the supervisor trap vector before booting.
fn delegate(guest: &mut Guest, medeleg: u64) -> anyhow::Result<()> {
    guest.frame.xregs.write(5, medeleg);
    guest.frame.xregs.write(6, SUPERVISOR_HANDLER);
    guest.run(&[
        helper::csr(CSRRW, 0, MEDELEG, 5), // csrrw x0, medeleg, t0
        helper::csr(CSRRW, 0, STVEC, 6), // csrrw x0, stvec, t1
    ])?;
    Ok(())
}

#[test]
fn ecall_from_user_traps_to_machine() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.boot()?;
    let guest_table = guest.state.tables().unwrap().guest;
    assert_eq!(guest.host.installed, guest_table);

    guest.host.load(USER_ENTRY, &[ECALL]);
    assert_eq!(
        guest.step()?,
        Emulated::Trap {
            cause: 8,
            from: Mode::User,
            to: Mode::Machine,
        }
    );
    let regs = guest.state.registers();
    assert_eq!(regs.read(MCAUSE), 8);
    assert_eq!(regs.read_field(MSTATUS, XSTATUS_MPP), Mode::User.bits());
    assert_eq!(regs.read_field(MSTATUS, XSTATUS_MIE), 0);
    assert_eq!(regs.read(MEPC), USER_ENTRY + 4);
    assert_eq!(regs.read(MTVAL), 0);
    assert_eq!(guest.frame.pc, MACHINE_HANDLER);
    assert_eq!(guest.state.mode(), Mode::Machine);
    assert_eq!(guest.host.installed, guest.host.process_root);
    assert_eq!(guest.state.tables().unwrap().active_root(), guest.host.process_root);
    Ok(())
}

#[test]
fn ecall_then_mret_resumes_after_ecall() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.boot()?;
    guest.host.load(USER_ENTRY, &[ECALL]);
    guest.host.load(MACHINE_HANDLER, &[MRET]);
    guest.step()?;
    assert_eq!(
        guest.step()?,
        Emulated::Return {
            from: Mode::Machine,
            to: Mode::User,
        }
    );
    assert_eq!(guest.frame.pc, USER_ENTRY + 4);
    assert_eq!(guest.state.mode(), Mode::User);
    assert_eq!(guest.state.registers().read_field(MSTATUS, XSTATUS_MPP), 0);
    let tables = guest.state.tables().unwrap();
    assert_eq!(tables.active, ActiveTable::Guest);
    assert_eq!(tables.active_root(), tables.guest);
    assert_eq!(guest.host.installed, tables.guest);
    Ok(())
}

#[test]
fn mret_restores_interrupt_enable() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.frame.xregs.write(5, XSTATUS_MIE | XSTATUS_MPRV);
    guest.run(&[helper::csr(CSRRS, 0, MSTATUS, 5)])?; // csrrs x0, mstatus, t0
    guest.boot()?;
    let regs = guest.state.registers();
    // MPIE was never set, so mret clears MIE
    assert_eq!(regs.read_field(MSTATUS, XSTATUS_MIE), 0);
    assert_eq!(regs.read_field(MSTATUS, XSTATUS_MPIE), 1);
    assert_eq!(regs.read_field(MSTATUS, XSTATUS_MPRV), 0);

    // a trap from user moves MIE (0) into MPIE; returning moves it back
    guest.host.load(USER_ENTRY, &[ECALL]);
    guest.host.load(MACHINE_HANDLER, &[MRET]);
    guest.step()?;
    assert_eq!(guest.state.registers().read_field(MSTATUS, XSTATUS_MPIE), 0);
    guest.step()?;
    assert_eq!(guest.state.registers().read_field(MSTATUS, XSTATUS_MIE), 0);
    assert_eq!(guest.state.registers().read_field(MSTATUS, XSTATUS_MPIE), 1);
    Ok(())
}

#[test]
fn ecall_from_supervisor_traps_to_machine() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.boot_into(Mode::Supervisor, USER_ENTRY)?;
    assert_eq!(guest.state.mode(), Mode::Supervisor);
    guest.run(&[ECALL])?;
    assert_eq!(guest.state.mode(), Mode::Machine);
    assert_eq!(guest.state.registers().read(MCAUSE), 9);
    assert_eq!(
        guest.state.registers().read_field(MSTATUS, XSTATUS_MPP),
        Mode::Supervisor.bits()
    );
    assert_eq!(guest.frame.pc, MACHINE_HANDLER);
    Ok(())
}

#[test]
fn ecall_from_machine() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.frame.xregs.write(5, MACHINE_HANDLER);
    // delegation never applies to machine-mode traps
    guest.frame.xregs.write(6, 1 << 11);
    guest.run(&[
        helper::csr(CSRRW, 0, MTVEC, 5), // csrrw x0, mtvec, t0
        helper::csr(CSRRW, 0, MEDELEG, 6), // csrrw x0, medeleg, t1
        ECALL,
    ])?;
    assert_eq!(guest.state.mode(), Mode::Machine);
    assert_eq!(guest.state.registers().read(MCAUSE), 11);
    assert_eq!(
        guest.state.registers().read_field(MSTATUS, XSTATUS_MPP),
        Mode::Machine.bits()
    );
    assert_eq!(guest.frame.pc, MACHINE_HANDLER);
    Ok(())
}

#[test]
fn delegated_ecall_from_user_traps_to_supervisor() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    delegate(&mut guest, 1 << 8)?;
    guest.boot()?;
    let installs = guest.host.installs.len();

    guest.host.load(USER_ENTRY, &[ECALL]);
    guest.host.load(SUPERVISOR_HANDLER, &[SRET]);
    assert_eq!(
        guest.step()?,
        Emulated::Trap {
            cause: 8,
            from: Mode::User,
            to: Mode::Supervisor,
        }
    );
    let regs = guest.state.registers();
    assert_eq!(regs.read(SCAUSE), 8);
    assert_eq!(regs.read(SEPC), USER_ENTRY + 4);
    assert_eq!(regs.read_field(SSTATUS, XSTATUS_SPP), 0);
    assert_eq!(regs.read(MCAUSE), 0);
    assert_eq!(guest.frame.pc, SUPERVISOR_HANDLER);
    assert_eq!(guest.state.mode(), Mode::Supervisor);
    // user and supervisor share the shadow table
    assert_eq!(guest.host.installs.len(), installs);

    guest.step()?;
    assert_eq!(guest.state.mode(), Mode::User);
    assert_eq!(guest.frame.pc, USER_ENTRY + 4);
    assert_eq!(guest.state.registers().read_field(SSTATUS, XSTATUS_SPIE), 1);
    Ok(())
}

#[test]
fn delegated_ecall_from_supervisor_stays_in_supervisor() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    delegate(&mut guest, 1 << 9)?;
    guest.boot_into(Mode::Supervisor, USER_ENTRY)?;
    guest.host.load(USER_ENTRY, &[ECALL]);
    guest.host.load(SUPERVISOR_HANDLER, &[SRET]);

    guest.step()?;
    assert_eq!(guest.state.mode(), Mode::Supervisor);
    assert_eq!(guest.state.registers().read(SCAUSE), 9);
    assert_eq!(guest.state.registers().read_field(SSTATUS, XSTATUS_SPP), 1);

    guest.step()?;
    assert_eq!(guest.state.mode(), Mode::Supervisor);
    assert_eq!(guest.frame.pc, USER_ENTRY + 4);
    assert_eq!(guest.state.registers().read_field(SSTATUS, XSTATUS_SPP), 0);
    Ok(())
}

#[test]
fn ebreak_is_a_breakpoint_trap() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.boot()?;
    guest.host.load(USER_ENTRY, &[EBREAK]);
    assert_eq!(
        guest.step()?,
        Emulated::Trap {
            cause: 3,
            from: Mode::User,
            to: Mode::Machine,
        }
    );
    assert_eq!(guest.state.registers().read(MEPC), USER_ENTRY + 4);
    Ok(())
}

#[test]
fn trap_vector_mode_bits_are_ignored() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.frame.xregs.write(5, MACHINE_HANDLER | 0b01);
    guest.run(&[helper::csr(CSRRW, 0, MTVEC, 5), EBREAK])?; // csrrw x0, mtvec, t0; ebreak
    assert_eq!(guest.frame.pc, MACHINE_HANDLER);
    Ok(())
}

#[test]
fn sret_outside_supervisor_changes_nothing() -> anyhow::Result<()> {
    for mode in [Mode::User, Mode::Machine] {
        let mut guest = Guest::new(VirtConfig::new());
        guest.boot_into(mode, USER_ENTRY)?;
        let regs = guest.state.registers().clone();
        let frame = guest.frame.clone();
        let installed = guest.host.installed;

        let err = guest
            .state
            .emulate(&mut guest.host, &mut guest.frame, decode(SRET)?)
            .unwrap_err();
        assert_eq!(
            err,
            VirtError::InvalidTransition {
                instruction: "sret",
                mode,
            }
        );
        assert_eq!(guest.state.registers(), &regs);
        assert_eq!(guest.state.mode(), mode);
        assert_eq!(guest.frame, frame);
        assert_eq!(guest.host.installed, installed);
        assert!(!guest.host.killed);

        // taken as a trap, the same instruction ends the guest
        guest.host.load(USER_ENTRY, &[SRET]);
        assert_eq!(guest.step(), Err(err));
        assert!(guest.host.killed);
    }
    Ok(())
}

#[test]
fn mret_outside_machine_terminates() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.boot()?;
    guest.host.load(USER_ENTRY, &[MRET]);
    assert_eq!(
        guest.step(),
        Err(VirtError::InvalidTransition {
            instruction: "mret",
            mode: Mode::User,
        })
    );
    assert!(guest.host.killed);
    assert_eq!(guest.state.mode(), Mode::Machine);
    Ok(())
}

#[test]
fn mret_to_hypervisor_level_terminates() -> anyhow::Result<()> {
    let mut guest = Guest::new(VirtConfig::new());
    guest.frame.xregs.write(5, 0b10 << 11);
    guest.host.load(guest.frame.pc, &[helper::csr(CSRRS, 0, MSTATUS, 5), MRET]);
    guest.step()?;
    assert!(matches!(
        guest.step(),
        Err(VirtError::InvalidTransition {
            instruction: "mret",
            mode: Mode::Machine,
        })
    ));
    assert!(guest.host.killed);
    Ok(())
}
