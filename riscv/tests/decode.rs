
use riscv::csr::{MEPC, MSTATUS, MVENDORID, SSTATUS};
use riscv::decode::{decode, CsrOp, CsrOperand, DecodeError, Fields, SystemInst};

#[test]
fn fields_of_csrrs() {
    // csrrs a0, mstatus, t1
    let inst = 0x30032573;
    let fields = Fields::from_raw(inst);
    assert_eq!(fields.opcode, 0x73);
    assert_eq!(fields.rd, 10);
    assert_eq!(fields.funct3, 0x2);
    assert_eq!(fields.rs1, 6);
    assert_eq!(fields.imm, 0x300);
    assert_eq!(helper::csr(helper::CSRRS, 10, MSTATUS, 6), inst);
}

#[test]
fn trap_instructions() -> anyhow::Result<()> {
    assert_eq!(decode(0x00000073)?, SystemInst::Ecall); // ecall
    assert_eq!(decode(0x00100073)?, SystemInst::Ebreak); // ebreak
    assert_eq!(decode(0x10200073)?, SystemInst::Sret); // sret
    assert_eq!(decode(0x30200073)?, SystemInst::Mret); // mret
    Ok(())
}

#[test]
fn trap_instructions_reject_operands() {
    // ecall with rd = x1
    let inst = helper::system(0, 1, 0, 0);
    assert_eq!(decode(inst), Err(DecodeError::UnsupportedSystem { inst }));
    // mret with rs1 = x2
    let inst = helper::system(0, 0, 2, 0x302);
    assert_eq!(decode(inst), Err(DecodeError::UnsupportedSystem { inst }));
    // wfi is not emulated
    assert_eq!(
        decode(0x10500073),
        Err(DecodeError::UnsupportedSystem { inst: 0x10500073 })
    );
}

#[test]
fn register_forms() -> anyhow::Result<()> {
    let cases = [
        (helper::CSRRW, CsrOp::Swap, "csrrw"),
        (helper::CSRRS, CsrOp::Set, "csrrs"),
        (helper::CSRRC, CsrOp::Clear, "csrrc"),
    ];
    for (funct3, op, name) in cases {
        let inst = decode(helper::csr(funct3, 5, SSTATUS, 7))?;
        assert_eq!(
            inst,
            SystemInst::Csr {
                op,
                csr: SSTATUS,
                rd: 5,
                operand: CsrOperand::Register(7),
            }
        );
        assert_eq!(inst.name(), name);
    }
    Ok(())
}

#[test]
fn immediate_forms_reuse_rs1() -> anyhow::Result<()> {
    let cases = [
        (helper::CSRRWI, CsrOp::Swap, "csrrwi"),
        (helper::CSRRSI, CsrOp::Set, "csrrsi"),
        (helper::CSRRCI, CsrOp::Clear, "csrrci"),
    ];
    for (funct3, op, name) in cases {
        let inst = decode(helper::csr(funct3, 0, MEPC, 0x1f))?;
        assert_eq!(
            inst,
            SystemInst::Csr {
                op,
                csr: MEPC,
                rd: 0,
                operand: CsrOperand::Immediate(0x1f),
            }
        );
        assert_eq!(inst.name(), name);
    }
    Ok(())
}

#[test]
fn full_width_csr_address() -> anyhow::Result<()> {
    // csrr a0, mvendorid
    match decode(0xf1102573)? {
        SystemInst::Csr { csr, rd, .. } => {
            assert_eq!(csr, MVENDORID);
            assert_eq!(rd, 10);
        }
        other => panic!("decoded {:?}", other),
    }
    Ok(())
}

#[test]
fn reserved_funct3() {
    let inst = helper::system(0x4, 1, 2, 0x300);
    assert_eq!(
        decode(inst),
        Err(DecodeError::UnsupportedFunct3 { inst, funct3: 0x4 })
    );
}

#[test]
fn non_system_opcode() {
    // addi x16, x0, 5
    let inst = 0x00500813;
    assert_eq!(decode(inst), Err(DecodeError::NotSystem { inst }));
}

#[test]
fn csr_op_semantics() {
    assert_eq!(CsrOp::Swap.apply(0xff, 0x0f), 0x0f);
    assert_eq!(CsrOp::Set.apply(0xf0, 0x0f), 0xff);
    assert_eq!(CsrOp::Clear.apply(0xff, 0x0f), 0xf0);
}
