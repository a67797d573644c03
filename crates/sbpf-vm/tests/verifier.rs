//! Static verification through the public surface
//!
//! The verifier's per-rule checks live next to it; these tests cover how
//! verification interacts with loading and execution.

use sbpf_vm::test_harness::*;
use sbpf_vm::{Error, Interpreter};

fn verify_asm(asm: &Asm) -> Result<(), VerifyError> {
    sbpf_vm::verify(&asm.text())
}

// =============================================================================
// Acceptance
// =============================================================================

#[test]
fn test_accepts_every_instruction_class() {
    let asm = Asm::new()
        .lddw(1, 0x1122_3344_5566_7788)
        .mov64_imm(2, 3)
        .alu_imm(op::MUL32_IMM, 2, 7)
        .alu_reg(op::ADD64_REG, 1, 2)
        .alu_imm(op::LSH64_IMM, 1, 63)
        .alu_imm(op::ARSH32_IMM, 2, 31)
        .alu_imm(op::NEG64, 3, 0)
        .alu_imm(op::BE, 1, 16)
        .alu_imm(op::SDIV64_IMM, 2, -1)
        .store_imm(op::STDW, 10, -8, 1)
        .store_reg(op::STXW, 10, -16, 2)
        .load(op::LDXH, 4, 10, -16)
        .jump_imm(op::JSGT_IMM, 4, 0, 1)
        .ja(0)
        .syscall("sol_log_compute_units_")
        .callx(4)
        .exit();
    assert_eq!(verify_asm(&asm), Ok(()));
}

#[test]
fn test_backward_jump_to_start() {
    let asm = Asm::new().add64_imm(1, 1).jump_imm(op::JLT_IMM, 1, 10, -2).exit();
    assert_eq!(verify_asm(&asm), Ok(()));
}

// =============================================================================
// Rejection
// =============================================================================

#[test]
fn test_reports_first_violation() {
    let asm = Asm::new()
        .mov64_imm(0, 0)
        .alu_imm(op::DIV64_IMM, 0, 0)
        .ins(0xff, 0, 0, 0, 0)
        .exit();
    let err = verify_asm(&asm).unwrap_err();
    assert_eq!(err, VerifyError::DivisionByZero { pc: 1 });
    assert_eq!(err.pc(), Some(1));
}

#[test]
fn test_jump_to_lddw_start_is_allowed() {
    let asm = Asm::new().ja(0).lddw(0, 5).exit();
    assert_eq!(verify_asm(&asm), Ok(()));

    let asm = Asm::new().ja(1).lddw(0, 5).exit();
    assert_eq!(
        verify_asm(&asm),
        Err(VerifyError::JumpIntoLddw { pc: 0, target: 2 })
    );
}

#[test]
fn test_error_messages() {
    assert_eq!(
        VerifyError::DivisionByZero { pc: 3 }.to_string(),
        "division by zero at pc 3"
    );
    assert_eq!(
        VerifyError::UnknownOpcode { pc: 0, opcode: 0xff }.to_string(),
        "unknown opcode 0xff at pc 0"
    );
    assert_eq!(VerifyError::UnalignedText(9).pc(), None);
}

// =============================================================================
// Interaction with loading and execution
// =============================================================================

#[test]
fn test_loading_does_not_verify() {
    let asm = Asm::new().alu_imm(op::MOD64_IMM, 0, 0).exit();
    let program = sbpf_vm::load(&ElfBuilder::new(&asm).build()).expect("load");
    assert_eq!(
        program.verify(),
        Err(VerifyError::DivisionByZero { pc: 0 })
    );
}

#[test]
fn test_interpreter_refuses_unverified_program() {
    let program = assemble(&Asm::new().mov64_imm(10, 0).exit());
    let syscalls = SyscallRegistry::with_builtins();
    let err = Interpreter::new(&program, &syscalls, VmOptions::default()).unwrap_err();
    assert_eq!(err, VerifyError::InvalidDstRegister { pc: 0, reg: 10 });

    let err: Error = err.into();
    assert!(err.to_string().starts_with("verification failed"), "{err}");
}

#[test]
fn test_program_from_text_is_verified_lazily() {
    // An out-of-range shift only matters once someone asks.
    let program = assemble(&Asm::new().alu_imm(op::LSH32_IMM, 1, 32).exit());
    assert_eq!(program.slot_count(), 2);
    assert_eq!(
        program.verify(),
        Err(VerifyError::ShiftOutOfRange { pc: 0, shift: 32 })
    );
}
