//! Static bytecode verifier.
//!
//! One forward pass over `.text`. Nothing is executed; a program that passes
//! cannot name an invalid register, divide by a literal zero, shift by an
//! out-of-range immediate, jump outside the code or into the middle of an
//! `lddw`, or contain an opcode outside the instruction set.

use crate::abi::{FRAME_PTR_REG, MAX_WRITABLE_REG, SLOT_SIZE};
use crate::error::VerifyError;
use crate::sbf::Slot;
use crate::sbf::opcode as op;

/// Verifies a `.text` image.
pub fn verify(text: &[u8]) -> Result<(), VerifyError> {
    let result = verify_text(text);
    if let Err(err) = &result {
        tracing::debug!(pc = ?err.pc(), %err, "verification failed");
    }
    result
}

// Arms are grouped by instruction class.
#[allow(clippy::match_same_arms)]
fn verify_text(text: &[u8]) -> Result<(), VerifyError> {
    if text.len() % SLOT_SIZE != 0 {
        return Err(VerifyError::UnalignedText(text.len()));
    }
    if text.is_empty() {
        return Err(VerifyError::EmptyText);
    }

    let count = text.len() / SLOT_SIZE;
    let mut pc = 0;
    while let Some(slot) = Slot::read(text, pc) {
        if slot.src() > FRAME_PTR_REG {
            return Err(VerifyError::InvalidSrcRegister {
                pc,
                reg: slot.src(),
            });
        }

        match slot.opcode() {
            op::LDXB | op::LDXH | op::LDXW | op::LDXDW => {}
            op::ADD32_IMM | op::ADD32_REG | op::ADD64_IMM | op::ADD64_REG => {}
            op::SUB32_IMM | op::SUB32_REG | op::SUB64_IMM | op::SUB64_REG => {}
            op::MUL32_IMM | op::MUL32_REG | op::MUL64_IMM | op::MUL64_REG => {}
            op::OR32_IMM | op::OR32_REG | op::OR64_IMM | op::OR64_REG => {}
            op::AND32_IMM | op::AND32_REG | op::AND64_IMM | op::AND64_REG => {}
            op::XOR32_IMM | op::XOR32_REG | op::XOR64_IMM | op::XOR64_REG => {}
            op::MOV32_IMM | op::MOV32_REG | op::MOV64_IMM | op::MOV64_REG => {}
            op::LSH32_REG | op::LSH64_REG => {}
            op::RSH32_REG | op::RSH64_REG => {}
            op::ARSH32_REG | op::ARSH64_REG => {}
            op::NEG32 | op::NEG64 => {}
            op::DIV32_REG | op::DIV64_REG => {}
            op::MOD32_REG | op::MOD64_REG => {}
            op::SDIV32_REG | op::SDIV64_REG => {}
            op::CALL | op::EXIT => {}

            // Stores address memory through dst, so r10 is allowed.
            opcode if op::is_store(opcode) => {
                if slot.dst() > FRAME_PTR_REG {
                    return Err(VerifyError::InvalidDstRegister {
                        pc,
                        reg: slot.dst(),
                    });
                }
                pc += 1;
                continue;
            }

            op::LSH32_IMM | op::RSH32_IMM | op::ARSH32_IMM => {
                if slot.uimm() > 31 {
                    return Err(VerifyError::ShiftOutOfRange {
                        pc,
                        shift: slot.imm(),
                    });
                }
            }
            op::LSH64_IMM | op::RSH64_IMM | op::ARSH64_IMM => {
                if slot.uimm() > 63 {
                    return Err(VerifyError::ShiftOutOfRange {
                        pc,
                        shift: slot.imm(),
                    });
                }
            }

            op::LE | op::BE => {
                if !matches!(slot.imm(), 16 | 32 | 64) {
                    return Err(VerifyError::InvalidEndianWidth {
                        pc,
                        width: slot.imm(),
                    });
                }
            }

            op::DIV32_IMM
            | op::DIV64_IMM
            | op::MOD32_IMM
            | op::MOD64_IMM
            | op::SDIV32_IMM
            | op::SDIV64_IMM => {
                if slot.imm() == 0 {
                    return Err(VerifyError::DivisionByZero { pc });
                }
            }

            opcode if op::is_jump(opcode) => {
                let target = pc as i64 + 1 + i64::from(slot.off());
                if target < 0 || target >= count as i64 {
                    return Err(VerifyError::JumpOutOfCode { pc, target });
                }
                let target = target as usize;
                // Only the upper half of an lddw carries opcode 0 past this pass.
                if Slot::read(text, target).is_some_and(|s| s.opcode() == 0) {
                    return Err(VerifyError::JumpIntoLddw { pc, target });
                }
            }

            op::CALLX => {
                if slot.uimm() > u32::from(MAX_WRITABLE_REG) {
                    return Err(VerifyError::InvalidCallxRegister {
                        pc,
                        reg: slot.uimm(),
                    });
                }
            }

            op::LDDW => {
                match Slot::read(text, pc + 1) {
                    Some(next) if next.opcode() == 0 => {}
                    _ => return Err(VerifyError::IncompleteLddw { pc }),
                }
                if slot.dst() > MAX_WRITABLE_REG {
                    return Err(VerifyError::InvalidDstRegister {
                        pc,
                        reg: slot.dst(),
                    });
                }
                pc += 2;
                continue;
            }

            opcode => return Err(VerifyError::UnknownOpcode { pc, opcode }),
        }

        if slot.dst() > MAX_WRITABLE_REG {
            return Err(VerifyError::InvalidDstRegister {
                pc,
                reg: slot.dst(),
            });
        }
        pc += 1;
    }

    Ok(())
}
