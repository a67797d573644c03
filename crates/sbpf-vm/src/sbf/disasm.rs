use std::fmt::Write;

use super::Slot;
use super::opcode::{self as op, mnemonic};

/// Renders one instruction. `next` is the following slot, consulted only for
/// the upper half of `lddw`.
#[must_use]
pub fn disassemble_slot(slot: Slot, next: Option<Slot>) -> String {
    let opcode = slot.opcode();
    let Some(name) = mnemonic(opcode) else {
        return format!("invalid {opcode:#04x}");
    };
    let dst = slot.dst();
    let src = slot.src();
    let imm = slot.imm();

    match opcode {
        op::LDDW => {
            let hi = next.map_or(0, Slot::uimm);
            let value = u64::from(slot.uimm()) | (u64::from(hi) << 32);
            format!("lddw r{dst}, {value:#x}")
        }
        op::LDXB | op::LDXH | op::LDXW | op::LDXDW => {
            format!("{name} r{dst}, {}", mem_operand(src, slot.off()))
        }
        op::STB | op::STH | op::STW | op::STDW => {
            format!("{name} {}, {imm}", mem_operand(dst, slot.off()))
        }
        op::STXB | op::STXH | op::STXW | op::STXDW => {
            format!("{name} {}, r{src}", mem_operand(dst, slot.off()))
        }
        op::NEG32 | op::NEG64 => format!("{name} r{dst}"),
        op::LE | op::BE => format!("{name}{imm} r{dst}"),
        op::JA => format!("ja {}", jump_offset(slot.off())),
        op::CALL => format!("call {:#x}", slot.uimm()),
        op::CALLX => format!("callx r{}", slot.uimm()),
        op::EXIT => "exit".to_string(),
        _ if op::is_jump(opcode) => {
            let rhs = operand(opcode, src, imm);
            format!("{name} r{dst}, {rhs}, {}", jump_offset(slot.off()))
        }
        _ => format!("{name} r{dst}, {}", operand(opcode, src, imm)),
    }
}

/// Disassembles a whole `.text` image into `(pc, text)` pairs.
///
/// The second slot of an `lddw` is folded into the first.
#[must_use]
pub fn disassemble(text: &[u8]) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pc = 0;
    while let Some(slot) = Slot::read(text, pc) {
        let next = Slot::read(text, pc + 1);
        out.push((pc, disassemble_slot(slot, next)));
        pc += if op::is_wide(slot.opcode()) { 2 } else { 1 };
    }
    out
}

/// Disassembly as a listing, one instruction per line.
#[must_use]
pub fn listing(text: &[u8]) -> String {
    let mut out = String::new();
    for (pc, line) in disassemble(text) {
        let _ = writeln!(out, "{pc:>6}: {line}");
    }
    out
}

fn operand(opcode: u8, src: u8, imm: i32) -> String {
    if opcode & op::SRC_X == 0 {
        imm.to_string()
    } else {
        format!("r{src}")
    }
}

fn mem_operand(reg: u8, off: i16) -> String {
    if off < 0 {
        format!("[r{reg}-{:#x}]", off.unsigned_abs())
    } else {
        format!("[r{reg}+{off:#x}]")
    }
}

fn jump_offset(off: i16) -> String {
    if off < 0 {
        off.to_string()
    } else {
        format!("+{off}")
    }
}
