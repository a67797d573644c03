// Opcode bytes are composed from class, size/source and operation bits.

// ── Instruction classes ──
pub const CLASS_LD: u8 = 0x00;
pub const CLASS_LDX: u8 = 0x01;
pub const CLASS_ST: u8 = 0x02;
pub const CLASS_STX: u8 = 0x03;
pub const CLASS_ALU: u8 = 0x04;
pub const CLASS_JMP: u8 = 0x05;
pub const CLASS_ALU64: u8 = 0x07;

// ── Size modes ──
pub const SIZE_W: u8 = 0x00;
pub const SIZE_H: u8 = 0x08;
pub const SIZE_B: u8 = 0x10;
pub const SIZE_DW: u8 = 0x18;

// ── Addressing modes ──
pub const ADDR_IMM: u8 = 0x00;
pub const ADDR_MEM: u8 = 0x60;

// ── Source modes ──
pub const SRC_K: u8 = 0x00;
pub const SRC_X: u8 = 0x08;

// ── ALU operations ──
pub const ALU_ADD: u8 = 0x00;
pub const ALU_SUB: u8 = 0x10;
pub const ALU_MUL: u8 = 0x20;
pub const ALU_DIV: u8 = 0x30;
pub const ALU_OR: u8 = 0x40;
pub const ALU_AND: u8 = 0x50;
pub const ALU_LSH: u8 = 0x60;
pub const ALU_RSH: u8 = 0x70;
pub const ALU_NEG: u8 = 0x80;
pub const ALU_MOD: u8 = 0x90;
pub const ALU_XOR: u8 = 0xa0;
pub const ALU_MOV: u8 = 0xb0;
pub const ALU_ARSH: u8 = 0xc0;
pub const ALU_END: u8 = 0xd0;
pub const ALU_SDIV: u8 = 0xe0;

// ── Jump operations ──
pub const JMP_ALWAYS: u8 = 0x00;
pub const JMP_EQ: u8 = 0x10;
pub const JMP_GT: u8 = 0x20;
pub const JMP_GE: u8 = 0x30;
pub const JMP_SET: u8 = 0x40;
pub const JMP_NE: u8 = 0x50;
pub const JMP_SGT: u8 = 0x60;
pub const JMP_SGE: u8 = 0x70;
pub const JMP_CALL: u8 = 0x80;
pub const JMP_EXIT: u8 = 0x90;
pub const JMP_LT: u8 = 0xa0;
pub const JMP_LE: u8 = 0xb0;
pub const JMP_SLT: u8 = 0xc0;
pub const JMP_SLE: u8 = 0xd0;

// ── Opcodes ──

pub const LDDW: u8 = CLASS_LD | ADDR_IMM | SIZE_DW;

pub const LDXB: u8 = CLASS_LDX | ADDR_MEM | SIZE_B;
pub const LDXH: u8 = CLASS_LDX | ADDR_MEM | SIZE_H;
pub const LDXW: u8 = CLASS_LDX | ADDR_MEM | SIZE_W;
pub const LDXDW: u8 = CLASS_LDX | ADDR_MEM | SIZE_DW;
pub const STB: u8 = CLASS_ST | ADDR_MEM | SIZE_B;
pub const STH: u8 = CLASS_ST | ADDR_MEM | SIZE_H;
pub const STW: u8 = CLASS_ST | ADDR_MEM | SIZE_W;
pub const STDW: u8 = CLASS_ST | ADDR_MEM | SIZE_DW;
pub const STXB: u8 = CLASS_STX | ADDR_MEM | SIZE_B;
pub const STXH: u8 = CLASS_STX | ADDR_MEM | SIZE_H;
pub const STXW: u8 = CLASS_STX | ADDR_MEM | SIZE_W;
pub const STXDW: u8 = CLASS_STX | ADDR_MEM | SIZE_DW;

pub const ADD32_IMM: u8 = CLASS_ALU | SRC_K | ALU_ADD;
pub const ADD32_REG: u8 = CLASS_ALU | SRC_X | ALU_ADD;
pub const SUB32_IMM: u8 = CLASS_ALU | SRC_K | ALU_SUB;
pub const SUB32_REG: u8 = CLASS_ALU | SRC_X | ALU_SUB;
pub const MUL32_IMM: u8 = CLASS_ALU | SRC_K | ALU_MUL;
pub const MUL32_REG: u8 = CLASS_ALU | SRC_X | ALU_MUL;
pub const DIV32_IMM: u8 = CLASS_ALU | SRC_K | ALU_DIV;
pub const DIV32_REG: u8 = CLASS_ALU | SRC_X | ALU_DIV;
pub const OR32_IMM: u8 = CLASS_ALU | SRC_K | ALU_OR;
pub const OR32_REG: u8 = CLASS_ALU | SRC_X | ALU_OR;
pub const AND32_IMM: u8 = CLASS_ALU | SRC_K | ALU_AND;
pub const AND32_REG: u8 = CLASS_ALU | SRC_X | ALU_AND;
pub const LSH32_IMM: u8 = CLASS_ALU | SRC_K | ALU_LSH;
pub const LSH32_REG: u8 = CLASS_ALU | SRC_X | ALU_LSH;
pub const RSH32_IMM: u8 = CLASS_ALU | SRC_K | ALU_RSH;
pub const RSH32_REG: u8 = CLASS_ALU | SRC_X | ALU_RSH;
pub const NEG32: u8 = CLASS_ALU | ALU_NEG;
pub const MOD32_IMM: u8 = CLASS_ALU | SRC_K | ALU_MOD;
pub const MOD32_REG: u8 = CLASS_ALU | SRC_X | ALU_MOD;
pub const XOR32_IMM: u8 = CLASS_ALU | SRC_K | ALU_XOR;
pub const XOR32_REG: u8 = CLASS_ALU | SRC_X | ALU_XOR;
pub const MOV32_IMM: u8 = CLASS_ALU | SRC_K | ALU_MOV;
pub const MOV32_REG: u8 = CLASS_ALU | SRC_X | ALU_MOV;
pub const ARSH32_IMM: u8 = CLASS_ALU | SRC_K | ALU_ARSH;
pub const ARSH32_REG: u8 = CLASS_ALU | SRC_X | ALU_ARSH;
pub const SDIV32_IMM: u8 = CLASS_ALU | SRC_K | ALU_SDIV;
pub const SDIV32_REG: u8 = CLASS_ALU | SRC_X | ALU_SDIV;
pub const LE: u8 = CLASS_ALU | SRC_K | ALU_END;
pub const BE: u8 = CLASS_ALU | SRC_X | ALU_END;

pub const ADD64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_ADD;
pub const ADD64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_ADD;
pub const SUB64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_SUB;
pub const SUB64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_SUB;
pub const MUL64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_MUL;
pub const MUL64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_MUL;
pub const DIV64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_DIV;
pub const DIV64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_DIV;
pub const OR64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_OR;
pub const OR64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_OR;
pub const AND64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_AND;
pub const AND64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_AND;
pub const LSH64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_LSH;
pub const LSH64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_LSH;
pub const RSH64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_RSH;
pub const RSH64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_RSH;
pub const NEG64: u8 = CLASS_ALU64 | ALU_NEG;
pub const MOD64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_MOD;
pub const MOD64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_MOD;
pub const XOR64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_XOR;
pub const XOR64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_XOR;
pub const MOV64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_MOV;
pub const MOV64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_MOV;
pub const ARSH64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_ARSH;
pub const ARSH64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_ARSH;
pub const SDIV64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_SDIV;
pub const SDIV64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_SDIV;

pub const JA: u8 = CLASS_JMP | JMP_ALWAYS;
pub const JEQ_IMM: u8 = CLASS_JMP | SRC_K | JMP_EQ;
pub const JEQ_REG: u8 = CLASS_JMP | SRC_X | JMP_EQ;
pub const JGT_IMM: u8 = CLASS_JMP | SRC_K | JMP_GT;
pub const JGT_REG: u8 = CLASS_JMP | SRC_X | JMP_GT;
pub const JGE_IMM: u8 = CLASS_JMP | SRC_K | JMP_GE;
pub const JGE_REG: u8 = CLASS_JMP | SRC_X | JMP_GE;
pub const JLT_IMM: u8 = CLASS_JMP | SRC_K | JMP_LT;
pub const JLT_REG: u8 = CLASS_JMP | SRC_X | JMP_LT;
pub const JLE_IMM: u8 = CLASS_JMP | SRC_K | JMP_LE;
pub const JLE_REG: u8 = CLASS_JMP | SRC_X | JMP_LE;
pub const JSET_IMM: u8 = CLASS_JMP | SRC_K | JMP_SET;
pub const JSET_REG: u8 = CLASS_JMP | SRC_X | JMP_SET;
pub const JNE_IMM: u8 = CLASS_JMP | SRC_K | JMP_NE;
pub const JNE_REG: u8 = CLASS_JMP | SRC_X | JMP_NE;
pub const JSGT_IMM: u8 = CLASS_JMP | SRC_K | JMP_SGT;
pub const JSGT_REG: u8 = CLASS_JMP | SRC_X | JMP_SGT;
pub const JSGE_IMM: u8 = CLASS_JMP | SRC_K | JMP_SGE;
pub const JSGE_REG: u8 = CLASS_JMP | SRC_X | JMP_SGE;
pub const JSLT_IMM: u8 = CLASS_JMP | SRC_K | JMP_SLT;
pub const JSLT_REG: u8 = CLASS_JMP | SRC_X | JMP_SLT;
pub const JSLE_IMM: u8 = CLASS_JMP | SRC_K | JMP_SLE;
pub const JSLE_REG: u8 = CLASS_JMP | SRC_X | JMP_SLE;

pub const CALL: u8 = CLASS_JMP | SRC_K | JMP_CALL;
pub const CALLX: u8 = CLASS_JMP | SRC_X | JMP_CALL;
pub const EXIT: u8 = CLASS_JMP | JMP_EXIT;

/// Returns the conventional mnemonic of an opcode, or `None` if the byte is
/// not part of the instruction set.
#[must_use]
pub const fn mnemonic(op: u8) -> Option<&'static str> {
    let name = match op {
        LDDW => "lddw",
        LDXB => "ldxb",
        LDXH => "ldxh",
        LDXW => "ldxw",
        LDXDW => "ldxdw",
        STB => "stb",
        STH => "sth",
        STW => "stw",
        STDW => "stdw",
        STXB => "stxb",
        STXH => "stxh",
        STXW => "stxw",
        STXDW => "stxdw",
        ADD32_IMM | ADD32_REG => "add32",
        SUB32_IMM | SUB32_REG => "sub32",
        MUL32_IMM | MUL32_REG => "mul32",
        DIV32_IMM | DIV32_REG => "div32",
        OR32_IMM | OR32_REG => "or32",
        AND32_IMM | AND32_REG => "and32",
        LSH32_IMM | LSH32_REG => "lsh32",
        RSH32_IMM | RSH32_REG => "rsh32",
        NEG32 => "neg32",
        MOD32_IMM | MOD32_REG => "mod32",
        XOR32_IMM | XOR32_REG => "xor32",
        MOV32_IMM | MOV32_REG => "mov32",
        ARSH32_IMM | ARSH32_REG => "arsh32",
        SDIV32_IMM | SDIV32_REG => "sdiv32",
        LE => "le",
        BE => "be",
        ADD64_IMM | ADD64_REG => "add64",
        SUB64_IMM | SUB64_REG => "sub64",
        MUL64_IMM | MUL64_REG => "mul64",
        DIV64_IMM | DIV64_REG => "div64",
        OR64_IMM | OR64_REG => "or64",
        AND64_IMM | AND64_REG => "and64",
        LSH64_IMM | LSH64_REG => "lsh64",
        RSH64_IMM | RSH64_REG => "rsh64",
        NEG64 => "neg64",
        MOD64_IMM | MOD64_REG => "mod64",
        XOR64_IMM | XOR64_REG => "xor64",
        MOV64_IMM | MOV64_REG => "mov64",
        ARSH64_IMM | ARSH64_REG => "arsh64",
        SDIV64_IMM | SDIV64_REG => "sdiv64",
        JA => "ja",
        JEQ_IMM | JEQ_REG => "jeq",
        JGT_IMM | JGT_REG => "jgt",
        JGE_IMM | JGE_REG => "jge",
        JLT_IMM | JLT_REG => "jlt",
        JLE_IMM | JLE_REG => "jle",
        JSET_IMM | JSET_REG => "jset",
        JNE_IMM | JNE_REG => "jne",
        JSGT_IMM | JSGT_REG => "jsgt",
        JSGE_IMM | JSGE_REG => "jsge",
        JSLT_IMM | JSLT_REG => "jslt",
        JSLE_IMM | JSLE_REG => "jsle",
        CALL => "call",
        CALLX => "callx",
        EXIT => "exit",
        _ => return None,
    };
    Some(name)
}

/// Conditional and unconditional jumps whose target is `pc + 1 + off`.
#[must_use]
pub const fn is_jump(op: u8) -> bool {
    matches!(
        op,
        JA | JEQ_IMM
            | JEQ_REG
            | JGT_IMM
            | JGT_REG
            | JGE_IMM
            | JGE_REG
            | JLT_IMM
            | JLT_REG
            | JLE_IMM
            | JLE_REG
            | JSET_IMM
            | JSET_REG
            | JNE_IMM
            | JNE_REG
            | JSGT_IMM
            | JSGT_REG
            | JSGE_IMM
            | JSGE_REG
            | JSLT_IMM
            | JSLT_REG
            | JSLE_IMM
            | JSLE_REG
    )
}

/// Stores address memory through the destination register.
#[must_use]
pub const fn is_store(op: u8) -> bool {
    matches!(op, STB | STH | STW | STDW | STXB | STXH | STXW | STXDW)
}

/// `lddw` occupies two slots.
#[must_use]
pub const fn is_wide(op: u8) -> bool {
    op == LDDW
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        let cases = [
            (0x18, LDDW),
            (0x71, LDXB),
            (0x69, LDXH),
            (0x61, LDXW),
            (0x79, LDXDW),
            (0x72, STB),
            (0x6a, STH),
            (0x62, STW),
            (0x7a, STDW),
            (0x73, STXB),
            (0x6b, STXH),
            (0x63, STXW),
            (0x7b, STXDW),
            (0x04, ADD32_IMM),
            (0x0c, ADD32_REG),
            (0x07, ADD64_IMM),
            (0x0f, ADD64_REG),
            (0x37, DIV64_IMM),
            (0x3f, DIV64_REG),
            (0x84, NEG32),
            (0x87, NEG64),
            (0xb7, MOV64_IMM),
            (0xbf, MOV64_REG),
            (0xc4, ARSH32_IMM),
            (0xcf, ARSH64_REG),
            (0xd4, LE),
            (0xdc, BE),
            (0xe4, SDIV32_IMM),
            (0xef, SDIV64_REG),
            (0x05, JA),
            (0x15, JEQ_IMM),
            (0x1d, JEQ_REG),
            (0x45, JSET_IMM),
            (0xa5, JLT_IMM),
            (0xdd, JSLE_REG),
            (0x85, CALL),
            (0x8d, CALLX),
            (0x95, EXIT),
        ];
        for (want, have) in cases {
            assert_eq!(want, have, "opcode {want:#04x}");
        }
    }

    #[test]
    fn test_mnemonic_known_and_unknown() {
        assert_eq!(mnemonic(LDDW), Some("lddw"));
        assert_eq!(mnemonic(ADD32_IMM), mnemonic(ADD32_REG));
        assert_eq!(mnemonic(EXIT), Some("exit"));
        assert_eq!(mnemonic(0x00), None);
        assert_eq!(mnemonic(0xff), None);
        // ld/abs style opcodes are not part of SBF
        assert_eq!(mnemonic(0x20), None);
    }

    #[test]
    fn test_classifiers() {
        assert!(is_jump(JA));
        assert!(is_jump(JSLE_REG));
        assert!(!is_jump(CALL));
        assert!(!is_jump(EXIT));
        assert!(is_store(STB));
        assert!(is_store(STXDW));
        assert!(!is_store(LDXDW));
        assert!(is_wide(LDDW));
        assert!(!is_wide(MOV64_IMM));
    }
}
