//! Test harness for sbpf-vm unit and integration tests
//!
//! Provides a small assembler for bytecode, an in-memory ELF builder producing
//! loadable SBF shared objects, and helpers that run a program against the
//! builtin syscalls and capture everything observable about the execution.
//!
//! # Example
//!
//! ```rust
//! use sbpf_vm::test_harness::*;
//!
//! let asm = Asm::new()
//!     .mov64_imm(0, 40)
//!     .add64_imm(0, 2)
//!     .exit();
//! let outcome = run_text(&asm);
//! assert_eq!(outcome.result, Ok(42));
//! assert_eq!(outcome.compute_used, 3);
//!
//! let elf = ElfBuilder::new(&asm).build();
//! let outcome = run_elf(&elf, VmOptions::default()).expect("load");
//! assert_eq!(outcome.result, Ok(42));
//! ```

#![allow(
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::manual_assert,
    clippy::missing_panics_doc,
    clippy::uninlined_format_args
)]

pub use crate::sbf::opcode as op;
pub use crate::{
    Builtin, Exception, Fault, LoadError, Program, Slot, SyscallRegistry, VerifyError, VmOptions,
};

use crate::abi::{REGISTER_COUNT, SLOT_SIZE};
use crate::hash::symbol_hash;
use crate::loader::elf::{
    DT_NULL, DT_REL, DT_RELENT, DT_RELSZ, DT_STRTAB, DT_SYMTAB, EF_SBF_V2, EM_BPF, ET_DYN, PT_LOAD,
    SHT_DYNAMIC, SHT_DYNSYM, SHT_PROGBITS, SHT_REL, SHT_STRTAB, STT_FUNC, STT_OBJECT,
};
use crate::loader::{R_BPF_64_32, R_BPF_64_64, R_BPF_64_RELATIVE};
use crate::vm::Interpreter;

// =============================================================================
// Assembler
// =============================================================================

/// Builds bytecode one slot at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Asm {
    slots: Vec<Slot>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw instruction.
    pub fn ins(mut self, opcode: u8, dst: u8, src: u8, off: i16, imm: i32) -> Self {
        self.slots.push(Slot::new(opcode, dst, src, off, imm));
        self
    }

    pub fn lddw(self, dst: u8, value: u64) -> Self {
        self.ins(op::LDDW, dst, 0, 0, value as u32 as i32)
            .ins(0, 0, 0, 0, (value >> 32) as u32 as i32)
    }

    pub fn mov64_imm(self, dst: u8, imm: i32) -> Self {
        self.ins(op::MOV64_IMM, dst, 0, 0, imm)
    }

    pub fn mov64_reg(self, dst: u8, src: u8) -> Self {
        self.ins(op::MOV64_REG, dst, src, 0, 0)
    }

    pub fn add64_imm(self, dst: u8, imm: i32) -> Self {
        self.ins(op::ADD64_IMM, dst, 0, 0, imm)
    }

    /// Any ALU operation with an immediate operand.
    pub fn alu_imm(self, opcode: u8, dst: u8, imm: i32) -> Self {
        self.ins(opcode, dst, 0, 0, imm)
    }

    /// Any ALU operation with a register operand.
    pub fn alu_reg(self, opcode: u8, dst: u8, src: u8) -> Self {
        self.ins(opcode, dst, src, 0, 0)
    }

    /// `ldx*` dst, [src + off]
    pub fn load(self, opcode: u8, dst: u8, src: u8, off: i16) -> Self {
        self.ins(opcode, dst, src, off, 0)
    }

    /// `st*` [dst + off], imm
    pub fn store_imm(self, opcode: u8, dst: u8, off: i16, imm: i32) -> Self {
        self.ins(opcode, dst, 0, off, imm)
    }

    /// `stx*` [dst + off], src
    pub fn store_reg(self, opcode: u8, dst: u8, off: i16, src: u8) -> Self {
        self.ins(opcode, dst, src, off, 0)
    }

    pub fn ja(self, off: i16) -> Self {
        self.ins(op::JA, 0, 0, off, 0)
    }

    pub fn jump_imm(self, opcode: u8, dst: u8, imm: i32, off: i16) -> Self {
        self.ins(opcode, dst, 0, off, imm)
    }

    pub fn jump_reg(self, opcode: u8, dst: u8, src: u8, off: i16) -> Self {
        self.ins(opcode, dst, src, off, 0)
    }

    /// Relative call to slot `pc + 1 + off`, resolved when the program loads.
    pub fn call(self, off: i32) -> Self {
        self.ins(op::CALL, 0, 0, 0, off)
    }

    /// Call by name hash. The non-zero source field keeps the loader from
    /// treating the immediate as a relative offset.
    pub fn syscall(self, name: &str) -> Self {
        self.ins(op::CALL, 0, 1, 0, symbol_hash(name) as i32)
    }

    /// Unresolved call (`imm == -1`), to be patched by a relocation.
    pub fn call_unresolved(self) -> Self {
        self.ins(op::CALL, 0, 0, 0, -1)
    }

    pub fn callx(self, reg: u8) -> Self {
        self.ins(op::CALLX, 0, 0, 0, i32::from(reg))
    }

    pub fn exit(self) -> Self {
        self.ins(op::EXIT, 0, 0, 0, 0)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Encoded `.text` bytes.
    pub fn text(&self) -> Vec<u8> {
        self.slots.iter().flat_map(|s| s.to_bytes()).collect()
    }
}

/// Builds a raw program from assembled slots.
pub fn assemble(asm: &Asm) -> Program {
    Program::from_text_bytes(&asm.text()).expect("Failed to build program")
}

/// Count how many times an opcode appears in an encoded `.text`.
pub fn count_opcode(text: &[u8], opcode: u8) -> usize {
    text.chunks_exact(SLOT_SIZE)
        .filter(|chunk| chunk[0] == opcode)
        .count()
}

// =============================================================================
// Running programs
// =============================================================================

/// Everything observable about one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub result: Result<u64, Exception>,
    pub registers: [u64; REGISTER_COUNT],
    pub compute_used: u64,
    pub compute_remaining: u64,
    pub logs: Vec<String>,
    pub input: Vec<u8>,
}

/// Runs a verified program once with the builtin syscalls.
pub fn run_program(program: &Program, options: VmOptions) -> Outcome {
    let syscalls = SyscallRegistry::with_builtins();
    run_with(program, &syscalls, options)
}

/// Runs a verified program once with a caller-provided registry.
pub fn run_with(program: &Program, syscalls: &SyscallRegistry, options: VmOptions) -> Outcome {
    let mut vm = Interpreter::new(program, syscalls, options).expect("Program failed to verify");
    let result = vm.run();
    let registers = *vm.registers();
    let compute_used = vm.compute_used();
    let compute_remaining = vm.compute_remaining();
    let (input, logs) = vm.into_output();
    Outcome {
        result,
        registers,
        compute_used,
        compute_remaining,
        logs,
        input,
    }
}

/// Assembles and runs with default options.
pub fn run_text(asm: &Asm) -> Outcome {
    run_program(&assemble(asm), VmOptions::default())
}

/// Loads an ELF image and runs it.
pub fn run_elf(bytes: &[u8], options: VmOptions) -> Result<Outcome, LoadError> {
    let program = crate::load(bytes)?;
    Ok(run_program(&program, options))
}

// =============================================================================
// ELF builder
// =============================================================================

#[derive(Debug, Clone)]
struct Symbol {
    name: String,
    /// Slot index for functions, `None` for undefined (syscall) symbols.
    function: Option<u64>,
    /// Offset into `.rodata` for data symbols.
    data: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
enum Reloc {
    /// `R_BPF_64_32` on the call at `pc` against symbol `sym`.
    Call { pc: u64, sym: usize },
    /// `R_BPF_64_64` on the `lddw` at `pc` against data symbol `sym`.
    Abs64 { pc: u64, sym: usize },
    /// `R_BPF_64_RELATIVE` on the `lddw` at `pc` pointing into `.rodata`.
    TextRelative { pc: u64, target: u64 },
    /// `R_BPF_64_RELATIVE` on an 8-byte pointer inside `.rodata`.
    DataRelative { at: u64, target: u64 },
    /// Arbitrary relocation type on the slot at `pc`, no symbol.
    Raw { pc: u64, kind: u32 },
}

/// Produces minimal SBF shared objects.
///
/// Layout: file header, one `PT_LOAD` program header, `.text`, `.rodata`,
/// `.dynamic`, `.dynsym`, `.dynstr`, `.rel.dyn`, `.shstrtab`, then the
/// section header table. Every section's address equals its file offset.
/// With extra segments the whole program header table moves to the end of
/// the file instead, so `.text` stays at [`Self::TEXT_OFFSET`].
#[derive(Debug, Clone)]
pub struct ElfBuilder {
    text: Vec<u8>,
    rodata: Vec<u8>,
    entry_pc: u64,
    sbf_v2: bool,
    symbols: Vec<Symbol>,
    relocs: Vec<Reloc>,
    segments: Vec<Segment>,
}

/// A `PT_LOAD` entry following the one over `.text` and `.rodata`.
#[derive(Debug, Clone, Copy)]
struct Segment {
    offset: u64,
    vaddr: u64,
    filesz: u64,
    memsz: u64,
}

const EHDR_SIZE: usize = 0x40;
const PHDR_SIZE: usize = 0x38;
const SHDR_SIZE: usize = 0x40;
const SYM_SIZE: usize = 0x18;
const REL_SIZE: usize = 0x10;
const DYN_SIZE: usize = 0x10;

const fn align8(n: usize) -> usize {
    n.div_ceil(8) * 8
}

impl ElfBuilder {
    /// File offset of `.text` in every built image.
    pub const TEXT_OFFSET: u64 = align8(EHDR_SIZE + PHDR_SIZE) as u64;

    pub fn new(text: &Asm) -> Self {
        Self::from_text(text.text())
    }

    pub fn from_text(text: Vec<u8>) -> Self {
        Self {
            text,
            rodata: Vec::new(),
            entry_pc: 0,
            sbf_v2: false,
            symbols: Vec::new(),
            relocs: Vec::new(),
            segments: Vec::new(),
        }
    }

    pub fn rodata(mut self, bytes: &[u8]) -> Self {
        self.rodata = bytes.to_vec();
        self
    }

    pub fn entry(mut self, pc: u64) -> Self {
        self.entry_pc = pc;
        self
    }

    pub fn sbf_v2(mut self) -> Self {
        self.sbf_v2 = true;
        self
    }

    /// Appends a `PT_LOAD` program header with the given file range and
    /// virtual address.
    pub fn segment(mut self, offset: u64, vaddr: u64, filesz: u64, memsz: u64) -> Self {
        self.segments.push(Segment {
            offset,
            vaddr,
            filesz,
            memsz,
        });
        self
    }

    /// File offset of `.rodata`.
    pub fn rodata_offset(&self) -> u64 {
        Self::TEXT_OFFSET + align8(self.text.len()) as u64
    }

    fn symbol(&mut self, name: &str, function: Option<u64>, data: Option<u64>) -> usize {
        if let Some(i) = self.symbols.iter().position(|s| s.name == name) {
            return i + 1;
        }
        self.symbols.push(Symbol {
            name: name.to_string(),
            function,
            data,
        });
        // Index 0 is the null symbol.
        self.symbols.len()
    }

    /// The call at `pc` targets the syscall `name`.
    pub fn syscall_reloc(mut self, pc: u64, name: &str) -> Self {
        let sym = self.symbol(name, None, None);
        self.relocs.push(Reloc::Call { pc, sym });
        self
    }

    /// The call at `pc` targets the exported function `name` at slot `target`.
    pub fn function_reloc(mut self, pc: u64, name: &str, target: u64) -> Self {
        let sym = self.symbol(name, Some(target), None);
        self.relocs.push(Reloc::Call { pc, sym });
        self
    }

    /// The `lddw` at `pc` loads the address of the data symbol `name`, placed
    /// at `offset` in `.rodata`. The `lddw` immediate is the addend.
    pub fn abs64_reloc(mut self, pc: u64, name: &str, offset: u64) -> Self {
        let sym = self.symbol(name, None, Some(offset));
        self.relocs.push(Reloc::Abs64 { pc, sym });
        self
    }

    /// The `lddw` at `pc` loads the address of `.rodata + offset`.
    pub fn text_relative_reloc(mut self, pc: u64, offset: u64) -> Self {
        self.relocs.push(Reloc::TextRelative { pc, target: offset });
        self
    }

    /// The 8 bytes at `.rodata + at` hold the address of `.rodata + target`.
    pub fn data_relative_reloc(mut self, at: u64, target: u64) -> Self {
        self.relocs.push(Reloc::DataRelative { at, target });
        self
    }

    /// A relocation of type `kind` on the slot at `pc`.
    pub fn raw_reloc(mut self, pc: u64, kind: u32) -> Self {
        self.relocs.push(Reloc::Raw { pc, kind });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let text_off = Self::TEXT_OFFSET as usize;
        let rodata_off = self.rodata_offset() as usize;
        let mut text = self.text.clone();
        let mut rodata = self.rodata.clone();

        // Dynamic symbols and their names.
        let mut dynstr = vec![0u8];
        let mut dynsym = vec![0u8; SYM_SIZE];
        for symbol in &self.symbols {
            let name = dynstr.len() as u32;
            dynstr.extend_from_slice(symbol.name.as_bytes());
            dynstr.push(0);
            let (kind, value) = match (symbol.function, symbol.data) {
                (Some(pc), _) => (STT_FUNC, text_off as u64 + pc * SLOT_SIZE as u64),
                (None, Some(offset)) => (STT_OBJECT, rodata_off as u64 + offset),
                (None, None) => (0, 0),
            };
            dynsym.extend_from_slice(&name.to_le_bytes());
            dynsym.push(0x10 | kind);
            dynsym.push(0);
            dynsym.extend_from_slice(&0u16.to_le_bytes());
            dynsym.extend_from_slice(&value.to_le_bytes());
            dynsym.extend_from_slice(&0u64.to_le_bytes());
        }

        let mut rel = Vec::new();
        let mut push_rel = |offset: usize, sym: usize, kind: u32| {
            rel.extend_from_slice(&(offset as u64).to_le_bytes());
            rel.extend_from_slice(&(((sym as u64) << 32) | u64::from(kind)).to_le_bytes());
        };
        for reloc in &self.relocs {
            match *reloc {
                Reloc::Call { pc, sym } => {
                    push_rel(text_off + pc as usize * SLOT_SIZE, sym, R_BPF_64_32);
                }
                Reloc::Abs64 { pc, sym } => {
                    push_rel(text_off + pc as usize * SLOT_SIZE, sym, R_BPF_64_64);
                }
                Reloc::TextRelative { pc, target } => {
                    let at = pc as usize * SLOT_SIZE;
                    let addr = rodata_off as u64 + target;
                    text[at + 4..at + 8].copy_from_slice(&(addr as u32).to_le_bytes());
                    text[at + 12..at + 16].copy_from_slice(&((addr >> 32) as u32).to_le_bytes());
                    push_rel(text_off + at, 0, R_BPF_64_RELATIVE);
                }
                Reloc::DataRelative { at, target } => {
                    let at = at as usize;
                    let addr = rodata_off as u64 + target;
                    if self.sbf_v2 {
                        rodata[at..at + 8].copy_from_slice(&addr.to_le_bytes());
                    } else {
                        rodata[at + 4..at + 8].copy_from_slice(&(addr as u32).to_le_bytes());
                    }
                    push_rel(rodata_off + at, 0, R_BPF_64_RELATIVE);
                }
                Reloc::Raw { pc, kind } => {
                    push_rel(text_off + pc as usize * SLOT_SIZE, 0, kind);
                }
            }
        }

        // Offsets of everything after .rodata.
        let dynamic_off = align8(rodata_off + rodata.len());
        let mut dynamic = Vec::new();
        let dynsym_off = dynamic_off + 6 * DYN_SIZE;
        let dynstr_off = dynsym_off + dynsym.len();
        let rel_off = align8(dynstr_off + dynstr.len());
        let mut push_dyn = |tag: u64, val: u64| {
            dynamic.extend_from_slice(&tag.to_le_bytes());
            dynamic.extend_from_slice(&val.to_le_bytes());
        };
        if rel.is_empty() {
            push_dyn(DT_SYMTAB as u64, dynsym_off as u64);
            push_dyn(DT_STRTAB as u64, dynstr_off as u64);
            push_dyn(DT_NULL, 0);
            push_dyn(DT_NULL, 0);
            push_dyn(DT_NULL, 0);
            push_dyn(DT_NULL, 0);
        } else {
            push_dyn(DT_REL as u64, rel_off as u64);
            push_dyn(DT_RELSZ as u64, rel.len() as u64);
            push_dyn(DT_RELENT as u64, REL_SIZE as u64);
            push_dyn(DT_SYMTAB as u64, dynsym_off as u64);
            push_dyn(DT_STRTAB as u64, dynstr_off as u64);
            push_dyn(DT_NULL, 0);
        }

        let mut shstrtab = vec![0u8];
        let mut name = |s: &str| {
            let offset = shstrtab.len() as u32;
            shstrtab.extend_from_slice(s.as_bytes());
            shstrtab.push(0);
            offset
        };
        let names = [
            name(".text"),
            name(".rodata"),
            name(".dynamic"),
            name(".dynsym"),
            name(".dynstr"),
            name(".rel.dyn"),
            name(".shstrtab"),
        ];
        let shstrtab_off = rel_off + rel.len();
        let shoff = align8(shstrtab_off + shstrtab.len());

        let sections: [(u32, u32, usize, usize, u32); 7] = [
            (names[0], SHT_PROGBITS, text_off, text.len(), 0),
            (names[1], SHT_PROGBITS, rodata_off, rodata.len(), 0),
            (names[2], SHT_DYNAMIC, dynamic_off, dynamic.len(), 5),
            (names[3], SHT_DYNSYM, dynsym_off, dynsym.len(), 5),
            (names[4], SHT_STRTAB, dynstr_off, dynstr.len(), 0),
            (names[5], SHT_REL, rel_off, rel.len(), 4),
            (names[6], SHT_STRTAB, shstrtab_off, shstrtab.len(), 0),
        ];

        let sh_end = shoff + (sections.len() + 1) * SHDR_SIZE;
        let phnum = 1 + self.segments.len();
        let phoff = if self.segments.is_empty() { EHDR_SIZE } else { sh_end };
        let mut out = vec![0u8; sh_end.max(phoff + phnum * PHDR_SIZE)];

        // File header.
        out[..4].copy_from_slice(b"\x7fELF");
        out[4] = 2;
        out[5] = 1;
        out[6] = 1;
        put_u16(&mut out, 16, ET_DYN);
        put_u16(&mut out, 18, EM_BPF);
        put_u32(&mut out, 20, 1);
        put_u64(&mut out, 24, text_off as u64 + self.entry_pc * SLOT_SIZE as u64);
        put_u64(&mut out, 32, phoff as u64);
        put_u64(&mut out, 40, shoff as u64);
        put_u32(&mut out, 48, if self.sbf_v2 { EF_SBF_V2 } else { 0 });
        put_u16(&mut out, 52, EHDR_SIZE as u16);
        put_u16(&mut out, 54, PHDR_SIZE as u16);
        put_u16(&mut out, 56, phnum as u16);
        put_u16(&mut out, 58, SHDR_SIZE as u16);
        put_u16(&mut out, 60, sections.len() as u16 + 1);
        put_u16(&mut out, 62, sections.len() as u16);

        // PT_LOAD over .text and .rodata, then any extra segments.
        let load_len = (rodata_off + rodata.len() - text_off) as u64;
        let main = Segment {
            offset: text_off as u64,
            vaddr: text_off as u64,
            filesz: load_len,
            memsz: load_len,
        };
        for (index, segment) in std::iter::once(&main).chain(&self.segments).enumerate() {
            let ph = phoff + index * PHDR_SIZE;
            put_u32(&mut out, ph, PT_LOAD);
            put_u32(&mut out, ph + 4, 5);
            put_u64(&mut out, ph + 8, segment.offset);
            put_u64(&mut out, ph + 16, segment.vaddr);
            put_u64(&mut out, ph + 24, segment.vaddr);
            put_u64(&mut out, ph + 32, segment.filesz);
            put_u64(&mut out, ph + 40, segment.memsz);
            put_u64(&mut out, ph + 48, 8);
        }

        out[text_off..text_off + text.len()].copy_from_slice(&text);
        out[rodata_off..rodata_off + rodata.len()].copy_from_slice(&rodata);
        out[dynamic_off..dynamic_off + dynamic.len()].copy_from_slice(&dynamic);
        out[dynsym_off..dynsym_off + dynsym.len()].copy_from_slice(&dynsym);
        out[dynstr_off..dynstr_off + dynstr.len()].copy_from_slice(&dynstr);
        out[rel_off..rel_off + rel.len()].copy_from_slice(&rel);
        out[shstrtab_off..shstrtab_off + shstrtab.len()].copy_from_slice(&shstrtab);

        // Section headers; entry 0 stays null.
        for (index, &(name, kind, offset, size, link)) in sections.iter().enumerate() {
            let at = shoff + (index + 1) * SHDR_SIZE;
            put_u32(&mut out, at, name);
            put_u32(&mut out, at + 4, kind);
            put_u64(&mut out, at + 16, offset as u64);
            put_u64(&mut out, at + 24, offset as u64);
            put_u64(&mut out, at + 32, size as u64);
            put_u32(&mut out, at + 40, link);
            put_u64(&mut out, at + 48, 8);
        }
        out
    }
}

fn put_u16(out: &mut [u8], at: usize, value: u16) {
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut [u8], at: usize, value: u64) {
    out[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Overwrites `value.len()` bytes at `at`, for malformed-input tests.
pub fn patch(mut bytes: Vec<u8>, at: usize, value: &[u8]) -> Vec<u8> {
    bytes[at..at + value.len()].copy_from_slice(value);
    bytes
}
