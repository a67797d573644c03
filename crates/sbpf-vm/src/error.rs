use std::fmt;

/// Failure while parsing, copying or relocating an ELF image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("file too large ({0} bytes)")]
    FileTooLarge(usize),

    #[error("unexpected end of file reading {what} at {offset:#x}")]
    Truncated { what: &'static str, offset: u64 },

    #[error("malformed ELF header: {0}")]
    InvalidHeader(&'static str),

    #[error("incompatible binary: {0}")]
    Incompatible(&'static str),

    #[error("overlapping ELF header tables")]
    OverlappingTables,

    #[error("invalid program header {index}: {reason}")]
    InvalidSegment { index: usize, reason: &'static str },

    #[error("invalid section {name:?}: {reason}")]
    InvalidSection { name: String, reason: &'static str },

    #[error("invalid section name at string table offset {0:#x}")]
    InvalidSectionName(u64),

    #[error("duplicate section {0}")]
    DuplicateSection(String),

    #[error("missing .text section")]
    MissingText,

    #[error("invalid .text size {0}")]
    InvalidTextSize(u64),

    #[error("invalid dynamic table: {0}")]
    InvalidDynamic(&'static str),

    #[error("invalid string at offset {0:#x}")]
    InvalidString(u64),

    #[error("relocation offset {0:#x} out of bounds")]
    RelocationOutOfBounds(u64),

    #[error("unsupported relocation type {0}")]
    UnsupportedRelocation(u32),

    #[error("invalid symbol index {0}")]
    InvalidSymbol(u32),

    #[error("symbol {name:?} at {value:#x} is outside of .text")]
    SymbolOutOfBounds { name: String, value: u64 },

    #[error("call at slot {pc} targets slot {target} outside of .text")]
    CallOutOfBounds { pc: u64, target: i64 },

    #[error("function hash {hash:#010x} collides for slot {pc}")]
    HashCollision { hash: u32, pc: u64 },

    #[error("relative relocation at {0:#x} has no addend")]
    MissingAddend(u64),

    #[error("invalid entrypoint {0:#x}")]
    InvalidEntrypoint(u64),
}

/// Static rejection of a program's bytecode.
///
/// Every variant carrying a `pc` names the offending slot index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error(".text is empty")]
    EmptyText,

    #[error(".text size {0} is not a multiple of 8")]
    UnalignedText(usize),

    #[error("invalid source register r{reg} at pc {pc}")]
    InvalidSrcRegister { pc: usize, reg: u8 },

    #[error("invalid destination register r{reg} at pc {pc}")]
    InvalidDstRegister { pc: usize, reg: u8 },

    #[error("unknown opcode {opcode:#04x} at pc {pc}")]
    UnknownOpcode { pc: usize, opcode: u8 },

    #[error("shift by {shift} out of range at pc {pc}")]
    ShiftOutOfRange { pc: usize, shift: i32 },

    #[error("invalid byte swap width {width} at pc {pc}")]
    InvalidEndianWidth { pc: usize, width: i32 },

    #[error("division by zero at pc {pc}")]
    DivisionByZero { pc: usize },

    #[error("jump out of code to {target} at pc {pc}")]
    JumpOutOfCode { pc: usize, target: i64 },

    #[error("jump into the middle of lddw at {target} from pc {pc}")]
    JumpIntoLddw { pc: usize, target: usize },

    #[error("incomplete lddw at pc {pc}")]
    IncompleteLddw { pc: usize },

    #[error("invalid callx register r{reg} at pc {pc}")]
    InvalidCallxRegister { pc: usize, reg: u32 },
}

impl VerifyError {
    /// Slot index of the rejected instruction, if the error names one.
    #[must_use]
    pub fn pc(&self) -> Option<usize> {
        match *self {
            Self::EmptyText | Self::UnalignedText(_) => None,
            Self::InvalidSrcRegister { pc, .. }
            | Self::InvalidDstRegister { pc, .. }
            | Self::UnknownOpcode { pc, .. }
            | Self::ShiftOutOfRange { pc, .. }
            | Self::InvalidEndianWidth { pc, .. }
            | Self::DivisionByZero { pc }
            | Self::JumpOutOfCode { pc, .. }
            | Self::JumpIntoLddw { pc, .. }
            | Self::IncompleteLddw { pc }
            | Self::InvalidCallxRegister { pc, .. } => Some(pc),
        }
    }
}

/// Why a memory access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    /// Region 0 or a region index past the input region.
    Unmapped,
    /// The access runs past the end of its region.
    OutOfBounds,
    /// Write into the program image.
    ReadOnly,
    /// The address falls into the gap between two stack frames.
    StackGap,
}

impl fmt::Display for AccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unmapped => "unmapped region",
            Self::OutOfBounds => "out of bounds",
            Self::ReadOnly => "write to program",
            Self::StackGap => "stack frame gap",
        })
    }
}

/// Runtime fault terminating an execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("division by zero")]
    DivideByZero,

    #[error("divide overflow")]
    DivideOverflow,

    #[error("compute unit overrun")]
    OutOfCompute,

    #[error("call depth exceeded")]
    CallDepthExceeded,

    #[error("unknown symbol or syscall {0:#010x}")]
    UnknownCallTarget(u32),

    #[error("indirect call to {0:#x} outside of .text")]
    CallxOutOfBounds(u64),

    #[error("bad memory access at {addr:#x} (size={size} write={write}), reason: {reason}")]
    AccessViolation {
        addr: u64,
        size: u64,
        write: bool,
        reason: AccessReason,
    },

    #[error("program counter {0} out of bounds")]
    PcOutOfBounds(u64),

    #[error("invalid instruction {0:#04x}")]
    InvalidInstruction(u8),

    #[error("program aborted")]
    Abort,

    #[error("overlapping memory copy")]
    CopyOverlapping,

    #[error("syscall failed: {0}")]
    Syscall(String),

    #[error("interpreter already executed")]
    AlreadyExecuted,
}

impl Fault {
    pub(crate) fn access(addr: u64, size: u64, write: bool, reason: AccessReason) -> Self {
        Self::AccessViolation {
            addr,
            size,
            write,
            reason,
        }
    }
}

/// A [`Fault`] tagged with the slot index it was raised at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("exception at {pc}: {fault}")]
pub struct Exception {
    pub pc: u64,
    pub fault: Fault,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("syscall {name:?} ({hash:#010x}) collides with an existing entry")]
    Duplicate { name: String, hash: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Exception(#[from] Exception),

    #[error("syscall registry: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, Error>;
