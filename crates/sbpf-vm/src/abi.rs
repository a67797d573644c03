//! SBF ABI constants (Registers, Memory Layout, Frame Layout, Compute Costs).
//!
//! This module centralizes all definitions related to the SBF execution environment
//! so the loader, verifier, interpreter and syscalls agree on one layout.
//!
//! ```text
//! SBF Address Space (region index = address >> 32):
//!   0x0_0000_0000 - 0x0_FFFF_FFFF   Reserved (fault on access)
//!   0x1_0000_0000 - 0x1_FFFF_FFFF   Program image: .text and rodata (read-only)
//!   0x2_0000_0000 - 0x2_FFFF_FFFF   Stack frames, each followed by an unmapped gap
//!   0x3_0000_0000 - 0x3_FFFF_FFFF   Heap
//!   0x4_0000_0000 - 0x4_FFFF_FFFF   Input buffer supplied by the host
//! ```

// ── Register Assignments ──

/// Number of general purpose registers (r0-r10).
pub const REGISTER_COUNT: usize = 11;

/// Return value register (r0).
pub const RETURN_VALUE_REG: u8 = 0;

/// First argument register (r1).
/// Holds the input region base on entry; first syscall/call argument.
pub const FIRST_ARG_REG: u8 = 1;

/// First callee-saved register (r6). r6-r9 are restored on `exit`.
pub const FIRST_SAVED_REG: u8 = 6;

/// Number of callee-saved registers (r6-r9).
pub const SAVED_REG_COUNT: usize = 4;

/// Frame pointer register (r10). Read-only for ordinary instructions.
pub const FRAME_PTR_REG: u8 = 10;

/// Highest register index an instruction may write.
pub const MAX_WRITABLE_REG: u8 = 9;

// ── Instruction Encoding ──

/// Size of one instruction slot in bytes.
pub const SLOT_SIZE: usize = 8;

// ── Memory Layout ──

/// Number of bits the region index is shifted by inside a virtual address.
pub const REGION_SHIFT: u32 = 32;

/// Base address of the read-only program image.
pub const VADDR_PROGRAM: u64 = 1 << REGION_SHIFT;

/// Base address of the stack region.
pub const VADDR_STACK: u64 = 2 << REGION_SHIFT;

/// Base address of the heap region.
pub const VADDR_HEAP: u64 = 3 << REGION_SHIFT;

/// Base address of the input region.
pub const VADDR_INPUT: u64 = 4 << REGION_SHIFT;

/// Default heap size in bytes.
pub const DEFAULT_HEAP_SIZE: usize = 32 * 1024;

// ── Stack Frame Layout ──

/// Addressable bytes within one stack frame.
///
/// Frames are laid out upwards from `VADDR_STACK`, each followed by an
/// unmapped gap of the same size:
///
/// ```text
///   [0x2_0000_0000]: Frame 0
///   [0x2_0000_1000]: Gap
///   [0x2_0000_2000]: Frame 1
///   [0x2_0000_3000]: Gap
///   ...
/// ```
///
/// The frame pointer (r10) points to the highest address of the current frame.
pub const STACK_FRAME_SIZE: u64 = 0x1000;

/// Maximum number of frames on the call stack, including the entry frame.
pub const MAX_CALL_DEPTH: usize = 64;

/// Frame pointer of the entry frame.
pub const INITIAL_FRAME_PTR: u64 = VADDR_STACK + STACK_FRAME_SIZE;

// ── Compute Costs ──

/// Default compute budget of one execution.
pub const DEFAULT_COMPUTE_BUDGET: u64 = 1_400_000;

/// Cost of executing one instruction.
pub const INSTRUCTION_COST: u64 = 1;

/// Base cost charged by syscalls.
pub const SYSCALL_BASE_COST: u64 = 100;

/// Minimum cost of a memory syscall (memcpy, memmove, memset, memcmp).
pub const MEM_OP_BASE_COST: u64 = 10;

/// Bytes processed per compute unit by memory syscalls.
pub const BYTES_PER_COMPUTE_UNIT: u64 = 250;

/// Longest message `sol_log_` accepts; longer requests exhaust the budget.
pub const MAX_LOG_LEN: u64 = 1 << 30;
