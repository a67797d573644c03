// Slot packing uses explicit 'as' casts between signed and unsigned field widths.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

mod disasm;
pub mod opcode;
mod slot;

pub use disasm::{disassemble, disassemble_slot, listing};
pub use slot::Slot;
