//! ELF loader and relocator.
//!
//! `load` runs three phases, each failing the whole load on any violation:
//!
//! 1. parse: validate the file header, program and section header tables and
//!    read the dynamic table, relocations and dynamic symbols;
//! 2. copy: place `.text` and rodata-like sections into one image buffer;
//! 3. relocate: turn relative calls into hashed calls, apply dynamic
//!    relocations and locate the entrypoint.

// Offsets are bounded by MAX_FILE_LEN, so u64 <-> usize casts cannot truncate.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

mod copy;
pub mod elf;
mod range;
pub(crate) mod relocate;

use std::collections::HashMap;

use crate::error::LoadError;
use crate::program::Program;

pub use elf::{EF_SBF_V2, Elf};
pub use relocate::{R_BPF_64_32, R_BPF_64_64, R_BPF_64_RELATIVE, RelocStats};

/// Loads and relocates an SBF ELF image.
pub fn load(bytes: &[u8]) -> Result<Program, LoadError> {
    load_with_stats(bytes).map(|(program, _)| program)
}

/// Like [`load`], also reporting how many relocations of each kind applied.
pub fn load_with_stats(bytes: &[u8]) -> Result<(Program, RelocStats), LoadError> {
    let elf = Elf::parse(bytes)?;
    let copy::Image {
        bytes: mut image,
        text,
    } = copy::copy(&elf)?;

    let text_range = text.min as usize..text.max as usize;
    let mut functions = HashMap::new();
    let mut stats = RelocStats {
        calls: relocate::resolve_calls(&mut image, text_range.clone(), &mut functions)?,
        ..RelocStats::default()
    };
    relocate::apply_relocations(&elf, &mut image, text, &mut functions, &mut stats)?;
    let entry_pc = relocate::entrypoint(&elf, text)?;

    tracing::debug!(
        text_len = text.len(),
        image_len = image.len(),
        functions = functions.len(),
        entry_pc,
        sbf_v2 = elf.is_sbf_v2(),
        "loaded program"
    );
    tracing::debug!(
        calls = stats.calls,
        abs64 = stats.abs64,
        relative = stats.relative,
        functions = stats.functions,
        syscalls = stats.syscalls,
        "applied relocations"
    );

    let program = Program::new(image, text_range, entry_pc, functions, elf.is_sbf_v2());
    Ok((program, stats))
}
