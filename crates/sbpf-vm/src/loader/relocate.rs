use std::collections::HashMap;
use std::ops::Range;

use crate::abi::{SLOT_SIZE, VADDR_PROGRAM};
use crate::error::LoadError;
use crate::hash::{pc_hash, symbol_hash};
use crate::sbf::{Slot, opcode};

use super::elf::{Elf, Rel, STT_FUNC};
use super::range::{AddrRange, clamp_add};

pub const R_BPF_NONE: u32 = 0;
pub const R_BPF_64_64: u32 = 1;
pub const R_BPF_64_RELATIVE: u32 = 8;
pub const R_BPF_64_32: u32 = 10;

/// Relocation counts by kind, for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelocStats {
    pub calls: usize,
    pub abs64: usize,
    pub relative: usize,
    pub functions: usize,
    pub syscalls: usize,
}

/// Rewrites every relative `call` in `text` into a call by function hash.
///
/// A call is relative when its source register is 0 and its immediate is not
/// -1 (the placeholder left for symbol relocations).
pub fn resolve_calls(
    image: &mut [u8],
    text: Range<usize>,
    functions: &mut HashMap<u32, u64>,
) -> Result<usize, LoadError> {
    let len = text.len();
    let code = image
        .get_mut(text)
        .ok_or(LoadError::InvalidTextSize(len as u64))?;
    let count = code.len() / SLOT_SIZE;
    let mut resolved = 0;

    for pc in 0..count {
        let Some(slot) = Slot::read(code, pc) else {
            break;
        };
        if slot.opcode() != opcode::CALL || slot.src() != 0 || slot.imm() == -1 {
            continue;
        }

        let target = pc as i64 + 1 + i64::from(slot.imm());
        if target < 0 || target >= count as i64 {
            return Err(LoadError::CallOutOfBounds {
                pc: pc as u64,
                target,
            });
        }
        let hash = register_function(functions, target as u64)?;
        let at = pc * SLOT_SIZE;
        code[at..at + SLOT_SIZE].copy_from_slice(&slot.with_imm(hash).to_bytes());
        resolved += 1;
    }
    Ok(resolved)
}

/// Records `target` under its pc hash. Registering the same target twice is
/// fine; a different target with the same hash is rejected.
pub fn register_function(functions: &mut HashMap<u32, u64>, target: u64) -> Result<u32, LoadError> {
    let hash = pc_hash(target);
    match functions.get(&hash) {
        Some(&existing) if existing != target => {
            Err(LoadError::HashCollision { hash, pc: target })
        }
        Some(_) => Ok(hash),
        None => {
            functions.insert(hash, target);
            Ok(hash)
        }
    }
}

/// Applies the dynamic relocations of `elf` to the copied image.
pub fn apply_relocations(
    elf: &Elf<'_>,
    image: &mut [u8],
    text: AddrRange,
    functions: &mut HashMap<u32, u64>,
    stats: &mut RelocStats,
) -> Result<(), LoadError> {
    for rel in &elf.relocations {
        apply(elf, image, text, functions, rel, stats)?;
    }
    Ok(())
}

fn apply(
    elf: &Elf<'_>,
    image: &mut [u8],
    text: AddrRange,
    functions: &mut HashMap<u32, u64>,
    rel: &Rel,
    stats: &mut RelocStats,
) -> Result<(), LoadError> {
    let at = rel.offset;
    match rel.kind() {
        R_BPF_64_64 => {
            let sym = elf.dynamic_symbol(rel.symbol())?;
            let addend = read_u32(image, at, 4)?;
            let mut addr = clamp_add(sym.value, u64::from(addend));
            if addr < VADDR_PROGRAM {
                addr += VADDR_PROGRAM;
            }
            write_split(image, at, addr)?;
            stats.abs64 += 1;
        }
        R_BPF_64_RELATIVE => {
            if text.contains(at) {
                let lo = read_u32(image, at, 4)?;
                let hi = read_u32(image, at, 12)?;
                let mut addr = (u64::from(hi) << 32) | u64::from(lo);
                if addr == 0 {
                    return Err(LoadError::MissingAddend(at));
                }
                if addr < VADDR_PROGRAM {
                    addr += VADDR_PROGRAM;
                }
                write_split(image, at, addr)?;
            } else {
                let addr = if elf.is_sbf_v2() {
                    let addr = read_u64(image, at)?;
                    if addr < VADDR_PROGRAM {
                        addr + VADDR_PROGRAM
                    } else {
                        addr
                    }
                } else {
                    clamp_add(u64::from(read_u32(image, at, 4)?), VADDR_PROGRAM)
                };
                write_u64(image, at, addr)?;
            }
            stats.relative += 1;
        }
        R_BPF_64_32 => {
            let sym = elf.dynamic_symbol(rel.symbol())?;
            let name = elf.dynamic_symbol_name(&sym)?;
            let hash = if sym.kind() == STT_FUNC && sym.value != 0 {
                if !text.contains(sym.value) {
                    return Err(LoadError::SymbolOutOfBounds {
                        name,
                        value: sym.value,
                    });
                }
                stats.functions += 1;
                register_function(functions, (sym.value - text.min) / SLOT_SIZE as u64)?
            } else {
                stats.syscalls += 1;
                symbol_hash(&name)
            };
            write_u32(image, at, 4, hash)?;
        }
        R_BPF_NONE => {}
        other => return Err(LoadError::UnsupportedRelocation(other)),
    }
    Ok(())
}

/// Slot index of the ELF entry address.
pub fn entrypoint(elf: &Elf<'_>, text: AddrRange) -> Result<u64, LoadError> {
    let entry = elf.header.entry;
    let offset = entry
        .checked_sub(elf.text_section().header.addr)
        .ok_or(LoadError::InvalidEntrypoint(entry))?;
    if offset % SLOT_SIZE as u64 != 0 || offset >= text.len() {
        return Err(LoadError::InvalidEntrypoint(entry));
    }
    Ok(offset / SLOT_SIZE as u64)
}

fn span(image: &[u8], at: u64, len: usize) -> Result<Range<usize>, LoadError> {
    let start = usize::try_from(at).map_err(|_| LoadError::RelocationOutOfBounds(at))?;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= image.len())
        .ok_or(LoadError::RelocationOutOfBounds(at))?;
    Ok(start..end)
}

fn read_u32(image: &[u8], at: u64, field: u64) -> Result<u32, LoadError> {
    let range = span(image, at.saturating_add(field), 4)
        .map_err(|_| LoadError::RelocationOutOfBounds(at))?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&image[range]);
    Ok(u32::from_le_bytes(raw))
}

fn write_u32(image: &mut [u8], at: u64, field: u64, value: u32) -> Result<(), LoadError> {
    let range = span(image, at.saturating_add(field), 4)
        .map_err(|_| LoadError::RelocationOutOfBounds(at))?;
    image[range].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

fn read_u64(image: &[u8], at: u64) -> Result<u64, LoadError> {
    let range = span(image, at, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&image[range]);
    Ok(u64::from_le_bytes(raw))
}

fn write_u64(image: &mut [u8], at: u64, value: u64) -> Result<(), LoadError> {
    let range = span(image, at, 8)?;
    image[range].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Writes `value` across the immediates of the slot pair at `at`.
fn write_split(image: &mut [u8], at: u64, value: u64) -> Result<(), LoadError> {
    // Check both halves before touching either.
    span(image, at, 2 * SLOT_SIZE)?;
    write_u32(image, at, 4, value as u32)?;
    write_u32(image, at, 12, (value >> 32) as u32)
}
