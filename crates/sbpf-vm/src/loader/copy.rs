use crate::abi::{SLOT_SIZE, VADDR_PROGRAM, VADDR_STACK};
use crate::error::LoadError;

use super::elf::{Elf, SectionHeader};
use super::range::{AddrRange, clamp_add};

/// Sections copied into the program image.
const RODATA_LIKE: [&str; 4] = [".text", ".rodata", ".data.rel.ro", ".eh_frame"];

/// The program image and where `.text` lives in it.
#[derive(Debug)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub text: AddrRange,
}

/// Copies `.text` and the rodata-like sections into one buffer covering
/// `[0, end of last section)`. Image offsets equal file offsets.
pub fn copy(elf: &Elf<'_>) -> Result<Image, LoadError> {
    let text_section = elf.text_section();
    check_section_addrs(elf, &text_section.name, &text_section.header)?;
    let text = AddrRange::new(
        text_section.header.offset,
        text_section.header.offset + text_section.header.size,
    );
    if text.is_empty() || text.len() % SLOT_SIZE as u64 != 0 {
        return Err(LoadError::InvalidTextSize(text.len()));
    }

    let mut program = AddrRange::empty();
    let mut mapped: Vec<AddrRange> = Vec::new();
    for section in &elf.sections {
        if !RODATA_LIKE.contains(&section.name.as_str()) {
            continue;
        }
        check_section_addrs(elf, &section.name, &section.header)?;

        let range = AddrRange::new(
            section.header.offset,
            section.header.offset + section.header.size,
        );
        if range.is_empty() {
            continue;
        }
        if mapped.iter().any(|other| other.overlaps(&range)) {
            return Err(LoadError::InvalidSection {
                name: section.name.clone(),
                reason: "overlaps with another section",
            });
        }
        if range.max > elf.file_len() {
            return Err(LoadError::Truncated {
                what: "section data",
                offset: range.min,
            });
        }
        program.insert(range);
        mapped.push(range);
    }
    program.extend_to_fit(0);

    let len = usize::try_from(program.len()).map_err(|_| LoadError::FileTooLarge(usize::MAX))?;
    let mut bytes = vec![0u8; len];
    for range in mapped {
        let (start, end) = (range.min as usize, range.max as usize);
        let src = elf.bytes.get(start..end).ok_or(LoadError::Truncated {
            what: "section data",
            offset: range.min,
        })?;
        bytes[start..end].copy_from_slice(src);
    }

    Ok(Image { bytes, text })
}

fn check_section_addrs(elf: &Elf<'_>, name: &str, sh: &SectionHeader) -> Result<(), LoadError> {
    let invalid = |reason| LoadError::InvalidSection {
        name: name.to_string(),
        reason,
    };
    // File bounds of the data itself are checked when it is copied.
    if sh.size > elf.file_len() {
        return Err(LoadError::Truncated {
            what: "section data",
            offset: sh.offset,
        });
    }
    if sh.addr != sh.offset {
        return Err(invalid("section physical address out-of-place"));
    }
    let vaddr = clamp_add(VADDR_PROGRAM, sh.addr);
    if vaddr.checked_add(sh.size).is_none_or(|end| end > VADDR_STACK) {
        return Err(invalid("section virtual address out-of-bounds"));
    }
    Ok(())
}
