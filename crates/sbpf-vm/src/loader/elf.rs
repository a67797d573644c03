//! ELF64 little-endian structures and a bounds-checked parser.
//!
//! Only what an SBF program needs is decoded: the file header, program and
//! section header tables, the dynamic table, relocations and dynamic symbols.

use crate::abi::{VADDR_PROGRAM, VADDR_STACK};
use crate::error::LoadError;

use super::range::clamp_add;

pub const EM_BPF: u16 = 247;
pub const ET_DYN: u16 = 3;
pub const EF_SBF_V2: u32 = 0x20;

pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_DYNAMIC: u32 = 6;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_REL: u32 = 9;
pub const SHT_DYNSYM: u32 = 11;

pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;

pub const DT_NULL: u64 = 0;
pub const DT_STRTAB: usize = 5;
pub const DT_SYMTAB: usize = 6;
pub const DT_REL: usize = 17;
pub const DT_RELSZ: usize = 18;
pub const DT_RELENT: usize = 19;
/// Number of dynamic tags tracked.
pub const DT_NUM: usize = 35;

/// 64 MiB. Keeps every offset sum below `u64::MAX` for 32-bit addends.
pub const MAX_FILE_LEN: usize = 1 << 26;
pub const MAX_SECTION_NAME_LEN: usize = 16;
pub const MAX_SYMBOL_NAME_LEN: usize = 1024;

const ELF_MAGIC: [u8; 4] = *b"\x7fELF";

// ── Raw records ──

/// A fixed-size table record.
pub trait Entry: Sized {
    const SIZE: usize;
    const NAME: &'static str;

    /// `raw` is exactly `SIZE` bytes long.
    fn decode(raw: &[u8]) -> Self;
}

fn u16_at(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

fn u32_at(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

fn u64_at(raw: &[u8], at: usize) -> u64 {
    u64::from(u32_at(raw, at)) | (u64::from(u32_at(raw, at + 4)) << 32)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileHeader {
    pub ident: [u8; 16],
    pub kind: u16,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl Entry for FileHeader {
    const SIZE: usize = 0x40;
    const NAME: &'static str = "file header";

    fn decode(raw: &[u8]) -> Self {
        let mut ident = [0u8; 16];
        ident.copy_from_slice(&raw[..16]);
        Self {
            ident,
            kind: u16_at(raw, 16),
            machine: u16_at(raw, 18),
            version: u32_at(raw, 20),
            entry: u64_at(raw, 24),
            phoff: u64_at(raw, 32),
            shoff: u64_at(raw, 40),
            flags: u32_at(raw, 48),
            ehsize: u16_at(raw, 52),
            phentsize: u16_at(raw, 54),
            phnum: u16_at(raw, 56),
            shentsize: u16_at(raw, 58),
            shnum: u16_at(raw, 60),
            shstrndx: u16_at(raw, 62),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramHeader {
    pub kind: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl Entry for ProgramHeader {
    const SIZE: usize = 0x38;
    const NAME: &'static str = "program header";

    fn decode(raw: &[u8]) -> Self {
        Self {
            kind: u32_at(raw, 0),
            flags: u32_at(raw, 4),
            offset: u64_at(raw, 8),
            vaddr: u64_at(raw, 16),
            paddr: u64_at(raw, 24),
            filesz: u64_at(raw, 32),
            memsz: u64_at(raw, 40),
            align: u64_at(raw, 48),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SectionHeader {
    pub name: u32,
    pub kind: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

impl SectionHeader {
    /// File offset one past the end, `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }
}

impl Entry for SectionHeader {
    const SIZE: usize = 0x40;
    const NAME: &'static str = "section header";

    fn decode(raw: &[u8]) -> Self {
        Self {
            name: u32_at(raw, 0),
            kind: u32_at(raw, 4),
            flags: u64_at(raw, 8),
            addr: u64_at(raw, 16),
            offset: u64_at(raw, 24),
            size: u64_at(raw, 32),
            link: u32_at(raw, 40),
            info: u32_at(raw, 44),
            addralign: u64_at(raw, 48),
            entsize: u64_at(raw, 56),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Dyn {
    pub tag: u64,
    pub val: u64,
}

impl Entry for Dyn {
    const SIZE: usize = 0x10;
    const NAME: &'static str = "dynamic entry";

    fn decode(raw: &[u8]) -> Self {
        Self {
            tag: u64_at(raw, 0),
            val: u64_at(raw, 8),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rel {
    pub offset: u64,
    pub info: u64,
}

impl Rel {
    pub fn kind(&self) -> u32 {
        self.info as u32
    }

    pub fn symbol(&self) -> u32 {
        (self.info >> 32) as u32
    }
}

impl Entry for Rel {
    const SIZE: usize = 0x10;
    const NAME: &'static str = "relocation";

    fn decode(raw: &[u8]) -> Self {
        Self {
            offset: u64_at(raw, 0),
            info: u64_at(raw, 8),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sym {
    pub name: u32,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

impl Sym {
    pub fn kind(&self) -> u8 {
        self.info & 0xf
    }
}

impl Entry for Sym {
    const SIZE: usize = 0x18;
    const NAME: &'static str = "symbol";

    fn decode(raw: &[u8]) -> Self {
        Self {
            name: u32_at(raw, 0),
            info: raw[4],
            other: raw[5],
            shndx: u16_at(raw, 6),
            value: u64_at(raw, 8),
            size: u64_at(raw, 16),
        }
    }
}

// ── Parser ──

/// A named section header.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub header: SectionHeader,
}

/// The validated metadata of an ELF image. Borrows the file bytes.
#[derive(Debug)]
pub struct Elf<'a> {
    pub bytes: &'a [u8],
    pub header: FileHeader,
    pub program_headers: Vec<ProgramHeader>,
    pub sections: Vec<Section>,
    pub text: usize,
    pub dynstr: Option<usize>,
    pub dynamic: [u64; DT_NUM],
    pub relocations: Vec<Rel>,
    pub dynamic_symbols: Vec<Sym>,
}

impl<'a> Elf<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, LoadError> {
        if bytes.len() > MAX_FILE_LEN {
            return Err(LoadError::FileTooLarge(bytes.len()));
        }
        let header: FileHeader = read_entry(bytes, 0)?;
        validate_header(&header)?;

        let program_headers = read_program_headers(bytes, &header)?;
        let headers = read_section_headers(bytes, &header)?;
        let shstrtab = headers[usize::from(header.shstrndx)];
        if shstrtab.kind != SHT_STRTAB {
            return Err(LoadError::InvalidSection {
                name: ".shstrtab".into(),
                reason: "not a string table",
            });
        }

        let mut sections = Vec::with_capacity(headers.len());
        let mut text = None;
        let mut dynstr = None;
        for (index, sh) in headers.into_iter().enumerate() {
            let name = read_string(bytes, &shstrtab, sh.name, MAX_SECTION_NAME_LEN)
                .map_err(|_| LoadError::InvalidSectionName(u64::from(sh.name)))?;
            let slot = match name.as_str() {
                ".text" => Some(&mut text),
                ".dynstr" => Some(&mut dynstr),
                _ => None,
            };
            if let Some(slot) = slot {
                if slot.is_some() {
                    return Err(LoadError::DuplicateSection(name));
                }
                *slot = Some(index);
            }
            sections.push(Section { name, header: sh });
        }
        let text = text.ok_or(LoadError::MissingText)?;

        let mut elf = Self {
            bytes,
            header,
            program_headers,
            sections,
            text,
            dynstr,
            dynamic: [0; DT_NUM],
            relocations: Vec::new(),
            dynamic_symbols: Vec::new(),
        };
        elf.parse_dynamic_table()?;
        elf.parse_relocations()?;
        elf.parse_dynamic_symbols()?;
        Ok(elf)
    }

    pub fn text_section(&self) -> &Section {
        &self.sections[self.text]
    }

    pub fn is_sbf_v2(&self) -> bool {
        self.header.flags == EF_SBF_V2
    }

    pub fn file_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn dynamic_symbol(&self, index: u32) -> Result<Sym, LoadError> {
        self.dynamic_symbols
            .get(index as usize)
            .copied()
            .ok_or(LoadError::InvalidSymbol(index))
    }

    pub fn dynamic_symbol_name(&self, sym: &Sym) -> Result<String, LoadError> {
        let dynstr = self
            .dynstr
            .map(|i| self.sections[i].header)
            .ok_or(LoadError::InvalidString(u64::from(sym.name)))?;
        read_string(self.bytes, &dynstr, sym.name, MAX_SYMBOL_NAME_LEN)
    }

    fn parse_dynamic_table(&mut self) -> Result<(), LoadError> {
        let location = self
            .program_headers
            .iter()
            .find(|ph| ph.kind == PT_DYNAMIC)
            .map(|ph| (ph.offset, ph.filesz))
            .or_else(|| {
                self.sections
                    .iter()
                    .find(|s| s.header.kind == SHT_DYNAMIC)
                    .map(|s| (s.header.offset, s.header.size))
            });
        // Statically linked, nothing to relocate.
        let Some((offset, size)) = location else {
            return Ok(());
        };
        if size % Dyn::SIZE as u64 != 0 {
            return Err(LoadError::InvalidDynamic("odd .dynamic size"));
        }

        for entry in read_table::<Dyn>(self.bytes, offset, size)? {
            if entry.tag == DT_NULL {
                break;
            }
            if let Some(value) = usize::try_from(entry.tag)
                .ok()
                .and_then(|tag| self.dynamic.get_mut(tag))
            {
                *value = entry.val;
            }
        }
        Ok(())
    }

    fn parse_relocations(&mut self) -> Result<(), LoadError> {
        let vaddr = self.dynamic[DT_REL];
        if vaddr == 0 {
            return Ok(());
        }
        if self.dynamic[DT_RELENT] != Rel::SIZE as u64 {
            return Err(LoadError::InvalidDynamic("invalid DT_RELENT"));
        }
        let size = self.dynamic[DT_RELSZ];
        if size == 0 || size % Rel::SIZE as u64 != 0 || size > u64::from(u32::MAX) {
            return Err(LoadError::InvalidDynamic("invalid DT_RELSZ"));
        }

        let segment = self
            .program_headers
            .iter()
            .find(|ph| ph.vaddr <= vaddr && vaddr - ph.vaddr < ph.memsz);
        let offset = if let Some(ph) = segment {
            (vaddr - ph.vaddr)
                .checked_add(ph.offset)
                .ok_or(LoadError::InvalidDynamic("relocation table offset overflow"))?
        } else {
            // DT_REL outside of any segment, fall back to the section at that address.
            self.section_at(vaddr)
                .map(|sh| sh.offset)
                .ok_or(LoadError::InvalidDynamic(
                    "cannot find physical address of relocation table",
                ))?
        };

        self.relocations = read_table(self.bytes, offset, size)?;
        Ok(())
    }

    fn parse_dynamic_symbols(&mut self) -> Result<(), LoadError> {
        let vaddr = self.dynamic[DT_SYMTAB];
        if vaddr == 0 {
            return Ok(());
        }
        let sh = self
            .section_at(vaddr)
            .ok_or(LoadError::InvalidDynamic("cannot find DT_SYMTAB section"))?;
        if sh.kind != SHT_SYMTAB && sh.kind != SHT_DYNSYM {
            return Err(LoadError::InvalidDynamic("DT_SYMTAB is not a symbol table"));
        }
        if sh.size % Sym::SIZE as u64 != 0 {
            return Err(LoadError::InvalidDynamic("misaligned symbol table"));
        }
        self.dynamic_symbols = read_table(self.bytes, sh.offset, sh.size)?;
        Ok(())
    }

    fn section_at(&self, vaddr: u64) -> Option<SectionHeader> {
        self.sections
            .iter()
            .map(|s| s.header)
            .find(|sh| sh.kind != SHT_NULL && sh.addr == vaddr)
    }
}

fn validate_header(eh: &FileHeader) -> Result<(), LoadError> {
    let ident = &eh.ident;
    if ident[..4] != ELF_MAGIC {
        return Err(LoadError::InvalidHeader("not an ELF file"));
    }
    if ident[4] != 2 {
        return Err(LoadError::Incompatible("not a 64-bit ELF"));
    }
    if ident[5] != 1 {
        return Err(LoadError::Incompatible("not little-endian"));
    }
    if ident[6] != 1 {
        return Err(LoadError::Incompatible("unsupported ELF version"));
    }
    if ident[7] != 0 {
        return Err(LoadError::Incompatible("unsupported OS ABI"));
    }
    if eh.machine != EM_BPF {
        return Err(LoadError::Incompatible("machine is not BPF"));
    }
    if eh.kind != ET_DYN {
        return Err(LoadError::Incompatible("not a shared object"));
    }

    if eh.version != 1 {
        return Err(LoadError::InvalidHeader("unsupported e_version"));
    }
    if usize::from(eh.ehsize) != FileHeader::SIZE {
        return Err(LoadError::InvalidHeader("invalid e_ehsize"));
    }
    if usize::from(eh.phentsize) != ProgramHeader::SIZE {
        return Err(LoadError::InvalidHeader("invalid e_phentsize"));
    }
    if usize::from(eh.shentsize) != SectionHeader::SIZE {
        return Err(LoadError::InvalidHeader("invalid e_shentsize"));
    }
    if eh.shstrndx >= eh.shnum {
        return Err(LoadError::InvalidHeader("invalid e_shstrndx"));
    }

    let header_len = FileHeader::SIZE as u64;
    if eh.phoff < header_len || eh.shoff < header_len {
        return Err(LoadError::OverlappingTables);
    }
    if overlaps(eh.phoff, ph_table_len(eh), eh.shoff, sh_table_len(eh)) {
        return Err(LoadError::OverlappingTables);
    }
    Ok(())
}

fn ph_table_len(eh: &FileHeader) -> u64 {
    u64::from(eh.phnum) * ProgramHeader::SIZE as u64
}

fn sh_table_len(eh: &FileHeader) -> u64 {
    u64::from(eh.shnum) * SectionHeader::SIZE as u64
}

/// Reads the program header table, keeping every entry.
///
/// `PT_LOAD` segments must be in strictly ascending virtual address order
/// without overlapping one another. Their file data must lie inside the file
/// and clear of the file header and both header tables, and their memory
/// below the stack region.
fn read_program_headers(bytes: &[u8], eh: &FileHeader) -> Result<Vec<ProgramHeader>, LoadError> {
    let headers: Vec<ProgramHeader> = read_table(bytes, eh.phoff, ph_table_len(eh))?;
    let file_len = bytes.len() as u64;
    let mut last_load: Option<&ProgramHeader> = None;

    for (index, ph) in headers.iter().enumerate() {
        if ph.kind != PT_LOAD {
            continue;
        }
        let invalid = |reason| LoadError::InvalidSegment { index, reason };
        if let Some(prev) = last_load {
            if ph.vaddr <= prev.vaddr {
                return Err(invalid("PT_LOAD segments not in ascending order"));
            }
            if prev.vaddr.checked_add(prev.memsz).is_none_or(|end| end > ph.vaddr) {
                return Err(invalid("overlaps with previous segment"));
            }
        }
        if ph.offset.checked_add(ph.filesz).is_none_or(|end| end > file_len) {
            return Err(invalid("segment out of bounds"));
        }
        if overlaps(0, FileHeader::SIZE as u64, ph.offset, ph.filesz) {
            return Err(invalid("overlaps with file header"));
        }
        if overlaps(eh.phoff, ph_table_len(eh), ph.offset, ph.filesz) {
            return Err(invalid("overlaps with program header table"));
        }
        if overlaps(eh.shoff, sh_table_len(eh), ph.offset, ph.filesz) {
            return Err(invalid("overlaps with section header table"));
        }
        let vaddr = clamp_add(VADDR_PROGRAM, ph.vaddr);
        if vaddr.checked_add(ph.memsz).is_none_or(|end| end > VADDR_STACK) {
            return Err(invalid("segment outside of program region"));
        }
        last_load = Some(ph);
    }
    Ok(headers)
}

/// Reads the section header table and checks every section with file data
/// stays clear of the header tables, inside the file, in ascending order and
/// before the section header table.
fn read_section_headers(bytes: &[u8], eh: &FileHeader) -> Result<Vec<SectionHeader>, LoadError> {
    let headers: Vec<SectionHeader> = read_table(bytes, eh.shoff, sh_table_len(eh))?;
    let file_len = bytes.len() as u64;

    let invalid = |index: usize, reason| LoadError::InvalidSection {
        name: format!("#{index}"),
        reason,
    };

    match headers.first() {
        None => return Err(invalid(0, "missing null section")),
        Some(sh) if sh.kind != SHT_NULL => return Err(invalid(0, "section 0 is not SHT_NULL")),
        Some(_) => {}
    }

    let mut data_end = 0u64;
    for (index, sh) in headers.iter().enumerate().skip(1) {
        if sh.kind == SHT_NOBITS {
            continue;
        }
        let end = sh.end().ok_or_else(|| invalid(index, "integer overflow"))?;
        if sh.offset < FileHeader::SIZE as u64 {
            return Err(invalid(index, "overlaps with file header"));
        }
        if overlaps(eh.phoff, ph_table_len(eh), sh.offset, sh.size) {
            return Err(invalid(index, "overlaps with program header table"));
        }
        if overlaps(eh.shoff, sh_table_len(eh), sh.offset, sh.size) {
            return Err(invalid(index, "overlaps with section header table"));
        }
        if end > file_len {
            return Err(invalid(index, "out of bounds"));
        }
        if sh.size == 0 {
            continue;
        }
        if sh.offset < data_end || end > eh.shoff {
            return Err(invalid(index, "sections not in order"));
        }
        data_end = end;
    }
    Ok(headers)
}

/// Reads one record at `offset`.
pub fn read_entry<T: Entry>(bytes: &[u8], offset: u64) -> Result<T, LoadError> {
    let truncated = LoadError::Truncated {
        what: T::NAME,
        offset,
    };
    let start = usize::try_from(offset).map_err(|_| truncated.clone())?;
    let raw = start
        .checked_add(T::SIZE)
        .and_then(|end| bytes.get(start..end))
        .ok_or(truncated)?;
    Ok(T::decode(raw))
}

/// Reads a densely packed table of `len` bytes at `offset`.
pub fn read_table<T: Entry>(bytes: &[u8], offset: u64, len: u64) -> Result<Vec<T>, LoadError> {
    let truncated = LoadError::Truncated {
        what: T::NAME,
        offset,
    };
    let end = offset.checked_add(len).ok_or_else(|| truncated.clone())?;
    if end > bytes.len() as u64 {
        return Err(truncated);
    }
    let (Ok(start), Ok(end)) = (usize::try_from(offset), usize::try_from(end)) else {
        return Err(truncated);
    };
    let raw = &bytes[start..end];
    if raw.len() % T::SIZE != 0 {
        return Err(truncated);
    }
    Ok(raw.chunks_exact(T::SIZE).map(T::decode).collect())
}

/// Reads a NUL-terminated string from a string table section.
///
/// The string, excluding the terminator, must be shorter than `max_len` and
/// end inside the string table.
pub fn read_string(
    bytes: &[u8],
    strtab: &SectionHeader,
    offset: u32,
    max_len: usize,
) -> Result<String, LoadError> {
    let invalid = LoadError::InvalidString(u64::from(offset));
    if strtab.kind != SHT_STRTAB || u64::from(offset) >= strtab.size {
        return Err(invalid);
    }
    let start = strtab
        .offset
        .checked_add(u64::from(offset))
        .and_then(|s| usize::try_from(s).ok())
        .ok_or_else(|| invalid.clone())?;
    // Bounded by the table, not just the file.
    let table_end = strtab
        .end()
        .and_then(|end| usize::try_from(end).ok())
        .ok_or_else(|| invalid.clone())?;
    let end = table_end.min(start.saturating_add(max_len));
    let window = bytes.get(start..end).ok_or_else(|| invalid.clone())?;
    let nul = window
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| invalid.clone())?;
    String::from_utf8(window[..nul].to_vec()).map_err(|_| invalid)
}

/// Whether the non-empty ranges `[a, a+a_len)` and `[b, b+b_len)` intersect.
pub fn overlaps(a: u64, a_len: u64, b: u64, b_len: u64) -> bool {
    if a_len == 0 || b_len == 0 {
        return false;
    }
    let a_end = a.saturating_add(a_len);
    let b_end = b.saturating_add(b_len);
    a < b_end && b < a_end
}
