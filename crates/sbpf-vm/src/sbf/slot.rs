use std::fmt;

use crate::abi::SLOT_SIZE;

/// One 8-byte instruction slot.
///
/// ```text
/// byte 0      opcode
/// byte 1      dst (low nibble) | src (high nibble)
/// bytes 2-3   offset (i16, little-endian)
/// bytes 4-7   immediate (i32, little-endian)
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Slot(u64);

impl Slot {
    #[must_use]
    pub const fn new(opcode: u8, dst: u8, src: u8, off: i16, imm: i32) -> Self {
        let regs = (dst & 0xf) | ((src & 0xf) << 4);
        Self(
            opcode as u64
                | ((regs as u64) << 8)
                | ((off as u16 as u64) << 16)
                | ((imm as u32 as u64) << 32),
        )
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; SLOT_SIZE]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; SLOT_SIZE] {
        self.0.to_le_bytes()
    }

    /// Reads slot `pc` out of a bytecode buffer.
    #[must_use]
    pub fn read(text: &[u8], pc: usize) -> Option<Self> {
        let start = pc.checked_mul(SLOT_SIZE)?;
        let bytes = text.get(start..start.checked_add(SLOT_SIZE)?)?;
        let mut raw = [0u8; SLOT_SIZE];
        raw.copy_from_slice(bytes);
        Some(Self::from_bytes(raw))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn opcode(self) -> u8 {
        self.0 as u8
    }

    #[must_use]
    pub const fn dst(self) -> u8 {
        (self.0 >> 8) as u8 & 0xf
    }

    #[must_use]
    pub const fn src(self) -> u8 {
        (self.0 >> 12) as u8 & 0xf
    }

    #[must_use]
    pub const fn off(self) -> i16 {
        (self.0 >> 16) as u16 as i16
    }

    #[must_use]
    pub const fn imm(self) -> i32 {
        self.uimm() as i32
    }

    #[must_use]
    pub const fn uimm(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[must_use]
    pub const fn with_imm(self, imm: u32) -> Self {
        Self((self.0 & 0xffff_ffff) | ((imm as u64) << 32))
    }
}

impl From<u64> for Slot {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("opcode", &format_args!("{:#04x}", self.opcode()))
            .field("dst", &self.dst())
            .field("src", &self.src())
            .field("off", &self.off())
            .field("imm", &self.imm())
            .finish()
    }
}
