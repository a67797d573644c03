use std::ops::Range;

use crate::abi::{
    MAX_CALL_DEPTH, REGION_SHIFT, STACK_FRAME_SIZE, VADDR_HEAP, VADDR_INPUT, VADDR_PROGRAM,
    VADDR_STACK,
};
use crate::error::{AccessReason, Fault};

/// One of the four mapped regions of the virtual address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Program,
    Stack,
    Heap,
    Input,
}

impl Region {
    /// Region selected by the high bits of `addr`. Region 0 is never mapped.
    #[must_use]
    pub fn of(addr: u64) -> Option<Self> {
        match addr >> REGION_SHIFT {
            1 => Some(Self::Program),
            2 => Some(Self::Stack),
            3 => Some(Self::Heap),
            4 => Some(Self::Input),
            _ => None,
        }
    }

    #[must_use]
    pub fn base(self) -> u64 {
        match self {
            Self::Program => VADDR_PROGRAM,
            Self::Stack => VADDR_STACK,
            Self::Heap => VADDR_HEAP,
            Self::Input => VADDR_INPUT,
        }
    }
}

/// Bounds-checked view of a VM's address space.
///
/// The program image is borrowed read-only from the `Program`; stack, heap
/// and input are owned by the executing interpreter.
#[derive(Debug)]
pub struct MemoryMap<'a> {
    program: &'a [u8],
    stack: Vec<u8>,
    heap: Vec<u8>,
    input: Vec<u8>,
}

impl<'a> MemoryMap<'a> {
    #[must_use]
    pub fn new(program: &'a [u8], heap_size: usize, input: Vec<u8>) -> Self {
        Self {
            program,
            stack: vec![0; MAX_CALL_DEPTH * STACK_FRAME_SIZE as usize],
            heap: vec![0; heap_size],
            input,
        }
    }

    /// Resolves `[addr, addr + len)` to a region and a range of its backing
    /// buffer, or the fault the access raises.
    pub fn translate(&self, addr: u64, len: u64, write: bool) -> Result<(Region, Range<usize>), Fault> {
        let fault = |reason| Fault::access(addr, len, write, reason);
        let region = Region::of(addr).ok_or_else(|| fault(AccessReason::Unmapped))?;
        let offset = addr - region.base();

        let start = match region {
            Region::Program if write => return Err(fault(AccessReason::ReadOnly)),
            Region::Stack => {
                let slot = offset / STACK_FRAME_SIZE;
                let within = offset % STACK_FRAME_SIZE;
                if slot % 2 == 1 {
                    return Err(fault(AccessReason::StackGap));
                }
                let frame = slot / 2;
                if frame >= MAX_CALL_DEPTH as u64 {
                    return Err(fault(AccessReason::OutOfBounds));
                }
                if within.checked_add(len).is_none_or(|end| end > STACK_FRAME_SIZE) {
                    return Err(fault(AccessReason::StackGap));
                }
                frame * STACK_FRAME_SIZE + within
            }
            _ => offset,
        };

        let size = self.region_bytes(region).len() as u64;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= size)
            .ok_or_else(|| fault(AccessReason::OutOfBounds))?;
        Ok((region, start as usize..end as usize))
    }

    fn region_bytes(&self, region: Region) -> &[u8] {
        match region {
            Region::Program => self.program,
            Region::Stack => &self.stack,
            Region::Heap => &self.heap,
            Region::Input => &self.input,
        }
    }

    fn region_bytes_mut(&mut self, region: Region) -> Option<&mut [u8]> {
        match region {
            Region::Program => None,
            Region::Stack => Some(&mut self.stack),
            Region::Heap => Some(&mut self.heap),
            Region::Input => Some(&mut self.input),
        }
    }

    /// Borrows `len` bytes at `addr`.
    pub fn slice(&self, addr: u64, len: u64) -> Result<&[u8], Fault> {
        let (region, range) = self.translate(addr, len, false)?;
        Ok(&self.region_bytes(region)[range])
    }

    /// Mutably borrows `len` bytes at `addr`.
    pub fn slice_mut(&mut self, addr: u64, len: u64) -> Result<&mut [u8], Fault> {
        let (region, range) = self.translate(addr, len, true)?;
        let bytes = self
            .region_bytes_mut(region)
            .ok_or(Fault::access(addr, len, true, AccessReason::ReadOnly))?;
        Ok(&mut bytes[range])
    }

    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), Fault> {
        buf.copy_from_slice(self.slice(addr, buf.len() as u64)?);
        Ok(())
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), Fault> {
        self.slice_mut(addr, data.len() as u64)?.copy_from_slice(data);
        Ok(())
    }

    fn load<const N: usize>(&self, addr: u64) -> Result<[u8; N], Fault> {
        let mut raw = [0u8; N];
        self.read(addr, &mut raw)?;
        Ok(raw)
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8, Fault> {
        self.load::<1>(addr).map(|[b]| b)
    }

    pub fn read_u16(&self, addr: u64) -> Result<u16, Fault> {
        self.load(addr).map(u16::from_le_bytes)
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32, Fault> {
        self.load(addr).map(u32::from_le_bytes)
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, Fault> {
        self.load(addr).map(u64::from_le_bytes)
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> Result<(), Fault> {
        self.write(addr, &[value])
    }

    pub fn write_u16(&mut self, addr: u64, value: u16) -> Result<(), Fault> {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), Fault> {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), Fault> {
        self.write(addr, &value.to_le_bytes())
    }

    #[must_use]
    pub fn input(&self) -> &[u8] {
        &self.input
    }

    #[must_use]
    pub fn heap(&self) -> &[u8] {
        &self.heap
    }

    /// Consumes the map, returning the input region.
    #[must_use]
    pub fn into_input(self) -> Vec<u8> {
        self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(result: Result<impl Sized, Fault>) -> AccessReason {
        match result {
            Err(Fault::AccessViolation { reason, .. }) => reason,
            Err(other) => panic!("unexpected fault {other}"),
            Ok(_) => panic!("access unexpectedly succeeded"),
        }
    }

    #[test]
    fn test_region_of() {
        assert_eq!(Region::of(0), None);
        assert_eq!(Region::of(0xffff_ffff), None);
        assert_eq!(Region::of(VADDR_PROGRAM), Some(Region::Program));
        assert_eq!(Region::of(VADDR_STACK + 5), Some(Region::Stack));
        assert_eq!(Region::of(VADDR_HEAP), Some(Region::Heap));
        assert_eq!(Region::of(VADDR_INPUT + 0xffff_ffff), Some(Region::Input));
        assert_eq!(Region::of(5 << 32), None);
    }

    #[test]
    fn test_program_region_is_read_only() {
        let program = [1u8, 2, 3, 4];
        let mut mem = MemoryMap::new(&program, 0, Vec::new());
        assert_eq!(mem.read_u16(VADDR_PROGRAM + 2), Ok(0x0403));
        assert_eq!(reason(mem.read_u32(VADDR_PROGRAM + 1)), AccessReason::OutOfBounds);
        assert_eq!(reason(mem.write_u8(VADDR_PROGRAM, 0)), AccessReason::ReadOnly);
    }

    #[test]
    fn test_null_region_faults() {
        let mem = MemoryMap::new(&[], 16, vec![0; 16]);
        let err = mem.read_u8(8).unwrap_err();
        assert_eq!(
            err,
            Fault::AccessViolation {
                addr: 8,
                size: 1,
                write: false,
                reason: AccessReason::Unmapped
            }
        );
    }

    #[test]
    fn test_heap_and_input_bounds() {
        let mut mem = MemoryMap::new(&[], 16, vec![0xaa; 4]);
        mem.write_u64(VADDR_HEAP + 8, u64::MAX).unwrap();
        assert_eq!(mem.read_u64(VADDR_HEAP + 8), Ok(u64::MAX));
        assert_eq!(reason(mem.write_u64(VADDR_HEAP + 9, 0)), AccessReason::OutOfBounds);

        assert_eq!(mem.read_u32(VADDR_INPUT), Ok(0xaaaa_aaaa));
        mem.write_u8(VADDR_INPUT + 3, 7).unwrap();
        assert_eq!(mem.into_input(), vec![0xaa, 0xaa, 0xaa, 7]);
    }

    #[test]
    fn test_stack_frames_and_gaps() {
        let mut mem = MemoryMap::new(&[], 0, Vec::new());
        let top_of_frame0 = VADDR_STACK + STACK_FRAME_SIZE;
        mem.write_u64(top_of_frame0 - 8, 42).unwrap();
        assert_eq!(mem.read_u64(top_of_frame0 - 8), Ok(42));

        // Crossing the top of a frame runs into the gap.
        assert_eq!(reason(mem.read_u64(top_of_frame0 - 4)), AccessReason::StackGap);
        assert_eq!(reason(mem.read_u8(top_of_frame0)), AccessReason::StackGap);

        // Frame 1 lives after the first gap and is backed separately.
        let frame1 = VADDR_STACK + 2 * STACK_FRAME_SIZE;
        mem.write_u8(frame1, 9).unwrap();
        assert_eq!(mem.read_u8(frame1), Ok(9));
        assert_eq!(mem.read_u64(top_of_frame0 - 8), Ok(42));

        let past_last = VADDR_STACK + 2 * MAX_CALL_DEPTH as u64 * STACK_FRAME_SIZE;
        assert_eq!(reason(mem.read_u8(past_last)), AccessReason::OutOfBounds);
    }

    #[test]
    fn test_zero_length_access() {
        let mut mem = MemoryMap::new(&[], 4, Vec::new());
        assert!(mem.slice(VADDR_HEAP + 4, 0).unwrap().is_empty());
        assert!(mem.slice_mut(VADDR_HEAP, 0).unwrap().is_empty());
        assert_eq!(reason(mem.slice(VADDR_HEAP + 5, 0)), AccessReason::OutOfBounds);
        assert_eq!(reason(mem.slice(0, 0)), AccessReason::Unmapped);
    }

    #[test]
    fn test_huge_length_does_not_wrap() {
        let mem = MemoryMap::new(&[], 16, Vec::new());
        assert_eq!(reason(mem.slice(VADDR_HEAP + 8, u64::MAX)), AccessReason::OutOfBounds);
        assert_eq!(reason(mem.slice(VADDR_STACK, u64::MAX)), AccessReason::StackGap);
    }
}
